//! Nom-based IRC line parser.
//!
//! ```text
//! [:prefix] <command> [params...] [:trailing]
//! ```
//!
//! Message tags are not part of the server-to-server dialect spoken here and
//! are skipped if present.

use nom::{
    bytes::complete::{take_until, take_while1},
    character::complete::{char, space0},
    combinator::opt,
    error::ErrorKind,
    sequence::preceded,
    IResult,
};
use smallvec::SmallVec;

use crate::error::ParseError;

/// Maximum number of parameters on one line.
pub const MAX_PARAMS: usize = 15;

/// Maximum line length including the terminating CRLF.
pub const MAX_LINE: usize = 512;

/// A borrowed, parsed IRC line.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Line<'a> {
    pub prefix: Option<&'a str>,
    pub command: &'a str,
    pub params: SmallVec<[&'a str; MAX_PARAMS]>,
}

impl<'a> Line<'a> {
    /// Parse one line. Trailing CR/LF is ignored.
    pub fn parse(input: &'a str) -> Result<Self, ParseError> {
        let trimmed = input.trim_end_matches(['\r', '\n']);
        if trimmed.trim().is_empty() {
            return Err(ParseError::Empty);
        }
        if trimmed.contains('\0') {
            return Err(ParseError::InvalidCharacter);
        }
        match parse_line(trimmed) {
            Ok((_, line)) => Ok(line),
            Err(_) => Err(ParseError::InvalidCommand),
        }
    }

    /// Positional parameter, if present.
    pub fn param(&self, index: usize) -> Option<&'a str> {
        self.params.get(index).copied()
    }

    /// Case-insensitive command comparison.
    pub fn is(&self, command: &str) -> bool {
        self.command.eq_ignore_ascii_case(command)
    }
}

fn parse_tags(input: &str) -> IResult<&str, &str> {
    preceded(char('@'), take_until(" "))(input)
}

fn parse_prefix(input: &str) -> IResult<&str, &str> {
    preceded(char(':'), take_while1(|c| c != ' '))(input)
}

/// 1*letter or 3digit.
fn parse_command(input: &str) -> IResult<&str, &str> {
    let (rest, cmd) = take_while1(|c: char| c.is_ascii_alphanumeric())(input)?;

    let is_all_letters = cmd.chars().all(|c| c.is_ascii_alphabetic());
    let is_three_digits = cmd.len() == 3 && cmd.chars().all(|c| c.is_ascii_digit());

    if is_all_letters || is_three_digits {
        Ok((rest, cmd))
    } else {
        Err(nom::Err::Error(nom::error::Error::new(
            input,
            ErrorKind::AlphaNumeric,
        )))
    }
}

fn parse_params(input: &str) -> SmallVec<[&str; MAX_PARAMS]> {
    let mut params: SmallVec<[&str; MAX_PARAMS]> = SmallVec::new();
    let mut rest = input;

    while rest.starts_with(' ') {
        rest = rest.trim_start_matches(' ');
        if rest.is_empty() {
            break;
        }

        if let Some(trailing) = rest.strip_prefix(':') {
            params.push(trailing);
            break;
        }

        // The last slot swallows the remainder, as a trailing parameter would.
        if params.len() == MAX_PARAMS - 1 {
            params.push(rest);
            break;
        }

        let end = rest.find(' ').unwrap_or(rest.len());
        params.push(&rest[..end]);
        rest = &rest[end..];
    }

    params
}

fn parse_line(input: &str) -> IResult<&str, Line<'_>> {
    let (input, _) = opt(parse_tags)(input)?;
    let (input, _) = space0(input)?;
    let (input, prefix) = opt(parse_prefix)(input)?;
    let (input, _) = space0(input)?;
    let (input, command) = parse_command(input)?;
    let params = parse_params(input);

    Ok((
        "",
        Line {
            prefix,
            command,
            params,
        },
    ))
}
