//! Rendering a mode batch into protocol lines.
//!
//! Letters and arguments are packed greedily. A line is flushed when it
//! holds [`MAXMODEPARAMSSERV`] arguments or the next argument would push it
//! past the line budget. A direction sign is written only when it differs
//! from the previous letter's.

use super::Caps;
use crate::modes::{Direction, ModeChange, Scope};

pub const BUFSIZE: usize = 512;
pub const MODEBUFLEN: usize = 200;
pub const MAXMODEPARAMSSERV: usize = 10;

/// Local renderings of one batch.
#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct LocalLines {
    /// For every local member.
    pub all: Vec<String>,
    /// For local chanops only.
    pub chanops: Vec<String>,
}

impl LocalLines {
    pub fn is_empty(&self) -> bool {
        self.all.is_empty() && self.chanops.is_empty()
    }
}

struct Packer {
    prefix: String,
    letters: String,
    params: String,
    args: usize,
    dir: Direction,
    out: Vec<String>,
}

impl Packer {
    fn new(prefix: String) -> Self {
        Self {
            prefix,
            letters: String::new(),
            params: String::new(),
            args: 0,
            dir: Direction::Query,
            out: Vec::new(),
        }
    }

    fn pending(&self) -> bool {
        !self.letters.is_empty()
    }

    fn too_long(&self, arglen: usize) -> bool {
        self.prefix.len() + self.letters.len() + self.params.len() + arglen + 4 > BUFSIZE - 3
    }

    fn flush(&mut self) {
        if self.pending() {
            let mut line = format!("{}{}", self.prefix, self.letters);
            let params = self.params.trim_end();
            if !params.is_empty() {
                line.push(' ');
                line.push_str(params);
            }
            self.out.push(line);
        }
        self.letters.clear();
        self.params.clear();
        self.args = 0;
        self.dir = Direction::Query;
    }

    fn push(&mut self, dir: Direction, letter: char, arg: Option<&str>) {
        if self.dir != dir {
            self.letters.push(dir.sign());
            self.dir = dir;
        }
        self.letters.push(letter);
        if let Some(arg) = arg {
            self.params.push_str(arg);
            self.params.push(' ');
            self.args += 1;
        }
    }

    fn finish(mut self) -> Vec<String> {
        self.flush();
        self.out
    }
}

fn argument_fits(arg: Option<&str>) -> Option<usize> {
    match arg {
        Some(a) if a.len() > MODEBUFLEN - 5 => None,
        Some(a) => Some(a.len()),
        None => Some(0),
    }
}

fn render_scope(changes: &[ModeChange], scope: Scope, prefix: &str) -> Vec<String> {
    let mut packer = Packer::new(prefix.to_string());
    for change in changes.iter().filter(|c| c.scope == scope) {
        let arg = change.arg.as_deref();
        let Some(arglen) = argument_fits(arg) else {
            continue;
        };
        if arg.is_some() && (packer.args == MAXMODEPARAMSSERV || packer.too_long(arglen)) {
            if !packer.pending() {
                continue;
            }
            packer.flush();
        }
        packer.push(change.dir, change.letter, arg);
    }
    packer.finish()
}

/// `:<source> MODE <chan> ...` lines for local members. Server-only
/// records are left out.
pub fn render_local(changes: &[ModeChange], source: &str, chan: &str) -> LocalLines {
    let prefix = format!(":{source} MODE {chan} ");
    LocalLines {
        all: render_scope(changes, Scope::AllMembers, &prefix),
        chanops: render_scope(changes, Scope::ChanOps, &prefix),
    }
}

/// `:<source_id> TMODE <ts> <chan> ...` lines for peers whose tracked
/// capabilities are exactly `yes`, lacking `no`. Records needing a missing
/// capability, or forbidding a present one, are skipped; nick-targeted
/// records carry the UID.
pub fn render_remote(
    changes: &[ModeChange],
    yes: Caps,
    no: Caps,
    source_id: &str,
    ts: i64,
    chan: &str,
) -> Vec<String> {
    let mut packer = Packer::new(format!(":{source_id} TMODE {ts} {chan} "));
    for change in changes {
        if !yes.contains(change.caps) || !no.contains(change.nocaps) {
            continue;
        }
        let arg = change.id.as_deref().or(change.arg.as_deref());
        let Some(arglen) = argument_fits(arg) else {
            continue;
        };
        if arg.is_some() && (packer.args == MAXMODEPARAMSSERV || packer.too_long(arglen)) {
            packer.flush();
        }
        packer.push(change.dir, change.letter, arg);
    }
    packer.finish()
}
