//! UID generation for TS6-style user identifiers.

/// Generates UIDs: SID (3 chars) + 6 base36 chars, e.g. `0HBAAAAAB`.
///
/// Counter starts at 2; `AAAAAA` and `AAAAAB` are left for service
/// pseudoclients.
#[derive(Debug)]
pub struct UidGenerator {
    sid: String,
    counter: u64,
}

const UID_COUNTER_START: u64 = 2;

impl UidGenerator {
    pub fn new(sid: String) -> Self {
        Self {
            sid,
            counter: UID_COUNTER_START,
        }
    }

    pub fn next_uid(&mut self) -> String {
        let n = self.counter;
        self.counter += 1;
        format!("{}{}", self.sid, base36_encode_6(n))
    }
}

fn base36_encode_6(mut n: u64) -> String {
    const CHARS: &[u8] = b"ABCDEFGHIJKLMNOPQRSTUVWXYZ0123456789";
    let mut result = [b'A'; 6];

    for slot in result.iter_mut().rev() {
        *slot = CHARS[(n % 36) as usize];
        n /= 36;
    }

    String::from_utf8_lossy(&result).into_owned()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn uids_are_sequential() {
        let mut generator = UidGenerator::new("0HB".to_string());
        assert_eq!(generator.next_uid(), "0HBAAAAAC");
        assert_eq!(generator.next_uid(), "0HBAAAAAD");
    }

    #[test]
    fn base36_encode() {
        assert_eq!(base36_encode_6(0), "AAAAAA");
        assert_eq!(base36_encode_6(35), "AAAAA9");
        assert_eq!(base36_encode_6(36), "AAAABA");
    }
}
