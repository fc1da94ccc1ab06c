//! Antelope account and table names.
//!
//! A name is a 64-bit value packing up to 12 base-32 characters (charset
//! `.12345abcdefghijklmnopqrstuvwxyz`) plus a 13th character restricted to
//! the first 16 symbols. Equality and ordering are unsigned 64-bit.

use std::fmt;
use std::str::FromStr;

const CHARMAP: &[u8; 32] = b".12345abcdefghijklmnopqrstuvwxyz";

#[derive(Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Default)]
pub struct Name(pub u64);

impl Name {
    pub const fn new(value: u64) -> Self {
        Name(value)
    }

    pub fn as_u64(self) -> u64 {
        self.0
    }

    /// The empty name. Used as the "no sender" marker on top-level actions.
    pub fn is_empty(self) -> bool {
        self.0 == 0
    }
}

fn char_to_symbol(c: u8) -> Option<u64> {
    match c {
        b'.' => Some(0),
        b'1'..=b'5' => Some((c - b'1') as u64 + 1),
        b'a'..=b'z' => Some((c - b'a') as u64 + 6),
        _ => None,
    }
}

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ParseNameError {
    #[error("name is longer than 13 characters")]
    TooLong,
    #[error("invalid character {0:?} in name")]
    BadChar(char),
    #[error("13th character out of range (must be one of .12345abcdefghij)")]
    BadThirteenth,
}

impl FromStr for Name {
    type Err = ParseNameError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let bytes = s.as_bytes();
        if bytes.len() > 13 {
            return Err(ParseNameError::TooLong);
        }
        let mut value: u64 = 0;
        for (i, &c) in bytes.iter().enumerate() {
            let sym = char_to_symbol(c).ok_or(ParseNameError::BadChar(c as char))?;
            if i < 12 {
                value |= (sym & 0x1f) << (64 - 5 * (i + 1));
            } else {
                if sym > 0x0f {
                    return Err(ParseNameError::BadThirteenth);
                }
                value |= sym;
            }
        }
        Ok(Name(value))
    }
}

impl fmt::Display for Name {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let mut chars = [b'.'; 13];
        let mut tmp = self.0;
        for i in 0..13 {
            let idx = (tmp & if i == 0 { 0x0f } else { 0x1f }) as usize;
            chars[12 - i] = CHARMAP[idx];
            tmp >>= if i == 0 { 4 } else { 5 };
        }
        let mut end = chars.len();
        while end > 0 && chars[end - 1] == b'.' {
            end -= 1;
        }
        f.write_str(std::str::from_utf8(&chars[..end]).unwrap())
    }
}

impl fmt::Debug for Name {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Name({})", self)
    }
}

impl From<u64> for Name {
    fn from(value: u64) -> Self {
        Name(value)
    }
}
