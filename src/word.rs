//! The memory cell representation.
//!
//! A cell tolerates heterogeneous content: it reads as an opcode
//! mnemonic when PC points at it, and as an integer otherwise. This
//! models that with a two-variant tagged union rather than three
//! (`Int`/`Op`/`Sub`) — the opcode-vs-syscall-subtype distinction is
//! purely contextual (which operand position a string lands in), not
//! a property of the cell itself, so a single `Str` variant covers
//! opcode mnemonics, syscall subtype tokens, and the arbitrary
//! non-numeric literal tokens the data section may hold.

use std::fmt;

/// A single memory cell: either a signed integer or a literal string
/// token (an opcode mnemonic, a syscall subtype, or untyped data).
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Word {
    Int(i64),
    Str(String),
}

impl Word {
    /// Parse a program-file token the way the loader does: integer if
    /// possible, otherwise the literal string.
    pub fn from_token(token: &str) -> Word {
        match token.parse::<i64>() {
            Ok(n) => Word::Int(n),
            Err(_) => Word::Str(token.to_string()),
        }
    }

    pub fn as_int(&self) -> Option<i64> {
        match self {
            Word::Int(n) => Some(*n),
            Word::Str(_) => None,
        }
    }

    pub fn as_str(&self) -> Option<&str> {
        match self {
            Word::Str(s) => Some(s),
            Word::Int(_) => None,
        }
    }
}

impl From<i64> for Word {
    fn from(n: i64) -> Self {
        Word::Int(n)
    }
}

impl From<&str> for Word {
    fn from(s: &str) -> Self {
        Word::Str(s.to_string())
    }
}

impl fmt::Display for Word {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Word::Int(n) => write!(f, "{n}"),
            Word::Str(s) => write!(f, "{s}"),
        }
    }
}
