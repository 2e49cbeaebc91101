//! Identity newtypes.
//!
//! Each id wraps a primitive so the compiler keeps them apart: a
//! [`PlayerId`] can never be passed where a [`TaskId`] is expected.
//! `#[serde(transparent)]` keeps the wire form a plain number/string.

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

/// A player's identity, as issued by the external credential verifier.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct PlayerId(pub u64);

impl fmt::Display for PlayerId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "P-{}", self.0)
    }
}

/// An opaque question identifier from the external catalog.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct QuestionId(pub u64);

impl fmt::Display for QuestionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Q-{}", self.0)
    }
}

/// A delivery-task identifier, unique per broadcast obligation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct TaskId(pub u64);

impl fmt::Display for TaskId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "T-{}", self.0)
    }
}

// ---------------------------------------------------------------------------
// RoomCode
// ---------------------------------------------------------------------------

/// Length of every room code.
pub const CODE_LEN: usize = 6;

/// The reduced alphabet room codes are drawn from.
///
/// Excludes `0 O 1 I L`, the characters players most often misread when
/// typing a code off someone else's screen.
pub const CODE_ALPHABET: &[u8] = b"23456789ABCDEFGHJKMNPQRSTUVWXYZ";

/// A short human-typeable room identifier.
///
/// Always [`CODE_LEN`] characters from [`CODE_ALPHABET`]. Construction goes
/// through [`RoomCode::parse`] (or serde, which validates the same way), so
/// a held `RoomCode` is known well-formed.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct RoomCode(String);

/// Rejection reasons for a malformed room code.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum RoomCodeError {
    #[error("room code must be {CODE_LEN} characters, got {0}")]
    BadLength(usize),

    #[error("room code contains character {0:?} outside the code alphabet")]
    BadChar(char),
}

impl RoomCode {
    /// Validates and wraps a candidate code. Lowercase input is accepted
    /// and normalized, since players type codes by hand.
    pub fn parse(raw: &str) -> Result<Self, RoomCodeError> {
        let upper = raw.trim().to_ascii_uppercase();
        let count = upper.chars().count();
        if count != CODE_LEN {
            return Err(RoomCodeError::BadLength(count));
        }
        for ch in upper.chars() {
            // The ASCII check must come first: casting a wider char to
            // u8 truncates, which can land on an alphabet byte.
            if !ch.is_ascii() || !CODE_ALPHABET.contains(&(ch as u8)) {
                return Err(RoomCodeError::BadChar(ch));
            }
        }
        Ok(Self(upper))
    }

    /// Wraps a string already known to be drawn from the code alphabet.
    ///
    /// Only the allocator uses this; everything else goes through `parse`.
    pub(crate) fn from_generated(code: String) -> Self {
        debug_assert_eq!(code.len(), CODE_LEN);
        Self(code)
    }

    /// The code as a string slice.
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

/// Escape hatch for the allocator, which builds codes character by
/// character from [`CODE_ALPHABET`] and needs no re-validation.
pub fn code_from_alphabet(code: String) -> RoomCode {
    RoomCode::from_generated(code)
}

impl fmt::Display for RoomCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl FromStr for RoomCode {
    type Err = RoomCodeError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::parse(s)
    }
}

impl TryFrom<String> for RoomCode {
    type Error = RoomCodeError;

    fn try_from(s: String) -> Result<Self, Self::Error> {
        Self::parse(&s)
    }
}

impl From<RoomCode> for String {
    fn from(code: RoomCode) -> String {
        code.0
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_player_id_serializes_as_plain_number() {
        let json = serde_json::to_string(&PlayerId(42)).unwrap();
        assert_eq!(json, "42");
    }

    #[test]
    fn test_player_id_display() {
        assert_eq!(PlayerId(7).to_string(), "P-7");
    }

    #[test]
    fn test_room_code_parse_normalizes_case() {
        let code = RoomCode::parse("abc234").unwrap();
        assert_eq!(code.as_str(), "ABC234");
    }

    #[test]
    fn test_room_code_parse_rejects_wrong_length() {
        assert!(matches!(
            RoomCode::parse("ABCD2"),
            Err(RoomCodeError::BadLength(5))
        ));
    }

    #[test]
    fn test_room_code_parse_rejects_ambiguous_chars() {
        // 'O' and '0' are excluded from the alphabet.
        assert!(matches!(
            RoomCode::parse("ABCDO2"),
            Err(RoomCodeError::BadChar('O'))
        ));
        assert!(matches!(
            RoomCode::parse("ABCD02"),
            Err(RoomCodeError::BadChar('0'))
        ));
    }

    #[test]
    fn test_room_code_parse_rejects_non_ascii() {
        // '\u{134}' truncates to b'4' when cast to u8, so a plain byte
        // comparison against the alphabet would wave it through.
        assert!(matches!(
            RoomCode::parse("ABC23\u{134}"),
            Err(RoomCodeError::BadChar('\u{134}'))
        ));
        // Five chars but six bytes: length must count characters.
        assert!(matches!(
            RoomCode::parse("ABCD\u{134}"),
            Err(RoomCodeError::BadLength(5))
        ));
    }

    #[test]
    fn test_room_code_serde_round_trip() {
        let code = RoomCode::parse("XYZ789").unwrap();
        let json = serde_json::to_string(&code).unwrap();
        assert_eq!(json, "\"XYZ789\"");
        let back: RoomCode = serde_json::from_str(&json).unwrap();
        assert_eq!(back, code);
    }

    #[test]
    fn test_room_code_deserialize_rejects_invalid() {
        let result: Result<RoomCode, _> = serde_json::from_str("\"BAD!!\"");
        assert!(result.is_err());
    }

    #[test]
    fn test_alphabet_has_no_confusable_characters() {
        for banned in [b'0', b'O', b'1', b'I', b'L'] {
            assert!(!CODE_ALPHABET.contains(&banned));
        }
    }
}
