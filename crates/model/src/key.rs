use crate::error::{Error, ErrorKind};
use std::fmt::{Display, Formatter, Result as FmtResult};
use std::str::FromStr;

const MAX_KEY_LENGTH: usize = 128;

/// Identity of a screen, as handed out when the screen is registered.
///
/// Keys are opaque to the player, but they end up in URLs and database
/// filters, so only a conservative alphabet is accepted: ASCII letters,
/// digits, `-` and `_`. UUIDs (the common case) always pass.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct PlayerKey(String);

impl PlayerKey {
    /// Parse and validate a player key. Surrounding whitespace is ignored.
    pub fn parse(raw: impl AsRef<str>) -> Result<Self, Error> {
        let raw = raw.as_ref();
        let key = raw.trim();
        let valid = !key.is_empty()
            && key.len() <= MAX_KEY_LENGTH
            && key.chars().all(|c| c.is_ascii_alphanumeric() || c == '-' || c == '_');
        if !valid {
            exn::bail!(ErrorKind::InvalidPlayerKey(raw.to_string()));
        }
        Ok(Self(key.to_string()))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl FromStr for PlayerKey {
    type Err = Error;
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::parse(s)
    }
}

impl AsRef<str> for PlayerKey {
    fn as_ref(&self) -> &str {
        &self.0
    }
}

impl Display for PlayerKey {
    fn fmt(&self, f: &mut Formatter<'_>) -> FmtResult {
        f.write_str(&self.0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rstest::rstest;

    #[rstest]
    #[case("9f1c2a4e-6b1d-4c35-9a0e-2f7d8c9b1a22")]
    #[case("lobby_screen-01")]
    #[case("  padded  ")]
    fn test_valid_keys(#[case] raw: &str) {
        let key = PlayerKey::parse(raw).unwrap();
        assert_eq!(key.as_str(), raw.trim());
    }

    #[rstest]
    #[case("")]
    #[case("   ")]
    #[case("../../etc/passwd")]
    #[case("eq.1,or(id.gt.0)")]
    #[case("tela principal")]
    fn test_invalid_keys(#[case] raw: &str) {
        let err = PlayerKey::parse(raw).unwrap_err();
        assert!(matches!(&*err, ErrorKind::InvalidPlayerKey(_)));
        assert!(!err.is_retryable());
    }

    #[test]
    fn test_too_long() {
        assert!(PlayerKey::parse("a".repeat(MAX_KEY_LENGTH)).is_ok());
        assert!(PlayerKey::parse("a".repeat(MAX_KEY_LENGTH + 1)).is_err());
    }
}
