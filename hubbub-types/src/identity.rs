//! The display name a connection claims at authentication.

use serde::{Deserialize, Serialize};
use std::borrow::Borrow;
use std::fmt;
use std::str::FromStr;

/// Maximum identity length in characters.
pub const MAX_IDENTITY_LEN: usize = 20;

/// A validated identity: 1-20 characters from `[A-Za-z0-9_-]`.
///
/// Identities are immutable once claimed and act as the key into the relay's
/// connection registry. Deserialization goes through the same validation as
/// [`Identity::parse`], so a malformed name can never enter the system via
/// the wire.
#[derive(Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(try_from = "String")]
pub struct Identity(String);

impl Identity {
    /// Validate and construct an identity.
    pub fn parse(name: &str) -> Result<Self, IdentityError> {
        if name.is_empty() {
            return Err(IdentityError::Empty);
        }
        if name.len() > MAX_IDENTITY_LEN {
            return Err(IdentityError::TooLong {
                len: name.len(),
                max: MAX_IDENTITY_LEN,
            });
        }
        if let Some(ch) = name
            .chars()
            .find(|c| !c.is_ascii_alphanumeric() && *c != '_' && *c != '-')
        {
            return Err(IdentityError::InvalidChar(ch));
        }
        Ok(Self(name.to_string()))
    }

    /// The identity as a string slice.
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl TryFrom<String> for Identity {
    type Error = IdentityError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        Identity::parse(&value)
    }
}

impl FromStr for Identity {
    type Err = IdentityError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Identity::parse(s)
    }
}

// Lets a HashMap<Identity, _> be probed with a plain &str, e.g. a message
// target parsed out of a command line.
impl Borrow<str> for Identity {
    fn borrow(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for Identity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl fmt::Debug for Identity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Identity({})", self.0)
    }
}

/// Why an identity failed validation.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum IdentityError {
    /// The name was empty.
    #[error("identity is empty")]
    Empty,

    /// The name exceeded [`MAX_IDENTITY_LEN`].
    #[error("identity is {len} characters (max {max})")]
    TooLong {
        /// Actual length in bytes.
        len: usize,
        /// Maximum allowed length.
        max: usize,
    },

    /// The name contained a character outside `[A-Za-z0-9_-]`.
    #[error("identity contains invalid character {0:?}")]
    InvalidChar(char),
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn accepts_valid_names() {
        for name in ["a", "alice", "Bob_42", "x-y-z", "A1234567890123456789"] {
            assert!(Identity::parse(name).is_ok(), "{name} should be valid");
        }
    }

    #[test]
    fn rejects_empty() {
        assert_eq!(Identity::parse(""), Err(IdentityError::Empty));
    }

    #[test]
    fn rejects_over_twenty_chars() {
        let name = "a".repeat(21);
        assert!(matches!(
            Identity::parse(&name),
            Err(IdentityError::TooLong { len: 21, .. })
        ));

        // Exact boundary passes
        let name = "a".repeat(20);
        assert!(Identity::parse(&name).is_ok());
    }

    #[test]
    fn rejects_bad_characters() {
        for (name, bad) in [("has space", ' '), ("semi;colon", ';'), ("dot.name", '.')] {
            assert_eq!(Identity::parse(name), Err(IdentityError::InvalidChar(bad)));
        }
    }

    #[test]
    fn borrow_matches_map_lookup() {
        use std::collections::HashMap;

        let alice = Identity::parse("alice").unwrap();
        let mut map = HashMap::new();
        map.insert(alice, 1u32);

        assert_eq!(map.get("alice"), Some(&1));
        assert_eq!(map.get("bob"), None);
    }

    #[test]
    fn deserialization_validates() {
        let ok: Result<Identity, _> = serde_json::from_str("\"alice\"");
        assert!(ok.is_ok());

        let bad: Result<Identity, _> = serde_json::from_str("\"not valid\"");
        assert!(bad.is_err());
    }

    #[test]
    fn ordering_is_lexicographic() {
        let mut names: Vec<Identity> = ["carol", "alice", "bob"]
            .iter()
            .map(|n| Identity::parse(n).unwrap())
            .collect();
        names.sort();
        let sorted: Vec<&str> = names.iter().map(|n| n.as_str()).collect();
        assert_eq!(sorted, vec!["alice", "bob", "carol"]);
    }
}
