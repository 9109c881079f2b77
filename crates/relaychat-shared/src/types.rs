use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Deserializer, Serialize, Serializer};

use crate::error::IdentifierParseError;

/// Identifier shared by users, conversations, messages and relay bundles.
///
/// An identifier is a numeric `id` optionally rooted at a parent identifier,
/// usually the id of the server that minted it. Ordering compares `id` first
/// and falls back to the root chain, where an absent root sorts lowest.
/// A null identifier is expressed as `Option<Uuid>::None`, which sorts below
/// every `Some`.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct Uuid {
    // Field order drives the derived ordering: id, then root.
    id: u32,
    root: Option<Box<Uuid>>,
}

impl Uuid {
    pub fn new(root: Option<Uuid>, id: u32) -> Self {
        Self {
            id,
            root: root.map(Box::new),
        }
    }

    /// An identifier with no root, e.g. a server id.
    pub fn top(id: u32) -> Self {
        Self { id, root: None }
    }

    pub fn id(&self) -> u32 {
        self.id
    }

    pub fn root(&self) -> Option<&Uuid> {
        self.root.as_deref()
    }
}

impl fmt::Display for Uuid {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if let Some(root) = &self.root {
            write!(f, "{root}.")?;
        }
        write!(f, "{}", self.id)
    }
}

impl FromStr for Uuid {
    type Err = IdentifierParseError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let s = s.trim();
        if s.is_empty() {
            return Err(IdentifierParseError::Empty);
        }

        let mut current: Option<Uuid> = None;
        for part in s.split('.') {
            let id = part
                .parse::<u32>()
                .map_err(|_| IdentifierParseError::InvalidComponent(part.to_string()))?;
            current = Some(Uuid::new(current, id));
        }

        current.ok_or(IdentifierParseError::Empty)
    }
}

impl Serialize for Uuid {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.collect_str(self)
    }
}

impl<'de> Deserialize<'de> for Uuid {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let s = String::deserialize(deserializer)?;
        s.parse().map_err(serde::de::Error::custom)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_ordering_by_id_then_root() {
        let server_a = Uuid::top(1);
        let server_b = Uuid::top(2);

        let a5 = Uuid::new(Some(server_a.clone()), 5);
        let b5 = Uuid::new(Some(server_b), 5);
        let a6 = Uuid::new(Some(server_a), 6);

        assert!(a5 < b5);
        assert!(b5 < a6);
        assert!(Uuid::top(5) < a5);
    }

    #[test]
    fn test_null_sorts_lowest() {
        let null: Option<Uuid> = None;
        assert!(null < Some(Uuid::top(0)));
        assert!(null < Some(Uuid::new(Some(Uuid::top(9)), 0)));
    }

    #[test]
    fn test_display_and_parse() {
        let id = Uuid::new(Some(Uuid::new(Some(Uuid::top(3)), 10)), 42);
        assert_eq!(id.to_string(), "3.10.42");
        assert_eq!("3.10.42".parse::<Uuid>().unwrap(), id);
    }

    #[test]
    fn test_parse_rejects_garbage() {
        assert!("".parse::<Uuid>().is_err());
        assert!("1..2".parse::<Uuid>().is_err());
        assert!("abc".parse::<Uuid>().is_err());
    }

    #[test]
    fn test_serde_as_string() {
        let id = Uuid::new(Some(Uuid::top(1)), 2);
        let json = serde_json::to_string(&id).unwrap();
        assert_eq!(json, "\"1.2\"");
        let back: Uuid = serde_json::from_str(&json).unwrap();
        assert_eq!(back, id);
    }
}
