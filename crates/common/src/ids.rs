use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use uuid::Uuid;

use crate::error::TetherError;

macro_rules! define_id {
    ($name:ident, $label:literal, $doc:expr) => {
        #[doc = $doc]
        #[derive(
            Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize,
        )]
        #[serde(transparent)]
        pub struct $name(pub Uuid);

        impl $name {
            pub fn new() -> Self {
                Self(Uuid::new_v4())
            }

            pub fn from_uuid(id: Uuid) -> Self {
                Self(id)
            }

            /// Parse an externally supplied identifier.
            /// Malformed input is an `InvalidArgument`, never an internal error.
            pub fn parse(raw: &str) -> Result<Self, TetherError> {
                raw.trim().parse()
            }
        }

        impl Default for $name {
            fn default() -> Self {
                Self::new()
            }
        }

        impl fmt::Display for $name {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                write!(f, "{}", self.0)
            }
        }

        impl FromStr for $name {
            type Err = TetherError;

            fn from_str(s: &str) -> Result<Self, Self::Err> {
                Uuid::parse_str(s).map(Self).map_err(|e| {
                    TetherError::InvalidArgument(format!("malformed {} '{}': {}", $label, s, e))
                })
            }
        }

        impl From<Uuid> for $name {
            fn from(id: Uuid) -> Self {
                Self(id)
            }
        }

        impl From<$name> for Uuid {
            fn from(id: $name) -> Self {
                id.0
            }
        }
    };
}

define_id!(
    UserId,
    "user id",
    "Typed wrapper for identity UUIDs owned by the profile service."
);
define_id!(
    EdgeId,
    "edge id",
    "Typed wrapper for relationship edge UUIDs."
);

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_valid_user_id() {
        let raw = "6f1c2a3e-0d4b-4c55-9a77-1b2c3d4e5f60";
        let id = UserId::parse(raw).unwrap();
        assert_eq!(id.to_string(), raw);

        // Surrounding whitespace from query strings is tolerated.
        let padded = UserId::parse(&format!("  {}\n", raw)).unwrap();
        assert_eq!(padded, id);
    }

    #[test]
    fn test_parse_malformed_user_id_is_invalid_argument() {
        let err = UserId::parse("not-a-uuid").unwrap_err();
        assert!(matches!(err, TetherError::InvalidArgument(_)));
        assert!(err.to_string().contains("malformed user id"));
    }

    #[test]
    fn test_ids_are_ordered_by_uuid() {
        let low = UserId::from_uuid(Uuid::from_u128(1));
        let high = UserId::from_uuid(Uuid::from_u128(2));
        assert!(low < high);
        assert_eq!(low.max(high), high);
    }
}
