//! Strongly-typed identifiers.
//!
//! Handler tokens and job ids share one textual format, `"{type}:{suffix}"`.
//! The suffix is a time-ordered UUIDv7 in simple (hex) form: monotonic within
//! the process and ordered by creation time across restarts. Dispatch always
//! keys on the full id; the type prefix is only extracted for diagnostics.

use serde::{Deserialize, Serialize};
use std::borrow::Borrow;
use std::fmt;

/// Separator between the intent type and the unique suffix.
pub const ID_SEPARATOR: char = ':';

/// Macro to define a strongly-typed intent id newtype wrapper.
///
/// Generates: struct, `generate()`, `from_string()`, `as_str()`, `intent_type()`,
/// Display, `AsRef<str>`, `Borrow<str>` (so maps keyed by the id can be queried with `&str`),
/// Serialize, Deserialize.
macro_rules! define_id {
    ($name:ident) => {
        #[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
        #[serde(transparent)]
        pub struct $name(String);

        impl $name {
            /// Generate a fresh id for the given intent type.
            pub fn generate(intent_type: &str) -> Self {
                Self(format!(
                    "{}{}{}",
                    intent_type,
                    ID_SEPARATOR,
                    uuid::Uuid::now_v7().simple()
                ))
            }

            pub fn from_string(s: String) -> Result<Self, &'static str> {
                if s.is_empty() {
                    return Err(concat!(stringify!($name), " cannot be empty"));
                }
                Ok(Self(s))
            }

            pub fn as_str(&self) -> &str {
                &self.0
            }

            /// Type prefix of the id, if it has the `"{type}:{suffix}"` shape.
            pub fn intent_type(&self) -> Option<&str> {
                intent_type_of(&self.0)
            }
        }

        impl fmt::Display for $name {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                write!(f, "{}", self.0)
            }
        }

        impl Borrow<str> for $name {
            fn borrow(&self) -> &str {
                &self.0
            }
        }

        impl AsRef<str> for $name {
            fn as_ref(&self) -> &str {
                &self.0
            }
        }
    };
}

define_id!(HandlerToken);
define_id!(JobId);

/// Extract the type prefix from a raw token or job id.
///
/// Splits on the last separator since generated suffixes never contain one,
/// which keeps types that themselves contain `:` intact.
pub fn intent_type_of(id: &str) -> Option<&str> {
    id.rsplit_once(ID_SEPARATOR).map(|(prefix, _)| prefix)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashSet;

    #[test]
    fn test_generated_ids_carry_type_prefix() {
        let token = HandlerToken::generate("poll");
        assert!(token.as_str().starts_with("poll:"));
        assert_eq!(token.intent_type(), Some("poll"));

        let job = JobId::generate("reminder");
        assert_eq!(job.intent_type(), Some("reminder"));
    }

    #[test]
    fn test_generated_ids_are_unique() {
        let ids: HashSet<HandlerToken> = (0..1000).map(|_| HandlerToken::generate("poll")).collect();
        assert_eq!(ids.len(), 1000);
    }

    #[test]
    fn test_generated_ids_are_time_ordered() {
        let first = JobId::generate("reminder");
        let second = JobId::generate("reminder");
        assert!(first < second);
    }

    #[test]
    fn test_prefix_with_separator_in_type() {
        let token = HandlerToken::generate("vote:yes");
        assert_eq!(token.intent_type(), Some("vote:yes"));
        assert_eq!(intent_type_of("no-separator"), None);
    }

    #[test]
    fn test_from_string_rejects_empty() {
        assert!(JobId::from_string(String::new()).is_err());
        assert_eq!(
            JobId::from_string("reminder:abc".to_string()).unwrap().as_str(),
            "reminder:abc"
        );
    }

    #[test]
    fn test_serializes_as_plain_string() {
        let token = HandlerToken::from_string("poll:abc123".to_string()).unwrap();
        assert_eq!(serde_json::to_string(&token).unwrap(), "\"poll:abc123\"");
    }
}
