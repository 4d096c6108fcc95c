//! NewType wrappers for the identifiers that flow through tenant resolution.
//!
//! External and internal tenant identifiers are both plain strings on the
//! wire and are easy to swap by accident; these wrappers keep them apart.

use serde::{Deserialize, Serialize};
use std::fmt;

/// Macro to generate a NewType wrapper with standard trait implementations.
macro_rules! newtype_string {
    (
        $(#[$meta:meta])*
        $name:ident
    ) => {
        $(#[$meta])*
        #[derive(Debug, Clone, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
        #[serde(transparent)]
        pub struct $name(String);

        impl $name {
            /// Create a new instance.
            pub fn new(value: impl Into<String>) -> Self {
                Self(value.into())
            }

            /// Get the inner value as a string slice.
            pub fn as_str(&self) -> &str {
                &self.0
            }

            /// Consume and return the inner String.
            pub fn into_inner(self) -> String {
                self.0
            }

            pub fn is_empty(&self) -> bool {
                self.0.is_empty()
            }
        }

        impl From<String> for $name {
            fn from(s: String) -> Self {
                Self(s)
            }
        }

        impl From<&str> for $name {
            fn from(s: &str) -> Self {
                Self(s.to_string())
            }
        }

        impl AsRef<str> for $name {
            fn as_ref(&self) -> &str {
                &self.0
            }
        }

        impl fmt::Display for $name {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                write!(f, "{}", self.0)
            }
        }

        impl std::borrow::Borrow<str> for $name {
            fn borrow(&self) -> &str {
                &self.0
            }
        }
    };
}

newtype_string!(
    /// Tenant identifier as known by the external account system
    /// (e.g. a global account or subaccount GUID carried in tokens).
    ExternalTenantId
);

newtype_string!(
    /// Locally assigned tenant identifier.
    ///
    /// An empty value means the external tenant has not been imported yet.
    /// That is a valid resolution outcome, not an error.
    InternalTenantId
);

newtype_string!(
    /// Identifier of a stored programmatic credential.
    SystemAuthId
);

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    #[test]
    fn test_newtype_creation() {
        let id = ExternalTenantId::new("ga-123");
        assert_eq!(id.as_str(), "ga-123");
        assert_eq!(id.to_string(), "ga-123");
        assert!(!id.is_empty());
        assert!(InternalTenantId::default().is_empty());
    }

    #[test]
    fn test_newtype_serde_transparent() {
        let id = InternalTenantId::new("tenant-1");
        let json = serde_json::to_string(&id).unwrap();
        assert_eq!(json, "\"tenant-1\"");

        let back: InternalTenantId = serde_json::from_str(&json).unwrap();
        assert_eq!(back, id);
    }

    #[test]
    fn test_newtype_hashmap_lookup_by_str() {
        let mut map = HashMap::new();
        map.insert(SystemAuthId::new("sa-1"), 1);
        assert_eq!(map.get("sa-1"), Some(&1));
    }
}
