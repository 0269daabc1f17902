//! Newtype wrappers for domain identifiers.
//!
//! These types prevent accidental mixing of different ID types (e.g., using a
//! `PromotionId` where a `BuildId` is expected) and make the code more
//! self-documenting.

use serde::{Deserialize, Serialize};
use std::fmt;

/// Identifier of a concrete build instance.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct BuildId(pub u64);

impl fmt::Display for BuildId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "#{}", self.0)
    }
}

impl From<u64> for BuildId {
    fn from(n: u64) -> Self {
        BuildId(n)
    }
}

/// Identifier of a build promotion.
///
/// A promotion is the logical identity of a build across its queued and
/// running lifetime. It is the key used by the event order cache.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct PromotionId(pub u64);

impl fmt::Display for PromotionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "promotion {}", self.0)
    }
}

impl From<u64> for PromotionId {
    fn from(n: u64) -> Self {
        PromotionId(n)
    }
}

/// Identifier of a build configuration (build type).
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct BuildTypeId(pub String);

impl BuildTypeId {
    pub fn new(s: impl Into<String>) -> Self {
        BuildTypeId(s.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for BuildTypeId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl From<&str> for BuildTypeId {
    fn from(s: &str) -> Self {
        BuildTypeId(s.to_string())
    }
}

/// Identifier of a configured publishing feature on a build type.
///
/// Problems are tracked per publisher, so this is also the problem key.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct PublisherId(pub String);

impl PublisherId {
    pub fn new(s: impl Into<String>) -> Self {
        PublisherId(s.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for PublisherId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl From<&str> for PublisherId {
    fn from(s: &str) -> Self {
        PublisherId(s.to_string())
    }
}

/// Identifier of a server node in a clustered deployment.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct NodeId(pub String);

impl NodeId {
    pub fn new(s: impl Into<String>) -> Self {
        NodeId(s.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for NodeId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Identifier of a user account.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct UserId(pub u64);

impl fmt::Display for UserId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    mod build_id {
        use super::*;
        use proptest::prelude::*;

        proptest! {
            #[test]
            fn serde_is_transparent(n: u64) {
                let id = BuildId(n);
                let json = serde_json::to_string(&id).unwrap();
                prop_assert_eq!(json, n.to_string());
            }

            #[test]
            fn display_format(n: u64) {
                prop_assert_eq!(format!("{}", BuildId(n)), format!("#{}", n));
            }
        }
    }

    mod build_type_id {
        use super::*;
        use proptest::prelude::*;

        proptest! {
            #[test]
            fn serde_roundtrip(s in "[A-Za-z][A-Za-z0-9_]{0,40}") {
                let id = BuildTypeId::new(&s);
                let json = serde_json::to_string(&id).unwrap();
                let parsed: BuildTypeId = serde_json::from_str(&json).unwrap();
                prop_assert_eq!(id, parsed);
            }
        }
    }

    #[test]
    fn promotion_id_display() {
        assert_eq!(PromotionId(1234).to_string(), "promotion 1234");
    }

    #[test]
    fn publisher_id_from_str() {
        let id: PublisherId = "BUILD_EXT_1".into();
        assert_eq!(id.as_str(), "BUILD_EXT_1");
    }
}
