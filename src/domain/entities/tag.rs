//! Identities used to group and address consumers.

use std::fmt;
use std::sync::Arc;

use uuid::Uuid;

/// Label used to pause, resume or cancel a group of loads at once.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct Tag(Arc<str>);

impl Tag {
    /// Creates a new tag.
    #[must_use]
    pub fn new(value: impl AsRef<str>) -> Self {
        Self(Arc::from(value.as_ref()))
    }

    /// Returns the tag as string slice.
    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for Tag {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for Tag {
    fn from(s: &str) -> Self {
        Self::new(s)
    }
}

impl From<String> for Tag {
    fn from(s: String) -> Self {
        Self::new(s)
    }
}

/// Stable identity of a consumer target.
///
/// Consumers allocate one per view/slot and keep it for their lifetime; a
/// newer load for the same id supersedes the older one.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct TargetId(Uuid);

impl TargetId {
    /// Allocates a fresh identity.
    #[must_use]
    pub fn new() -> Self {
        Self(Uuid::new_v4())
    }
}

impl Default for TargetId {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Display for TargetId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_tag_equality_by_value() {
        assert_eq!(Tag::from("feed"), Tag::new(String::from("feed")));
        assert_ne!(Tag::from("feed"), Tag::from("profile"));
    }

    #[test]
    fn test_target_ids_are_unique() {
        assert_ne!(TargetId::new(), TargetId::new());
    }
}
