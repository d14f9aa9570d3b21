//! Target identity to live action mapping.
//!
//! Replaces weak back-references from consumer targets: a newer load into
//! the same target supersedes the older one, and consumers drop their entry
//! explicitly when the target goes away.

use std::collections::HashMap;
use std::sync::Arc;

use parking_lot::Mutex;

use super::action::{ActionHandle, ActionId};
use crate::domain::entities::{Tag, TargetId};

/// Shared registry of the current action per target.
#[derive(Debug, Clone, Default)]
pub struct TargetRegistry {
    inner: Arc<Mutex<HashMap<TargetId, ActionHandle>>>,
}

impl TargetRegistry {
    /// Creates an empty registry.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Records `handle` as current for its target, returning the one it
    /// superseded.
    pub fn replace(&self, handle: ActionHandle) -> Option<ActionHandle> {
        self.inner.lock().insert(handle.target_id(), handle)
    }

    /// Removes the entry for `target` only if it still points at `id`.
    pub fn remove_if(&self, target: TargetId, id: ActionId) -> bool {
        let mut inner = self.inner.lock();
        if inner.get(&target).is_some_and(|handle| handle.id() == id) {
            inner.remove(&target);
            true
        } else {
            false
        }
    }

    /// Removes whatever entry `target` has.
    pub fn remove(&self, target: TargetId) -> Option<ActionHandle> {
        self.inner.lock().remove(&target)
    }

    /// Newest action registered for `target`.
    #[must_use]
    pub fn get(&self, target: TargetId) -> Option<ActionHandle> {
        self.inner.lock().get(&target).cloned()
    }

    /// Handles of every registered action carrying `tag`.
    #[must_use]
    pub fn handles_with_tag(&self, tag: &Tag) -> Vec<ActionHandle> {
        self.inner
            .lock()
            .values()
            .filter(|handle| handle.tag() == Some(tag))
            .cloned()
            .collect()
    }

    /// Number of registered targets.
    #[must_use]
    pub fn len(&self) -> usize {
        self.inner.lock().len()
    }

    /// Returns true if no target is registered.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.inner.lock().is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::entities::Request;
    use crate::domain::ports::mocks::RecordingTarget;
    use crate::infrastructure::dispatch::action::{Action, LoadOptions};

    fn action_for(target: &Arc<RecordingTarget>, options: LoadOptions) -> Action {
        let request = Request::uri("stub://a").build().expect("valid");
        Action::new(request, target.clone(), options)
    }

    #[test]
    fn test_replace_returns_superseded() {
        let registry = TargetRegistry::new();
        let (target, _rx) = RecordingTarget::channel();
        let target = Arc::new(target);

        let first = action_for(&target, LoadOptions::new()).handle();
        let second = action_for(&target, LoadOptions::new()).handle();

        assert!(registry.replace(first.clone()).is_none());
        let superseded = registry.replace(second.clone()).expect("superseded");
        assert_eq!(superseded.id(), first.id());
        assert_eq!(registry.len(), 1);

        assert!(!registry.remove_if(first.target_id(), first.id()));
        assert!(registry.remove_if(second.target_id(), second.id()));
        assert!(registry.is_empty());
    }

    #[test]
    fn test_handles_with_tag() {
        let registry = TargetRegistry::new();
        for tag in ["feed", "feed", "profile"] {
            let (target, _rx) = RecordingTarget::channel();
            let action = action_for(&Arc::new(target), LoadOptions::new().tag(tag));
            registry.replace(action.handle());
        }

        assert_eq!(registry.handles_with_tag(&Tag::from("feed")).len(), 2);
        assert_eq!(registry.handles_with_tag(&Tag::from("none")).len(), 0);
    }
}
