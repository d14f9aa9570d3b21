//! Binding of one request to one consumer target.

use std::fmt;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};

use crate::domain::entities::{Bitmap, CacheKey, LoadedFrom, Priority, Request, Tag, TargetId};
use crate::domain::errors::LoadError;
use crate::domain::ports::Target;

static NEXT_ACTION_ID: AtomicU64 = AtomicU64::new(1);

/// Unique identity of an action.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ActionId(u64);

impl ActionId {
    fn next() -> Self {
        Self(NEXT_ACTION_ID.fetch_add(1, Ordering::Relaxed))
    }
}

impl fmt::Display for ActionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "A{}", self.0)
    }
}

/// Per-load consumer options.
#[derive(Debug, Clone, Default)]
pub struct LoadOptions {
    /// Tag for bulk pause, resume and cancel.
    pub tag: Option<Tag>,
    /// Shown while loading.
    pub placeholder: Option<Bitmap>,
    /// Shown on failure.
    pub error_placeholder: Option<Bitmap>,
}

impl LoadOptions {
    /// Creates empty options.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Sets the tag.
    #[must_use]
    pub fn tag(mut self, tag: impl Into<Tag>) -> Self {
        self.tag = Some(tag.into());
        self
    }

    /// Sets the loading placeholder.
    #[must_use]
    pub fn placeholder(mut self, placeholder: Bitmap) -> Self {
        self.placeholder = Some(placeholder);
        self
    }

    /// Sets the failure placeholder.
    #[must_use]
    pub fn error_placeholder(mut self, placeholder: Bitmap) -> Self {
        self.error_placeholder = Some(placeholder);
        self
    }
}

/// One pending load into one target.
///
/// Owned by whichever dispatcher structure currently holds it: a hunter,
/// the paused map, the replay map, or the callback queue.
pub struct Action {
    id: ActionId,
    request: Request,
    target: Arc<dyn Target>,
    target_id: TargetId,
    tag: Option<Tag>,
    placeholder: Option<Bitmap>,
    error_placeholder: Option<Bitmap>,
    cancelled: Arc<AtomicBool>,
    will_replay: bool,
}

impl Action {
    /// Binds `request` to `target`.
    #[must_use]
    pub fn new(request: Request, target: Arc<dyn Target>, options: LoadOptions) -> Self {
        let target_id = target.id();
        Self {
            id: ActionId::next(),
            request,
            target,
            target_id,
            tag: options.tag,
            placeholder: options.placeholder,
            error_placeholder: options.error_placeholder,
            cancelled: Arc::new(AtomicBool::new(false)),
            will_replay: false,
        }
    }

    /// Lightweight handle for cancelling from outside the dispatcher.
    #[must_use]
    pub fn handle(&self) -> ActionHandle {
        ActionHandle {
            id: self.id,
            key: self.request.key().clone(),
            target_id: self.target_id,
            tag: self.tag.clone(),
            cancelled: self.cancelled.clone(),
        }
    }

    /// Unique id of this action.
    #[must_use]
    pub const fn id(&self) -> ActionId {
        self.id
    }

    /// Request this action loads.
    #[must_use]
    pub const fn request(&self) -> &Request {
        &self.request
    }

    /// Cache key of the request.
    #[must_use]
    pub fn key(&self) -> &CacheKey {
        self.request.key()
    }

    /// Priority of the request.
    #[must_use]
    pub fn priority(&self) -> Priority {
        self.request.priority()
    }

    /// Target receiving the result.
    #[must_use]
    pub const fn target_id(&self) -> TargetId {
        self.target_id
    }

    /// Tag used for group pause and cancel.
    #[must_use]
    pub const fn tag(&self) -> Option<&Tag> {
        self.tag.as_ref()
    }

    /// Returns true if this action carries `tag`.
    #[must_use]
    pub fn has_tag(&self, tag: &Tag) -> bool {
        self.tag.as_ref() == Some(tag)
    }

    /// Returns true once cancelled.
    #[must_use]
    pub fn is_cancelled(&self) -> bool {
        self.cancelled.load(Ordering::SeqCst)
    }

    /// Marks the action cancelled; later deliveries become no-ops.
    pub fn cancel(&self) {
        self.cancelled.store(true, Ordering::SeqCst);
    }

    /// Returns true while parked for replay on reconnect.
    #[must_use]
    pub const fn will_replay(&self) -> bool {
        self.will_replay
    }

    /// Marks or clears the replay parking flag.
    pub fn set_will_replay(&mut self, will_replay: bool) {
        self.will_replay = will_replay;
    }

    /// Detached placeholder delivery, runnable on the callback context
    /// while the action itself travels to the dispatcher.
    #[must_use]
    pub fn prepare_load(&self) -> PrepareLoad {
        PrepareLoad {
            target: self.target.clone(),
            placeholder: self.placeholder.clone(),
            cancelled: self.cancelled.clone(),
        }
    }

    /// Delivers the final image unless cancelled.
    pub fn complete(&self, bitmap: Bitmap, loaded_from: LoadedFrom) {
        if self.is_cancelled() {
            return;
        }
        self.target.on_success(bitmap, loaded_from);
    }

    /// Delivers a failure unless cancelled.
    pub fn error(&self, error: &LoadError) {
        if self.is_cancelled() {
            return;
        }
        self.target.on_failure(error, self.error_placeholder.as_ref());
    }
}

impl fmt::Debug for Action {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Action")
            .field("id", &self.id)
            .field("key", self.request.key())
            .field("target", &self.target_id)
            .field("tag", &self.tag)
            .field("cancelled", &self.is_cancelled())
            .field("will_replay", &self.will_replay)
            .finish()
    }
}

/// Pending `on_prepare_load` call for one action.
pub struct PrepareLoad {
    target: Arc<dyn Target>,
    placeholder: Option<Bitmap>,
    cancelled: Arc<AtomicBool>,
}

impl PrepareLoad {
    /// Hands the placeholder to the target unless the action was cancelled.
    pub fn run(&self) {
        if self.cancelled.load(Ordering::SeqCst) {
            return;
        }
        self.target.on_prepare_load(self.placeholder.as_ref());
    }
}

impl fmt::Debug for PrepareLoad {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("PrepareLoad")
            .field("target", &self.target.id())
            .field("placeholder", &self.placeholder.is_some())
            .finish()
    }
}

/// Caller-side reference to a submitted action.
#[derive(Debug, Clone)]
pub struct ActionHandle {
    id: ActionId,
    key: CacheKey,
    target_id: TargetId,
    tag: Option<Tag>,
    cancelled: Arc<AtomicBool>,
}

impl ActionHandle {
    /// Id of the action behind this handle.
    #[must_use]
    pub const fn id(&self) -> ActionId {
        self.id
    }

    /// Cache key of the action.
    #[must_use]
    pub const fn key(&self) -> &CacheKey {
        &self.key
    }

    /// Target of the action.
    #[must_use]
    pub const fn target_id(&self) -> TargetId {
        self.target_id
    }

    /// Tag of the action.
    #[must_use]
    pub const fn tag(&self) -> Option<&Tag> {
        self.tag.as_ref()
    }

    /// Returns true once the action was cancelled.
    #[must_use]
    pub fn is_cancelled(&self) -> bool {
        self.cancelled.load(Ordering::SeqCst)
    }

    /// Sets the shared cancelled flag.
    pub fn cancel(&self) {
        self.cancelled.store(true, Ordering::SeqCst);
    }
}
