//! Execution unit: one in-flight load per distinct cache key.

use std::any::Any;
use std::panic::{AssertUnwindSafe, catch_unwind};
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};

use futures_util::FutureExt;
use image::DynamicImage;
use tracing::{debug, trace, warn};

use super::action::{Action, ActionId};
use super::stats::Stats;
use crate::domain::Connectivity;
use crate::domain::entities::{
    Bitmap, CacheKey, LoadedFrom, MemoryPolicy, NetworkPolicy, Priority, Request, is_released,
};
use crate::domain::errors::{LoadError, TransformFault};
use crate::domain::ports::{Cache, RequestHandler, Transformation};
use crate::infrastructure::handlers::UnrecognizedRequestHandler;
use crate::infrastructure::transform::GeometryTransformation;

static NEXT_SEQUENCE: AtomicU64 = AtomicU64::new(0);

/// Shared collaborators every job needs.
#[derive(Clone)]
pub struct JobContext {
    /// Decoded image cache.
    pub cache: Arc<dyn Cache>,
    /// Event counters.
    pub stats: Arc<Stats>,
}

/// Result of one execution attempt.
#[derive(Debug)]
#[allow(missing_docs)]
pub enum HuntOutcome {
    /// Final, transformed image.
    Success {
        bitmap: Bitmap,
        loaded_from: LoadedFrom,
    },
    /// Terminal failure.
    Failed(LoadError),
    /// Failure the dispatcher may retry.
    Retry(LoadError),
    /// A transformation broke its contract.
    Fault(TransformFault),
}

/// Outcome tagged with the hunt that produced it.
#[derive(Debug)]
pub struct HuntReport {
    /// Key of the hunt.
    pub key: CacheKey,
    /// Sequence of the hunter, used to drop stale reports.
    pub sequence: u64,
    /// What the attempt produced.
    pub outcome: HuntOutcome,
}

/// Coalesces every action wanting the same cache key into one load.
///
/// Owned by the dispatcher. Never reused once cancelled.
pub struct Hunter {
    sequence: u64,
    key: CacheKey,
    request: Request,
    handler: Arc<dyn RequestHandler>,
    action: Option<Action>,
    actions: Vec<Action>,
    priority: Priority,
    retry_count: u32,
    memory_policy: MemoryPolicy,
    network_policy: NetworkPolicy,
    cancelled: Arc<AtomicBool>,
}

impl std::fmt::Debug for Hunter {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Hunter")
            .field("sequence", &self.sequence)
            .field("key", &self.key)
            .field("handler", &self.handler.name())
            .field("actions", &self.action_count())
            .field("priority", &self.priority)
            .field("retry_count", &self.retry_count)
            .finish_non_exhaustive()
    }
}

impl Hunter {
    /// Creates a hunter for `action`, picking the first handler that
    /// accepts its request.
    #[must_use]
    pub fn for_request(action: Action, handlers: &[Arc<dyn RequestHandler>]) -> Self {
        let request = action.request().clone();
        let handler = handlers
            .iter()
            .find(|handler| handler.can_handle(&request))
            .cloned()
            .unwrap_or_else(|| Arc::new(UnrecognizedRequestHandler));

        debug!(
            request = %request.log_id(),
            key = %request.key(),
            handler = handler.name(),
            "Created hunter"
        );

        Self {
            sequence: NEXT_SEQUENCE.fetch_add(1, Ordering::Relaxed),
            key: request.key().clone(),
            retry_count: handler.retry_count(),
            memory_policy: request.memory_policy(),
            network_policy: request.network_policy(),
            priority: action.priority(),
            request,
            handler,
            action: Some(action),
            actions: Vec::new(),
            cancelled: Arc::new(AtomicBool::new(false)),
        }
    }

    /// Tie-breaker for equal priorities; lower runs first.
    #[must_use]
    pub const fn sequence(&self) -> u64 {
        self.sequence
    }

    /// Cache key shared by every attached action.
    #[must_use]
    pub const fn key(&self) -> &CacheKey {
        &self.key
    }

    /// Request of the first action.
    #[must_use]
    pub const fn request(&self) -> &Request {
        &self.request
    }

    /// Max priority over attached actions.
    #[must_use]
    pub const fn priority(&self) -> Priority {
        self.priority
    }

    /// Retries left.
    #[must_use]
    pub const fn retry_count(&self) -> u32 {
        self.retry_count
    }

    /// Memory policy of the first action.
    #[must_use]
    pub const fn memory_policy(&self) -> MemoryPolicy {
        self.memory_policy
    }

    /// Network policy for the next attempt.
    #[must_use]
    pub const fn network_policy(&self) -> NetworkPolicy {
        self.network_policy
    }

    /// Adds policy bits for subsequent attempts.
    pub fn add_network_policy(&mut self, policy: NetworkPolicy) {
        self.network_policy |= policy;
    }

    /// Returns true once cancelled.
    #[must_use]
    pub fn is_cancelled(&self) -> bool {
        self.cancelled.load(Ordering::SeqCst)
    }

    /// Number of attached actions.
    #[must_use]
    pub fn action_count(&self) -> usize {
        usize::from(self.action.is_some()) + self.actions.len()
    }

    /// Iterates attached actions, primary first.
    pub fn actions(&self) -> impl Iterator<Item = &Action> {
        self.action.iter().chain(self.actions.iter())
    }

    /// Attaches another consumer of this key.
    pub fn attach(&mut self, action: Action) {
        trace!(key = %self.key, action = %action.id(), "Attaching action to hunter");
        self.priority = self.priority.max(action.priority());
        if self.action.is_none() {
            self.action = Some(action);
        } else {
            self.actions.push(action);
        }
    }

    /// Detaches the action with `id`, returning it if it was attached.
    pub fn detach(&mut self, id: ActionId) -> Option<Action> {
        let detached = if self.action.as_ref().is_some_and(|a| a.id() == id) {
            self.action.take()
        } else {
            let index = self.actions.iter().position(|a| a.id() == id)?;
            Some(self.actions.remove(index))
        };

        if let Some(action) = &detached
            && action.priority() == self.priority
        {
            self.recompute_priority();
        }
        detached
    }

    /// Detaches every action matching `predicate`.
    pub fn detach_matching(&mut self, predicate: impl Fn(&Action) -> bool) -> Vec<Action> {
        let mut detached = Vec::new();
        if self.action.as_ref().is_some_and(&predicate) {
            detached.extend(self.action.take());
        }
        let (matching, kept): (Vec<_>, Vec<_>) =
            std::mem::take(&mut self.actions).into_iter().partition(&predicate);
        self.actions = kept;
        detached.extend(matching);

        if !detached.is_empty() {
            self.recompute_priority();
        }
        detached
    }

    fn recompute_priority(&mut self) {
        self.priority = self
            .actions()
            .map(Action::priority)
            .max()
            .unwrap_or(Priority::Low);
    }

    /// Cancels the hunt if no action is attached any more.
    pub fn cancel(&self) -> bool {
        if self.action_count() > 0 {
            return false;
        }
        self.cancelled.store(true, Ordering::SeqCst);
        true
    }

    /// Consumes one retry if any remain and the handler agrees.
    pub fn should_retry(&mut self, airplane_mode: bool, connectivity: Connectivity) -> bool {
        if self.retry_count == 0 {
            return false;
        }
        self.retry_count -= 1;
        self.handler.should_retry(airplane_mode, connectivity)
    }

    /// Returns true if the handler wants replay on reconnect.
    #[must_use]
    pub fn supports_replay(&self) -> bool {
        self.handler.supports_replay()
    }

    /// Removes every attached action, primary first.
    pub fn take_actions(&mut self) -> Vec<Action> {
        let mut all = Vec::with_capacity(self.action_count());
        all.extend(self.action.take());
        all.append(&mut self.actions);
        all
    }

    /// Snapshot of the work for one execution attempt.
    #[must_use]
    pub fn job(&self, context: &JobContext) -> HuntJob {
        let mut network_policy = self.network_policy;
        if self.retry_count == 0 {
            network_policy |= NetworkPolicy::OFFLINE;
        }
        HuntJob {
            sequence: self.sequence,
            key: self.key.clone(),
            request: self.request.clone(),
            handler: self.handler.clone(),
            memory_policy: self.memory_policy,
            network_policy,
            cancelled: self.cancelled.clone(),
            context: context.clone(),
        }
    }
}

/// One execution attempt, runnable on the worker pool.
pub struct HuntJob {
    sequence: u64,
    key: CacheKey,
    request: Request,
    handler: Arc<dyn RequestHandler>,
    memory_policy: MemoryPolicy,
    network_policy: NetworkPolicy,
    cancelled: Arc<AtomicBool>,
    context: JobContext,
}

impl HuntJob {
    /// Sequence of the hunter this job belongs to.
    #[must_use]
    pub const fn sequence(&self) -> u64 {
        self.sequence
    }

    /// Effective network policy of this attempt.
    #[must_use]
    pub const fn network_policy(&self) -> NetworkPolicy {
        self.network_policy
    }

    /// Runs the attempt. Returns `None` if the hunt was cancelled before
    /// it started.
    pub async fn run(self) -> Option<HuntReport> {
        if self.cancelled.load(Ordering::SeqCst) {
            trace!(key = %self.key, "Skipping cancelled hunt");
            return None;
        }

        // A handler panic must still produce a report, or the hunter stays
        // registered and every later action for this key waits forever.
        let outcome = match AssertUnwindSafe(self.execute()).catch_unwind().await {
            Ok(outcome) => outcome,
            Err(payload) => {
                let message = panic_message(payload.as_ref());
                warn!(
                    request = %self.request.log_id(),
                    handler = self.handler.name(),
                    %message,
                    "Request handler panicked"
                );
                HuntOutcome::Failed(LoadError::handler_panicked(self.handler.name(), message))
            }
        };
        Some(HuntReport {
            key: self.key,
            sequence: self.sequence,
            outcome,
        })
    }

    async fn execute(&self) -> HuntOutcome {
        if self.memory_policy.should_read_from_memory_cache()
            && let Some(bitmap) = self.context.cache.get(&self.key)
        {
            self.context.stats.cache_hit();
            debug!(request = %self.request.log_id(), "Hunt served from memory cache");
            return HuntOutcome::Success {
                bitmap,
                loaded_from: LoadedFrom::Memory,
            };
        }

        debug!(
            request = %self.request.log_id(),
            handler = self.handler.name(),
            policy = ?self.network_policy,
            "Executing hunt"
        );

        let fetched = match self.handler.load(&self.request, self.network_policy).await {
            Ok(fetched) => fetched,
            Err(error) if error.is_retryable() => return HuntOutcome::Retry(error),
            Err(error) => return HuntOutcome::Failed(error),
        };
        self.context.stats.bitmap_decoded(&fetched.image);

        let chain = transformation_chain(&self.request, fetched.exif_orientation);
        if chain.is_empty() {
            return HuntOutcome::Success {
                bitmap: Arc::new(fetched.image),
                loaded_from: fetched.loaded_from,
            };
        }

        let key = self.key.clone();
        let image = fetched.image;
        let transformed =
            tokio::task::spawn_blocking(move || apply_transformations(image, &chain)).await;

        match transformed {
            Ok(Ok(image)) => {
                self.context.stats.bitmap_transformed(&image);
                HuntOutcome::Success {
                    bitmap: Arc::new(image),
                    loaded_from: fetched.loaded_from,
                }
            }
            Ok(Err(fault)) => HuntOutcome::Fault(fault),
            Err(e) => HuntOutcome::Fault(TransformFault::Panicked {
                key: key.to_string(),
                message: e.to_string(),
            }),
        }
    }
}

/// Geometry first when needed, then the request's own transformations.
fn transformation_chain(request: &Request, exif_orientation: u8) -> Vec<Arc<dyn Transformation>> {
    let mut chain: Vec<Arc<dyn Transformation>> = Vec::new();
    if GeometryTransformation::is_needed(request, exif_orientation) {
        chain.push(Arc::new(GeometryTransformation::new(request, exif_orientation)));
    }
    chain.extend(request.transformations().iter().cloned());
    chain
}

/// Applies `chain` in order, turning panics and released results into faults.
fn apply_transformations(
    mut image: DynamicImage,
    chain: &[Arc<dyn Transformation>],
) -> Result<DynamicImage, TransformFault> {
    for transformation in chain {
        image = catch_unwind(AssertUnwindSafe(|| transformation.transform(image))).map_err(
            |payload| TransformFault::Panicked {
                key: transformation.key(),
                message: panic_message(payload.as_ref()),
            },
        )?;

        if is_released(&image) {
            return Err(TransformFault::ReleasedResult {
                key: transformation.key(),
            });
        }
    }
    Ok(image)
}

fn panic_message(payload: &(dyn Any + Send)) -> String {
    payload
        .downcast_ref::<&str>()
        .map(ToString::to_string)
        .or_else(|| payload.downcast_ref::<String>().cloned())
        .unwrap_or_else(|| "unknown panic".to_string())
}
