//! Consumer-facing entry point.
//!
//! [`ImagePipeline`] wires the dispatcher actor, the worker pool and the
//! callback context together and exposes the load, cancel and cache
//! operations consumers call.

use std::sync::Arc;

use tokio::sync::oneshot;
use tracing::{debug, info, trace};

use crate::domain::entities::{Bitmap, LoadedFrom, Request, Tag, TargetId};
use crate::domain::errors::{LoadError, LoadResult, TransformFault};
use crate::domain::ports::{Cache, RequestHandler, Target};
use crate::infrastructure::cache::{CacheStats, MemoryCache};
use crate::infrastructure::config::PipelineConfig;
use crate::infrastructure::dispatch::{
    Action, ActionHandle, CallbackContext, CallbackSender, Delivery, Dispatcher, DispatcherHandle,
    DispatcherParts, DispatcherSnapshot, FaultHandler, LoadOptions, Stats, StatsSnapshot,
    TargetRegistry, default_fault_handler,
};
use crate::infrastructure::handlers::{FileRequestHandler, NetworkRequestHandler};

/// Builder for [`ImagePipeline`].
#[must_use]
pub struct PipelineBuilder {
    config: PipelineConfig,
    cache: Option<Arc<dyn Cache>>,
    handlers: Vec<Arc<dyn RequestHandler>>,
    on_fault: Option<FaultHandler>,
}

impl PipelineBuilder {
    fn new() -> Self {
        Self {
            config: PipelineConfig::default(),
            cache: None,
            handlers: Vec::new(),
            on_fault: None,
        }
    }

    /// Engine settings; defaults otherwise.
    pub fn config(mut self, config: PipelineConfig) -> Self {
        self.config = config;
        self
    }

    /// Replaces the built-in memory cache.
    pub fn cache(mut self, cache: Arc<dyn Cache>) -> Self {
        self.cache = Some(cache);
        self
    }

    /// Adds a handler consulted before the built-in file and network ones.
    pub fn add_request_handler(mut self, handler: Arc<dyn RequestHandler>) -> Self {
        self.handlers.push(handler);
        self
    }

    /// Receives transformation faults instead of the panicking default.
    pub fn on_fault(mut self, on_fault: impl Fn(&TransformFault) + Send + Sync + 'static) -> Self {
        self.on_fault = Some(Arc::new(on_fault));
        self
    }

    /// Spawns the pipeline tasks. Must be called inside a tokio runtime.
    ///
    /// # Errors
    /// Returns `LoadError::Network` if the HTTP client cannot be built.
    pub fn build(self) -> LoadResult<ImagePipeline> {
        let config = self.config;
        let stats = Arc::new(Stats::new());

        let (cache, memory): (Arc<dyn Cache>, Option<Arc<MemoryCache>>) = match self.cache {
            Some(cache) => (cache, None),
            None => {
                let memory = Arc::new(MemoryCache::new(config.memory_cache_bytes));
                (memory.clone(), Some(memory))
            }
        };

        let mut handlers = self.handlers;
        handlers.push(Arc::new(FileRequestHandler));
        handlers.push(Arc::new(NetworkRequestHandler::new(
            config.network_timeout(),
            config.network_retry_count,
            stats.clone(),
        )?));

        let registry = TargetRegistry::new();
        let (dispatcher, inbox) = DispatcherHandle::channel();
        let (context, callbacks) = CallbackContext::new(
            registry.clone(),
            cache.clone(),
            stats.clone(),
            dispatcher.downgrade(),
            self.on_fault.unwrap_or_else(default_fault_handler),
        );
        tokio::spawn(context.run());

        Dispatcher::spawn(
            DispatcherParts {
                handlers,
                cache: cache.clone(),
                stats: stats.clone(),
                callbacks: callbacks.clone(),
                threads: config.worker_threads,
                monitor_connectivity: config.monitor_connectivity,
            },
            inbox,
        );

        info!(
            threads = config.worker_threads,
            cache_bytes = cache.max_size(),
            monitor_connectivity = config.monitor_connectivity,
            "Image pipeline started"
        );

        Ok(ImagePipeline {
            dispatcher,
            callbacks,
            registry,
            cache,
            memory,
            stats,
        })
    }
}

/// Handle to a running pipeline. Cheap to clone.
#[derive(Clone)]
pub struct ImagePipeline {
    dispatcher: DispatcherHandle,
    callbacks: CallbackSender,
    registry: TargetRegistry,
    cache: Arc<dyn Cache>,
    memory: Option<Arc<MemoryCache>>,
    stats: Arc<Stats>,
}

impl std::fmt::Debug for ImagePipeline {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ImagePipeline")
            .field("targets", &self.registry.len())
            .field("cached", &self.cache.len())
            .finish_non_exhaustive()
    }
}

impl ImagePipeline {
    /// Starts building a pipeline.
    pub fn builder() -> PipelineBuilder {
        PipelineBuilder::new()
    }

    /// Loads `request` into `target` with default options.
    pub fn load(&self, request: Request, target: Arc<dyn Target>) -> ActionHandle {
        self.load_with(request, target, LoadOptions::new())
    }

    /// Loads `request` into `target`.
    ///
    /// Any earlier load into the same target is cancelled. A memory cache
    /// hit is delivered without touching the dispatcher; otherwise the
    /// target is prepared with the placeholder and the action submitted.
    pub fn load_with(
        &self,
        request: Request,
        target: Arc<dyn Target>,
        options: LoadOptions,
    ) -> ActionHandle {
        let action = Action::new(request, target, options);
        let handle = action.handle();

        if let Some(superseded) = self.registry.replace(handle.clone()) {
            debug!(
                action = %superseded.id(),
                target = %superseded.target_id(),
                "Superseded by newer load"
            );
            self.cancel_handle(&superseded);
        }

        let cached = action
            .request()
            .memory_policy()
            .should_read_from_memory_cache()
            .then(|| self.cache.get(action.key()))
            .flatten();

        if let Some(bitmap) = cached {
            trace!(key = %action.key(), "Quick memory cache hit");
            self.stats.cache_hit();
            let priority = action.priority();
            self.callbacks.send(Delivery::Cached { action, bitmap }, priority);
            return handle;
        }

        self.stats.cache_miss();
        self.callbacks.send_urgent(Delivery::Prepare(action.prepare_load()));
        self.dispatcher.submit(action);
        handle
    }

    /// Cancels one load. Its target receives no further callbacks.
    pub fn cancel(&self, handle: &ActionHandle) {
        self.registry.remove_if(handle.target_id(), handle.id());
        self.cancel_handle(handle);
    }

    /// Cancels whatever is loading into `target` and forgets the target.
    pub fn cancel_target(&self, target: TargetId) {
        if let Some(handle) = self.registry.remove(target) {
            self.cancel_handle(&handle);
        }
    }

    /// Cancels every registered load carrying `tag`.
    pub fn cancel_tag(&self, tag: impl Into<Tag>) {
        let tag = tag.into();
        for handle in self.registry.handles_with_tag(&tag) {
            self.cancel(&handle);
        }
    }

    fn cancel_handle(&self, handle: &ActionHandle) {
        handle.cancel();
        self.dispatcher.cancel(handle.clone());
    }

    /// Holds every load carrying `tag` until resumed.
    pub fn pause_tag(&self, tag: impl Into<Tag>) {
        self.dispatcher.pause_tag(tag.into());
    }

    /// Releases loads held for `tag`.
    pub fn resume_tag(&self, tag: impl Into<Tag>) {
        self.dispatcher.resume_tag(tag.into());
    }

    /// Pushes a connectivity change. Only meaningful with
    /// `monitor_connectivity` enabled.
    pub fn network_state_changed(&self, connected: bool) {
        self.dispatcher.network_state_changed(connected);
    }

    /// Reports airplane mode. While on, failed loads are not retried.
    pub fn airplane_mode_changed(&self, on: bool) {
        self.dispatcher.airplane_mode_changed(on);
    }

    /// Drops every cached variant of `source`.
    pub fn invalidate(&self, source: &str) {
        self.cache.evict_all_with_key_prefix(source);
    }

    /// Drops the cached result of exactly this request.
    pub fn evict(&self, request: &Request) {
        self.cache.evict(request.key());
    }

    /// Empties the memory cache.
    pub fn clear_cache(&self) {
        self.cache.clear();
    }

    /// Current pipeline counters.
    #[must_use]
    pub fn stats(&self) -> StatsSnapshot {
        self.stats.snapshot()
    }

    /// Statistics of the built-in memory cache; `None` with a custom cache.
    #[must_use]
    pub fn cache_stats(&self) -> Option<CacheStats> {
        self.memory.as_ref().map(|memory| memory.stats())
    }

    /// Current dispatcher state.
    ///
    /// # Errors
    /// Returns `LoadError::Shutdown` once the dispatcher has stopped.
    pub async fn snapshot(&self) -> LoadResult<DispatcherSnapshot> {
        self.dispatcher.snapshot().await
    }

    /// Stops accepting new hunts. In-flight hunts still deliver.
    pub fn shutdown(&self) {
        info!("Shutting down image pipeline");
        self.dispatcher.shutdown();
    }

    /// Loads `request` and waits for the outcome.
    ///
    /// # Errors
    /// Returns the load failure, or `LoadError::Shutdown` if the pipeline
    /// stopped before delivering.
    pub async fn fetch(&self, request: Request) -> LoadResult<(Bitmap, LoadedFrom)> {
        self.fetch_with(request, LoadOptions::new()).await
    }

    /// [`fetch`](Self::fetch) with a tag or placeholders.
    ///
    /// # Errors
    /// Same as [`fetch`](Self::fetch).
    pub async fn fetch_with(
        &self,
        request: Request,
        options: LoadOptions,
    ) -> LoadResult<(Bitmap, LoadedFrom)> {
        let (tx, rx) = oneshot::channel();
        let target = Arc::new(OneshotTarget::new(tx));
        let handle = self.load_with(request, target, options);
        let outcome = rx.await.map_err(|_| LoadError::Shutdown);
        self.registry.remove_if(handle.target_id(), handle.id());
        outcome?
    }
}

/// Target resolving a oneshot channel with the first outcome.
struct OneshotTarget {
    id: TargetId,
    tx: parking_lot::Mutex<Option<oneshot::Sender<LoadResult<(Bitmap, LoadedFrom)>>>>,
}

impl OneshotTarget {
    fn new(tx: oneshot::Sender<LoadResult<(Bitmap, LoadedFrom)>>) -> Self {
        Self {
            id: TargetId::new(),
            tx: parking_lot::Mutex::new(Some(tx)),
        }
    }

    fn resolve(&self, outcome: LoadResult<(Bitmap, LoadedFrom)>) {
        if let Some(tx) = self.tx.lock().take() {
            let _ = tx.send(outcome);
        }
    }
}

impl Target for OneshotTarget {
    fn id(&self) -> TargetId {
        self.id
    }

    fn on_success(&self, bitmap: Bitmap, loaded_from: LoadedFrom) {
        self.resolve(Ok((bitmap, loaded_from)));
    }

    fn on_failure(&self, error: &LoadError, _error_placeholder: Option<&Bitmap>) {
        self.resolve(Err(error.clone()));
    }
}
