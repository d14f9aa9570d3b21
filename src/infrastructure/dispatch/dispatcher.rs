//! Coordination actor owning all in-flight state.
//!
//! Every mutation of the hunter map, the paused sets and the replay map
//! happens on this one task. Callers and workers only ever send messages.

use std::collections::{HashMap, HashSet};
use std::sync::Arc;

use tokio::sync::{mpsc, oneshot};
use tracing::{debug, info, trace, warn};

use super::action::{Action, ActionHandle};
use super::callback::{CallbackSender, Delivery};
use super::hunter::{HuntOutcome, HuntReport, Hunter, JobContext};
use super::stats::Stats;
use super::worker_pool::WorkerPool;
use crate::domain::Connectivity;
use crate::domain::entities::{Bitmap, CacheKey, LoadedFrom, NetworkPolicy, Priority, Tag, TargetId};
use crate::domain::errors::{LoadError, LoadResult};
use crate::domain::ports::{Cache, RequestHandler};

/// Message accepted by the dispatcher actor.
#[allow(missing_docs)]
pub enum DispatcherCommand {
    Submit(Action),
    Cancel(ActionHandle),
    PauseTag(Tag),
    ResumeTag(Tag),
    NetworkStateChanged(bool),
    AirplaneModeChanged(bool),
    Shutdown,
    Snapshot(oneshot::Sender<DispatcherSnapshot>),
}

/// Point-in-time view of dispatcher state.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct DispatcherSnapshot {
    /// In-flight hunts.
    pub hunters: usize,
    /// Actions attached to those hunts.
    pub attached_actions: usize,
    /// Currently paused tags.
    pub paused_tags: usize,
    /// Actions held by paused tags.
    pub paused_actions: usize,
    /// Failed actions parked for replay.
    pub failed_actions: usize,
    /// Connectivity as seen by retry decisions.
    pub connectivity: Connectivity,
    /// Whether airplane mode is on.
    pub airplane_mode: bool,
    /// Whether shutdown was requested.
    pub shutdown: bool,
}

/// Cheap, cloneable sender into the dispatcher actor.
///
/// Every method enqueues and returns immediately.
#[derive(Debug, Clone)]
pub struct DispatcherHandle {
    tx: mpsc::UnboundedSender<DispatcherCommand>,
}

/// Receiving half handed to [`Dispatcher::spawn`].
pub struct DispatcherInbox {
    rx: mpsc::UnboundedReceiver<DispatcherCommand>,
}

impl DispatcherHandle {
    /// Creates the command channel.
    #[must_use]
    pub fn channel() -> (Self, DispatcherInbox) {
        let (tx, rx) = mpsc::unbounded_channel();
        (Self { tx }, DispatcherInbox { rx })
    }

    /// Sender that does not keep the actor alive.
    #[must_use]
    pub fn downgrade(&self) -> mpsc::WeakUnboundedSender<DispatcherCommand> {
        self.tx.downgrade()
    }

    /// Hands an action to the dispatcher.
    pub fn submit(&self, action: Action) {
        self.send(DispatcherCommand::Submit(action));
    }

    /// Detaches the action behind `handle`.
    pub fn cancel(&self, handle: ActionHandle) {
        self.send(DispatcherCommand::Cancel(handle));
    }

    /// Holds every action carrying `tag`.
    pub fn pause_tag(&self, tag: Tag) {
        self.send(DispatcherCommand::PauseTag(tag));
    }

    /// Releases actions held for `tag`.
    pub fn resume_tag(&self, tag: Tag) {
        self.send(DispatcherCommand::ResumeTag(tag));
    }

    /// Reports connectivity; reconnecting replays parked failures.
    pub fn network_state_changed(&self, connected: bool) {
        self.send(DispatcherCommand::NetworkStateChanged(connected));
    }

    /// Reports airplane mode, which disables retries.
    pub fn airplane_mode_changed(&self, on: bool) {
        self.send(DispatcherCommand::AirplaneModeChanged(on));
    }

    /// Stops accepting new hunts.
    pub fn shutdown(&self) {
        self.send(DispatcherCommand::Shutdown);
    }

    /// Asks the actor for a snapshot of its state.
    ///
    /// # Errors
    /// Returns `LoadError::Shutdown` if the actor has stopped.
    pub async fn snapshot(&self) -> LoadResult<DispatcherSnapshot> {
        let (tx, rx) = oneshot::channel();
        self.tx
            .send(DispatcherCommand::Snapshot(tx))
            .map_err(|_| LoadError::Shutdown)?;
        rx.await.map_err(|_| LoadError::Shutdown)
    }

    fn send(&self, command: DispatcherCommand) {
        if self.tx.send(command).is_err() {
            warn!("Dispatcher loop has stopped");
        }
    }
}

/// Collaborators and settings for a dispatcher.
pub struct DispatcherParts {
    /// Fetch/decode handlers in match order.
    pub handlers: Vec<Arc<dyn RequestHandler>>,
    /// Decoded image cache.
    pub cache: Arc<dyn Cache>,
    /// Event counters.
    pub stats: Arc<Stats>,
    /// Consumer-callback context.
    pub callbacks: CallbackSender,
    /// Concurrent hunts.
    pub threads: usize,
    /// Whether connectivity changes are pushed in, enabling replay.
    pub monitor_connectivity: bool,
}

/// Dispatcher actor state.
pub struct Dispatcher {
    hunters: HashMap<CacheKey, Hunter>,
    paused_tags: HashSet<Tag>,
    paused_actions: HashMap<TargetId, Action>,
    failed_actions: HashMap<TargetId, Action>,
    connectivity: Connectivity,
    airplane_mode: bool,
    monitor_connectivity: bool,
    shutdown: bool,
    handlers: Vec<Arc<dyn RequestHandler>>,
    context: JobContext,
    pool: WorkerPool,
    callbacks: CallbackSender,
}

impl Dispatcher {
    /// Spawns the actor and its worker pool.
    pub fn spawn(parts: DispatcherParts, inbox: DispatcherInbox) {
        let (report_tx, report_rx) = mpsc::unbounded_channel();
        let pool = WorkerPool::spawn(parts.threads, report_tx);

        let dispatcher = Self {
            hunters: HashMap::new(),
            paused_tags: HashSet::new(),
            paused_actions: HashMap::new(),
            failed_actions: HashMap::new(),
            connectivity: Connectivity::Unknown,
            airplane_mode: false,
            monitor_connectivity: parts.monitor_connectivity,
            shutdown: false,
            handlers: parts.handlers,
            context: JobContext {
                cache: parts.cache,
                stats: parts.stats,
            },
            pool,
            callbacks: parts.callbacks,
        };

        tokio::spawn(dispatcher.run(inbox.rx, report_rx));
    }

    async fn run(
        mut self,
        mut command_rx: mpsc::UnboundedReceiver<DispatcherCommand>,
        mut report_rx: mpsc::UnboundedReceiver<HuntReport>,
    ) {
        let mut reports_open = true;
        loop {
            tokio::select! {
                cmd = command_rx.recv() => {
                    match cmd {
                        Some(cmd) => self.handle(cmd),
                        None => break,
                    }
                }
                report = report_rx.recv(), if reports_open => {
                    match report {
                        Some(report) => self.on_report(report),
                        None => reports_open = false,
                    }
                }
            }
        }
        debug!("Dispatcher loop exited");
    }

    fn handle(&mut self, cmd: DispatcherCommand) {
        match cmd {
            DispatcherCommand::Submit(action) => self.perform_submit(action, true),
            DispatcherCommand::Cancel(handle) => self.perform_cancel(&handle),
            DispatcherCommand::PauseTag(tag) => self.perform_pause_tag(tag),
            DispatcherCommand::ResumeTag(tag) => self.perform_resume_tag(&tag),
            DispatcherCommand::NetworkStateChanged(connected) => {
                self.perform_network_state_change(connected);
            }
            DispatcherCommand::AirplaneModeChanged(on) => {
                debug!(on, "Airplane mode changed");
                self.airplane_mode = on;
            }
            DispatcherCommand::Shutdown => self.perform_shutdown(),
            DispatcherCommand::Snapshot(reply) => {
                let _ = reply.send(self.snapshot());
            }
        }
    }

    fn snapshot(&self) -> DispatcherSnapshot {
        DispatcherSnapshot {
            hunters: self.hunters.len(),
            attached_actions: self.hunters.values().map(Hunter::action_count).sum(),
            paused_tags: self.paused_tags.len(),
            paused_actions: self.paused_actions.len(),
            failed_actions: self.failed_actions.len(),
            connectivity: self.connectivity_snapshot(),
            airplane_mode: self.airplane_mode,
            shutdown: self.shutdown,
        }
    }

    /// Connectivity as seen by retry decisions.
    fn connectivity_snapshot(&self) -> Connectivity {
        if self.monitor_connectivity {
            self.connectivity
        } else {
            Connectivity::Unknown
        }
    }

    fn perform_submit(&mut self, action: Action, dismiss_failed: bool) {
        if action.is_cancelled() {
            trace!(action = %action.id(), "Ignoring cancelled action");
            return;
        }

        if let Some(tag) = action.tag()
            && self.paused_tags.contains(tag)
        {
            debug!(action = %action.id(), tag = %tag, "Tag paused, holding action");
            self.paused_actions.insert(action.target_id(), action);
            return;
        }

        if let Some(hunter) = self.hunters.get_mut(action.key()) {
            let before = hunter.priority();
            hunter.attach(action);
            if hunter.priority() != before {
                self.pool.reprioritize(hunter.sequence(), hunter.priority());
            }
            return;
        }

        if self.shutdown {
            debug!(action = %action.id(), "Dispatcher shut down, dropping action");
            return;
        }

        let target = action.target_id();
        let hunter = Hunter::for_request(action, &self.handlers);
        self.pool.schedule(hunter.job(&self.context), hunter.priority());
        self.hunters.insert(hunter.key().clone(), hunter);

        if dismiss_failed {
            self.failed_actions.remove(&target);
        }
    }

    fn perform_cancel(&mut self, handle: &ActionHandle) {
        let key = handle.key();
        if let Some(hunter) = self.hunters.get_mut(key)
            && hunter.detach(handle.id()).is_some()
        {
            if hunter.cancel() {
                debug!(key = %key, "Cancelled hunt with no remaining actions");
                self.pool.remove(hunter.sequence());
                self.hunters.remove(key);
            } else {
                self.pool.reprioritize(hunter.sequence(), hunter.priority());
            }
        }

        if let Some(tag) = handle.tag()
            && self.paused_tags.contains(tag)
            && self
                .paused_actions
                .get(&handle.target_id())
                .is_some_and(|action| action.id() == handle.id())
        {
            self.paused_actions.remove(&handle.target_id());
        }

        if self
            .failed_actions
            .get(&handle.target_id())
            .is_some_and(|action| action.id() == handle.id())
        {
            self.failed_actions.remove(&handle.target_id());
        }
    }

    fn perform_pause_tag(&mut self, tag: Tag) {
        if !self.paused_tags.insert(tag.clone()) {
            return;
        }
        debug!(tag = %tag, "Pausing tag");

        let mut emptied = Vec::new();
        for (key, hunter) in &mut self.hunters {
            let detached = hunter.detach_matching(|action| action.has_tag(&tag));
            if detached.is_empty() {
                continue;
            }
            for action in detached {
                self.paused_actions.insert(action.target_id(), action);
            }
            if hunter.cancel() {
                self.pool.remove(hunter.sequence());
                emptied.push(key.clone());
            } else {
                self.pool.reprioritize(hunter.sequence(), hunter.priority());
            }
        }

        for key in emptied {
            self.hunters.remove(&key);
        }
    }

    fn perform_resume_tag(&mut self, tag: &Tag) {
        if !self.paused_tags.remove(tag) {
            return;
        }

        let (resumed, kept): (HashMap<_, _>, HashMap<_, _>) =
            std::mem::take(&mut self.paused_actions)
                .into_iter()
                .partition(|(_, action)| action.has_tag(tag));
        self.paused_actions = kept;

        debug!(tag = %tag, count = resumed.len(), "Resuming tag");
        if !resumed.is_empty() {
            self.callbacks.send(
                Delivery::Resume(resumed.into_values().collect()),
                Priority::Normal,
            );
        }
    }

    fn perform_network_state_change(&mut self, connected: bool) {
        self.connectivity = Connectivity::from_connected(connected);
        debug!(connected, "Network state changed");

        if connected && !self.failed_actions.is_empty() {
            let failed = std::mem::take(&mut self.failed_actions);
            info!(count = failed.len(), "Replaying failed actions");
            for mut action in failed.into_values() {
                action.set_will_replay(false);
                self.perform_submit(action, false);
            }
        }
    }

    fn perform_shutdown(&mut self) {
        if self.shutdown {
            return;
        }
        info!(in_flight = self.hunters.len(), "Shutting down dispatcher");
        self.shutdown = true;
        self.pool.shutdown();
    }

    fn on_report(&mut self, report: HuntReport) {
        let Some(hunter) = self.hunters.get(&report.key) else {
            trace!(key = %report.key, "Report for unknown hunt");
            return;
        };
        if hunter.sequence() != report.sequence || hunter.is_cancelled() {
            trace!(key = %report.key, "Stale report");
            return;
        }

        match report.outcome {
            HuntOutcome::Success {
                bitmap,
                loaded_from,
            } => self.perform_complete(&report.key, bitmap, loaded_from),
            HuntOutcome::Retry(error) => self.perform_retry(&report.key, error),
            HuntOutcome::Failed(error) => self.perform_error(&report.key, error, false),
            HuntOutcome::Fault(fault) => {
                if let Some(mut hunter) = self.hunters.remove(&report.key) {
                    warn!(key = %report.key, error = %fault, "Hunt faulted");
                    self.callbacks.send_urgent(Delivery::Fault {
                        fault,
                        actions: hunter.take_actions(),
                    });
                }
            }
        }
    }

    fn perform_complete(&mut self, key: &CacheKey, bitmap: Bitmap, loaded_from: LoadedFrom) {
        let Some(mut hunter) = self.hunters.remove(key) else {
            return;
        };
        if hunter.memory_policy().should_write_to_memory_cache() {
            self.context.cache.put(key.clone(), bitmap.clone());
        }

        let priority = hunter.priority();
        let actions = hunter.take_actions();
        debug!(
            request = %hunter.request().log_id(),
            from = %loaded_from,
            actions = actions.len(),
            "Hunt completed"
        );
        self.callbacks.send(
            Delivery::Hunt {
                result: Ok((bitmap, loaded_from)),
                actions,
            },
            priority,
        );
    }

    fn perform_retry(&mut self, key: &CacheKey, error: LoadError) {
        if self.shutdown {
            self.perform_error(key, error, false);
            return;
        }

        let connectivity = self.connectivity_snapshot();
        let airplane_mode = self.airplane_mode;
        let Some(hunter) = self.hunters.get_mut(key) else {
            return;
        };

        if hunter.should_retry(airplane_mode, connectivity) {
            if error.is_content_length_mismatch() {
                hunter.add_network_policy(NetworkPolicy::OFFLINE);
            }
            debug!(
                request = %hunter.request().log_id(),
                remaining = hunter.retry_count(),
                error = %error,
                "Retrying hunt"
            );
            self.pool.schedule(hunter.job(&self.context), hunter.priority());
            return;
        }

        let will_replay = self.monitor_connectivity && hunter.supports_replay();
        self.perform_error(key, error, will_replay);
    }

    fn perform_error(&mut self, key: &CacheKey, error: LoadError, will_replay: bool) {
        let Some(mut hunter) = self.hunters.remove(key) else {
            return;
        };
        let priority = hunter.priority();

        let mut delivered = Vec::new();
        for mut action in hunter.take_actions() {
            if will_replay && !action.is_cancelled() {
                action.set_will_replay(true);
                self.failed_actions.insert(action.target_id(), action);
            } else {
                delivered.push(action);
            }
        }

        debug!(
            request = %hunter.request().log_id(),
            error = %error,
            parked = self.failed_actions.len(),
            "Hunt failed"
        );
        if !delivered.is_empty() {
            self.callbacks.send(
                Delivery::Hunt {
                    result: Err(error),
                    actions: delivered,
                },
                priority,
            );
        }
    }
}
