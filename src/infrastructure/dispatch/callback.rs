//! Consumer-callback context.
//!
//! Every target callback runs on this single loop. Deliveries arrive on two
//! lanes; the urgent lane is always drained first so high priority
//! completions are not stuck behind a backlog of ordinary ones.

use std::sync::Arc;

use tokio::sync::mpsc;
use tracing::{debug, error, trace, warn};

use super::action::{Action, PrepareLoad};
use super::dispatcher::DispatcherCommand;
use super::registry::TargetRegistry;
use super::stats::Stats;
use crate::domain::entities::{Bitmap, LoadedFrom, Priority};
use crate::domain::errors::{LoadError, TransformFault};
use crate::domain::ports::Cache;

/// Receives transformation faults on the callback context.
pub type FaultHandler = Arc<dyn Fn(&TransformFault) + Send + Sync>;

/// Logs the fault, then re-raises it as a panic on a fresh task.
#[must_use]
pub fn default_fault_handler() -> FaultHandler {
    Arc::new(|fault: &TransformFault| {
        error!(key = fault.key(), error = %fault, "Transformation broke its contract");
        let fault = fault.clone();
        tokio::spawn(async move {
            panic!("{fault}");
        });
    })
}

/// Work for the callback context.
#[allow(missing_docs)]
pub enum Delivery {
    /// Outcome of one hunt for every action attached to it.
    Hunt {
        result: Result<(Bitmap, LoadedFrom), LoadError>,
        actions: Vec<Action>,
    },
    /// Quick memory cache hit found before submission.
    Cached { action: Action, bitmap: Bitmap },
    /// Placeholder delivery ahead of a submission.
    Prepare(PrepareLoad),
    /// Actions released by `resume_tag`.
    Resume(Vec<Action>),
    /// A transformation fault; its actions get no callback.
    Fault {
        fault: TransformFault,
        actions: Vec<Action>,
    },
}

impl std::fmt::Debug for Delivery {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Hunt { result, actions } => f
                .debug_struct("Hunt")
                .field("ok", &result.is_ok())
                .field("actions", &actions.len())
                .finish(),
            Self::Cached { action, .. } => f.debug_tuple("Cached").field(&action.id()).finish(),
            Self::Prepare(prepare) => f.debug_tuple("Prepare").field(prepare).finish(),
            Self::Resume(actions) => f.debug_tuple("Resume").field(&actions.len()).finish(),
            Self::Fault { fault, .. } => f.debug_tuple("Fault").field(fault).finish(),
        }
    }
}

/// Sending half of both delivery lanes.
#[derive(Debug, Clone)]
pub struct CallbackSender {
    urgent: mpsc::UnboundedSender<Delivery>,
    normal: mpsc::UnboundedSender<Delivery>,
}

impl CallbackSender {
    /// Enqueues on the lane matching `priority`.
    pub fn send(&self, delivery: Delivery, priority: Priority) {
        if priority == Priority::High {
            self.send_urgent(delivery);
        } else if self.normal.send(delivery).is_err() {
            warn!("Callback context has stopped");
        }
    }

    /// Enqueues ahead of every ordinary delivery.
    pub fn send_urgent(&self, delivery: Delivery) {
        if self.urgent.send(delivery).is_err() {
            warn!("Callback context has stopped");
        }
    }
}

/// State owned by the callback loop.
pub struct CallbackContext {
    urgent_rx: mpsc::UnboundedReceiver<Delivery>,
    normal_rx: mpsc::UnboundedReceiver<Delivery>,
    registry: TargetRegistry,
    cache: Arc<dyn Cache>,
    stats: Arc<Stats>,
    dispatcher: mpsc::WeakUnboundedSender<DispatcherCommand>,
    on_fault: FaultHandler,
}

impl CallbackContext {
    /// Creates the context and the sender feeding it.
    #[must_use]
    pub fn new(
        registry: TargetRegistry,
        cache: Arc<dyn Cache>,
        stats: Arc<Stats>,
        dispatcher: mpsc::WeakUnboundedSender<DispatcherCommand>,
        on_fault: FaultHandler,
    ) -> (Self, CallbackSender) {
        let (urgent, urgent_rx) = mpsc::unbounded_channel();
        let (normal, normal_rx) = mpsc::unbounded_channel();
        let context = Self {
            urgent_rx,
            normal_rx,
            registry,
            cache,
            stats,
            dispatcher,
            on_fault,
        };
        (context, CallbackSender { urgent, normal })
    }

    /// Runs until every sender is gone.
    pub async fn run(mut self) {
        loop {
            let delivery = tokio::select! {
                biased;

                Some(delivery) = self.urgent_rx.recv() => delivery,
                Some(delivery) = self.normal_rx.recv() => delivery,
                else => break,
            };
            self.handle(delivery);
        }
        debug!("Callback loop exited");
    }

    fn handle(&self, delivery: Delivery) {
        trace!(?delivery, "Delivering");
        match delivery {
            Delivery::Hunt { result, actions } => {
                for action in actions {
                    self.deliver(&action, &result);
                }
            }
            Delivery::Cached { action, bitmap } => {
                self.deliver(&action, &Ok((bitmap, LoadedFrom::Memory)));
            }
            Delivery::Prepare(prepare) => prepare.run(),
            Delivery::Resume(actions) => self.resume(actions),
            Delivery::Fault { fault, actions } => {
                for action in &actions {
                    self.registry.remove_if(action.target_id(), action.id());
                }
                (self.on_fault)(&fault);
            }
        }
    }

    fn deliver(&self, action: &Action, result: &Result<(Bitmap, LoadedFrom), LoadError>) {
        if action.is_cancelled() {
            return;
        }
        if !action.will_replay() {
            self.registry.remove_if(action.target_id(), action.id());
        }
        match result {
            Ok((bitmap, loaded_from)) => action.complete(bitmap.clone(), *loaded_from),
            Err(error) => action.error(error),
        }
    }

    fn resume(&self, actions: Vec<Action>) {
        for action in actions {
            if action.is_cancelled() {
                continue;
            }

            let cached = action
                .request()
                .memory_policy()
                .should_read_from_memory_cache()
                .then(|| self.cache.get(action.key()))
                .flatten();

            if let Some(bitmap) = cached {
                self.stats.cache_hit();
                self.deliver(&action, &Ok((bitmap, LoadedFrom::Memory)));
                continue;
            }

            self.stats.cache_miss();
            match self.dispatcher.upgrade() {
                Some(dispatcher) => {
                    if dispatcher.send(DispatcherCommand::Submit(action)).is_err() {
                        warn!("Dispatcher stopped, dropping resumed action");
                    }
                }
                None => debug!(action = %action.id(), "Dispatcher gone, dropping resumed action"),
            }
        }
    }
}
