//! Bounded, priority-ordered execution of hunt jobs.

use std::cmp::Ordering;
use std::collections::BinaryHeap;
use std::sync::Arc;

use tokio::sync::{Semaphore, mpsc};
use tracing::{debug, trace, warn};

use super::hunter::{HuntJob, HuntReport};
use crate::domain::entities::Priority;

/// Default number of concurrently running hunts.
pub const DEFAULT_THREAD_COUNT: usize = 3;

/// Job waiting for a free worker.
struct QueuedHunt {
    sequence: u64,
    priority: Priority,
    job: HuntJob,
}

impl PartialEq for QueuedHunt {
    fn eq(&self, other: &Self) -> bool {
        self.priority == other.priority && self.sequence == other.sequence
    }
}

impl Eq for QueuedHunt {}

impl PartialOrd for QueuedHunt {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl Ord for QueuedHunt {
    /// Higher priority first, then older sequence first.
    fn cmp(&self, other: &Self) -> Ordering {
        self.priority
            .cmp(&other.priority)
            .then_with(|| other.sequence.cmp(&self.sequence))
    }
}

enum PoolCommand {
    Schedule(QueuedHunt),
    Reprioritize { sequence: u64, priority: Priority },
    Remove { sequence: u64 },
    Shutdown,
}

/// Handle to the pool loop.
///
/// Dropping every handle stops the loop once the queue is drained.
#[derive(Clone)]
pub struct WorkerPool {
    command_tx: mpsc::UnboundedSender<PoolCommand>,
}

impl std::fmt::Debug for WorkerPool {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("WorkerPool").finish_non_exhaustive()
    }
}

/// State for the background pool loop.
struct PoolState {
    command_rx: mpsc::UnboundedReceiver<PoolCommand>,
    report_tx: mpsc::UnboundedSender<HuntReport>,
    semaphore: Arc<Semaphore>,
    queue: BinaryHeap<QueuedHunt>,
    closed: bool,
}

impl WorkerPool {
    /// Spawns the pool loop. Reports are sent to `report_tx`.
    #[must_use]
    pub fn spawn(threads: usize, report_tx: mpsc::UnboundedSender<HuntReport>) -> Self {
        let (command_tx, command_rx) = mpsc::unbounded_channel();
        let state = PoolState {
            command_rx,
            report_tx,
            semaphore: Arc::new(Semaphore::new(threads.max(1))),
            queue: BinaryHeap::new(),
            closed: false,
        };

        tokio::spawn(Self::run_loop(state));
        Self { command_tx }
    }

    /// Queues `job` at `priority`.
    pub fn schedule(&self, job: HuntJob, priority: Priority) {
        let hunt = QueuedHunt {
            sequence: job.sequence(),
            priority,
            job,
        };
        self.send(PoolCommand::Schedule(hunt));
    }

    /// Moves a queued job to a new priority. No-op once it started.
    pub fn reprioritize(&self, sequence: u64, priority: Priority) {
        self.send(PoolCommand::Reprioritize { sequence, priority });
    }

    /// Drops a queued job. No-op once it started.
    pub fn remove(&self, sequence: u64) {
        self.send(PoolCommand::Remove { sequence });
    }

    /// Rejects further jobs; queued jobs still run.
    pub fn shutdown(&self) {
        self.send(PoolCommand::Shutdown);
    }

    fn send(&self, command: PoolCommand) {
        if self.command_tx.send(command).is_err() {
            warn!("Worker pool loop has stopped");
        }
    }

    async fn run_loop(mut state: PoolState) {
        let mut commands_open = true;
        loop {
            tokio::select! {
                biased;

                cmd = state.command_rx.recv(), if commands_open => {
                    match cmd {
                        Some(cmd) => state.handle(cmd),
                        None => commands_open = false,
                    }
                }
                Ok(permit) = state.semaphore.clone().acquire_owned(), if !state.queue.is_empty() => {
                    if let Some(hunt) = state.queue.pop() {
                        trace!(sequence = hunt.sequence, priority = %hunt.priority, "Starting hunt");
                        let report_tx = state.report_tx.clone();
                        tokio::spawn(async move {
                            if let Some(report) = hunt.job.run().await {
                                let _ = report_tx.send(report);
                            }
                            drop(permit);
                        });
                    }
                }
                else => break,
            }

            if state.queue.is_empty() && (state.closed || !commands_open) {
                break;
            }
        }
        debug!("Worker pool loop exited");
    }
}

impl PoolState {
    fn handle(&mut self, cmd: PoolCommand) {
        match cmd {
            PoolCommand::Schedule(hunt) => {
                if self.closed {
                    debug!(sequence = hunt.sequence, "Pool shut down, dropping hunt");
                } else {
                    self.queue.push(hunt);
                }
            }
            PoolCommand::Reprioritize { sequence, priority } => {
                let mut hunts = std::mem::take(&mut self.queue).into_vec();
                for hunt in &mut hunts {
                    if hunt.sequence == sequence {
                        hunt.priority = priority;
                    }
                }
                self.queue = BinaryHeap::from(hunts);
            }
            PoolCommand::Remove { sequence } => {
                self.queue.retain(|hunt| hunt.sequence != sequence);
            }
            PoolCommand::Shutdown => {
                self.closed = true;
            }
        }
    }
}
