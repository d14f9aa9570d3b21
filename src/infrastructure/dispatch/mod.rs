//! Request dispatch engine: actions, hunters, the coordination actor, the
//! worker pool and the consumer-callback context.

pub mod action;
pub mod callback;
pub mod dispatcher;
pub mod hunter;
pub mod registry;
pub mod stats;
pub mod worker_pool;

pub use action::{Action, ActionHandle, ActionId, LoadOptions, PrepareLoad};
pub use callback::{
    CallbackContext, CallbackSender, Delivery, FaultHandler, default_fault_handler,
};
pub use dispatcher::{
    Dispatcher, DispatcherCommand, DispatcherHandle, DispatcherInbox, DispatcherParts,
    DispatcherSnapshot,
};
pub use hunter::{HuntJob, HuntOutcome, HuntReport, Hunter, JobContext};
pub use registry::TargetRegistry;
pub use stats::{Stats, StatsSnapshot};
pub use worker_pool::{DEFAULT_THREAD_COUNT, WorkerPool};
