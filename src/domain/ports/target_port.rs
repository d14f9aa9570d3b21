//! Port definition for load consumers.

use crate::domain::entities::{Bitmap, LoadedFrom, TargetId};
use crate::domain::errors::LoadError;

/// Receives the outcome of a load on the callback context.
pub trait Target: Send + Sync {
    /// Identity used to supersede older loads into the same target.
    fn id(&self) -> TargetId;

    /// Called before the load is submitted.
    fn on_prepare_load(&self, placeholder: Option<&Bitmap>) {
        let _ = placeholder;
    }

    /// Called with the final image.
    fn on_success(&self, bitmap: Bitmap, loaded_from: LoadedFrom);

    /// Called once when the load fails for good.
    fn on_failure(&self, error: &LoadError, error_placeholder: Option<&Bitmap>);
}

#[cfg(test)]
pub mod mock {
    use super::*;
    use tokio::sync::mpsc;

    /// Event observed by a [`RecordingTarget`].
    #[derive(Debug, Clone)]
    pub enum TargetEvent {
        Prepared { had_placeholder: bool },
        Success { bitmap: Bitmap, loaded_from: LoadedFrom },
        Failure { error: LoadError, had_placeholder: bool },
    }

    impl TargetEvent {
        pub fn is_success(&self) -> bool {
            matches!(self, Self::Success { .. })
        }

        pub fn is_failure(&self) -> bool {
            matches!(self, Self::Failure { .. })
        }
    }

    /// Target forwarding every callback into a channel.
    pub struct RecordingTarget {
        id: TargetId,
        tx: mpsc::UnboundedSender<(TargetId, TargetEvent)>,
    }

    impl RecordingTarget {
        pub fn new(tx: mpsc::UnboundedSender<(TargetId, TargetEvent)>) -> Self {
            Self {
                id: TargetId::new(),
                tx,
            }
        }

        /// Creates a target with its own channel.
        pub fn channel() -> (Self, mpsc::UnboundedReceiver<(TargetId, TargetEvent)>) {
            let (tx, rx) = mpsc::unbounded_channel();
            (Self::new(tx), rx)
        }
    }

    impl Target for RecordingTarget {
        fn id(&self) -> TargetId {
            self.id
        }

        fn on_prepare_load(&self, placeholder: Option<&Bitmap>) {
            let _ = self.tx.send((
                self.id,
                TargetEvent::Prepared {
                    had_placeholder: placeholder.is_some(),
                },
            ));
        }

        fn on_success(&self, bitmap: Bitmap, loaded_from: LoadedFrom) {
            let _ = self
                .tx
                .send((self.id, TargetEvent::Success { bitmap, loaded_from }));
        }

        fn on_failure(&self, error: &LoadError, error_placeholder: Option<&Bitmap>) {
            let _ = self.tx.send((
                self.id,
                TargetEvent::Failure {
                    error: error.clone(),
                    had_placeholder: error_placeholder.is_some(),
                },
            ));
        }
    }
}
