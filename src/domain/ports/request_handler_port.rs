//! Port definition for fetch/decode collaborators.

use async_trait::async_trait;

use crate::domain::connection::Connectivity;
use crate::domain::entities::{FetchResult, NetworkPolicy, Request};
use crate::domain::errors::LoadResult;

/// Fetches and decodes the bytes behind a request.
///
/// Handlers are consulted in order; the first one whose `can_handle`
/// returns true owns the request for its whole lifetime, retries included.
#[async_trait]
pub trait RequestHandler: Send + Sync {
    /// Short name for log lines.
    fn name(&self) -> &'static str;

    /// Returns true if this handler understands the request's source.
    fn can_handle(&self, request: &Request) -> bool;

    /// Loads and decodes the image.
    ///
    /// `network_policy` may be stricter than the request's own policy,
    /// e.g. offline-only once retries are exhausted.
    async fn load(&self, request: &Request, network_policy: NetworkPolicy)
    -> LoadResult<FetchResult>;

    /// Number of retries granted to a hunt using this handler.
    fn retry_count(&self) -> u32 {
        0
    }

    /// Decides whether a failed attempt should be repeated.
    fn should_retry(&self, airplane_mode: bool, connectivity: Connectivity) -> bool {
        let _ = (airplane_mode, connectivity);
        false
    }

    /// Returns true if failures are plausibly connectivity related and the
    /// load should be replayed when the network comes back.
    fn supports_replay(&self) -> bool {
        false
    }
}
