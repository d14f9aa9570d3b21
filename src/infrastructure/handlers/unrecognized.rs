//! Fallback handler for requests nobody understands.

use async_trait::async_trait;
use tracing::warn;

use crate::domain::entities::{FetchResult, NetworkPolicy, Request};
use crate::domain::errors::{LoadError, LoadResult};
use crate::domain::ports::RequestHandler;

/// Always fails with [`LoadError::Unrecognized`].
#[derive(Debug, Default, Clone, Copy)]
pub struct UnrecognizedRequestHandler;

#[async_trait]
impl RequestHandler for UnrecognizedRequestHandler {
    fn name(&self) -> &'static str {
        "unrecognized"
    }

    fn can_handle(&self, _request: &Request) -> bool {
        false
    }

    async fn load(
        &self,
        request: &Request,
        _network_policy: NetworkPolicy,
    ) -> LoadResult<FetchResult> {
        warn!(request = %request.log_id(), source = %request.source(), "No handler for request");
        Err(LoadError::unrecognized(request.source().to_string()))
    }
}
