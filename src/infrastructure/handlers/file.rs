//! Local filesystem handler.

use std::path::{Path, PathBuf};

use async_trait::async_trait;
use bytes::Bytes;
use tracing::debug;

use super::decode::decode;
use crate::domain::entities::{FetchResult, LoadedFrom, NetworkPolicy, Request};
use crate::domain::errors::{LoadError, LoadResult};
use crate::domain::ports::RequestHandler;

const FILE_SCHEME: &str = "file://";

/// Loads `file://` URIs and absolute paths.
#[derive(Debug, Default, Clone, Copy)]
pub struct FileRequestHandler;

impl FileRequestHandler {
    fn path_of(request: &Request) -> Option<PathBuf> {
        let uri = request.uri_str()?;
        if let Some(path) = uri.strip_prefix(FILE_SCHEME) {
            return Some(PathBuf::from(path));
        }
        let path = Path::new(uri);
        path.is_absolute().then(|| path.to_path_buf())
    }
}

#[async_trait]
impl RequestHandler for FileRequestHandler {
    fn name(&self) -> &'static str {
        "file"
    }

    fn can_handle(&self, request: &Request) -> bool {
        Self::path_of(request).is_some()
    }

    async fn load(
        &self,
        request: &Request,
        _network_policy: NetworkPolicy,
    ) -> LoadResult<FetchResult> {
        let path = Self::path_of(request)
            .ok_or_else(|| LoadError::unrecognized(request.source().to_string()))?;
        debug!(path = %path.display(), "Reading image from disk");

        let bytes = tokio::fs::read(&path).await?;
        let (image, orientation) = decode(Bytes::from(bytes)).await?;

        Ok(FetchResult::new(image, LoadedFrom::Disk).with_exif_orientation(orientation))
    }
}
