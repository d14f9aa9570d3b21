//! HTTP(S) handler backed by reqwest.

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use bytes::{Bytes, BytesMut};
use reqwest::header::{CACHE_CONTROL, CONTENT_LENGTH, HeaderMap, HeaderName, HeaderValue};
use tracing::{debug, warn};

use super::decode::decode;
use crate::domain::Connectivity;
use crate::domain::entities::{FetchResult, LoadedFrom, NetworkPolicy, Request};
use crate::domain::errors::{LoadError, LoadResult};
use crate::domain::ports::RequestHandler;
use crate::infrastructure::dispatch::Stats;

/// Retries granted to a network hunt.
pub const DEFAULT_RETRY_COUNT: u32 = 2;

/// Loads `http://` and `https://` URIs.
///
/// This handler keeps no local copy, so offline-only attempts always miss
/// with [`LoadError::OfflineOnly`]. Cache-control intent is forwarded to
/// any intermediate HTTP cache as request headers.
pub struct NetworkRequestHandler {
    client: reqwest::Client,
    retry_count: u32,
    stats: Arc<Stats>,
}

impl std::fmt::Debug for NetworkRequestHandler {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("NetworkRequestHandler")
            .field("retry_count", &self.retry_count)
            .finish_non_exhaustive()
    }
}

impl NetworkRequestHandler {
    /// Creates a handler with a per-request timeout.
    ///
    /// # Errors
    /// Returns error if the HTTP client cannot be created.
    pub fn new(timeout: Duration, retry_count: u32, stats: Arc<Stats>) -> LoadResult<Self> {
        let client = reqwest::Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|e| LoadError::network(format!("Failed to create HTTP client: {e}")))?;

        Ok(Self {
            client,
            retry_count,
            stats,
        })
    }

    fn build_headers(request: &Request, network_policy: NetworkPolicy) -> HeaderMap {
        let mut headers = HeaderMap::new();
        if !network_policy.should_read_from_disk_cache() {
            headers.insert(CACHE_CONTROL, HeaderValue::from_static("no-cache"));
        } else if !network_policy.should_write_to_disk_cache() {
            headers.insert(CACHE_CONTROL, HeaderValue::from_static("no-store"));
        }

        for (name, value) in request.headers() {
            match (
                HeaderName::from_bytes(name.as_bytes()),
                HeaderValue::from_str(value),
            ) {
                (Ok(name), Ok(value)) => {
                    headers.append(name, value);
                }
                _ => warn!(header = %name, "Skipping invalid request header"),
            }
        }
        headers
    }

    /// Downloads the body, verifying it against a declared Content-Length.
    async fn download(
        &self,
        url: &str,
        request: &Request,
        network_policy: NetworkPolicy,
    ) -> LoadResult<Bytes> {
        let mut response = self
            .client
            .get(url)
            .headers(Self::build_headers(request, network_policy))
            .send()
            .await
            .map_err(|e| LoadError::network(format!("Request failed: {e}")))?;

        let status = response.status();
        if !status.is_success() {
            return Err(LoadError::Response {
                status: status.as_u16(),
                offline_only: network_policy.is_offline_only(),
            });
        }

        let expected = response
            .headers()
            .get(CONTENT_LENGTH)
            .and_then(|v| v.to_str().ok())
            .and_then(|v| v.parse::<u64>().ok());

        let mut body = BytesMut::new();
        loop {
            match response.chunk().await {
                Ok(Some(chunk)) => body.extend_from_slice(&chunk),
                Ok(None) => break,
                Err(e) => {
                    if let Some(expected) = expected
                        && (body.len() as u64) < expected
                    {
                        return Err(LoadError::ContentLengthMismatch {
                            expected,
                            actual: body.len() as u64,
                        });
                    }
                    return Err(LoadError::network(format!("Failed to read body: {e}")));
                }
            }
        }

        let actual = body.len() as u64;
        if let Some(expected) = expected
            && expected != actual
        {
            return Err(LoadError::ContentLengthMismatch { expected, actual });
        }

        self.stats.download_finished(actual);
        Ok(body.freeze())
    }
}

#[async_trait]
impl RequestHandler for NetworkRequestHandler {
    fn name(&self) -> &'static str {
        "network"
    }

    fn can_handle(&self, request: &Request) -> bool {
        request
            .uri_str()
            .is_some_and(|uri| uri.starts_with("http://") || uri.starts_with("https://"))
    }

    async fn load(
        &self,
        request: &Request,
        network_policy: NetworkPolicy,
    ) -> LoadResult<FetchResult> {
        let url = request
            .uri_str()
            .ok_or_else(|| LoadError::unrecognized(request.source().to_string()))?;

        if network_policy.is_offline_only() {
            debug!(request = %request.log_id(), "Offline only, no local copy");
            return Err(LoadError::offline_only(url));
        }

        debug!(request = %request.log_id(), url = %url, "Downloading image from network");
        let bytes = self.download(url, request, network_policy).await?;
        let (image, orientation) = decode(bytes).await?;

        Ok(FetchResult::new(image, LoadedFrom::Network).with_exif_orientation(orientation))
    }

    fn retry_count(&self) -> u32 {
        self.retry_count
    }

    fn should_retry(&self, airplane_mode: bool, connectivity: Connectivity) -> bool {
        !airplane_mode && connectivity.may_be_connected()
    }

    fn supports_replay(&self) -> bool {
        true
    }
}

#[cfg(test)]
mod tests {
    use image::DynamicImage;
    use test_case::test_case;
    use tokio::io::{AsyncReadExt, AsyncWriteExt};
    use tokio::net::TcpListener;

    use super::*;
    use crate::infrastructure::handlers::decode::encode_png;

    fn handler() -> NetworkRequestHandler {
        NetworkRequestHandler::new(
            Duration::from_secs(5),
            DEFAULT_RETRY_COUNT,
            Arc::new(Stats::new()),
        )
        .expect("client")
    }

    /// Serves one canned HTTP response and returns its base URL.
    async fn serve_once(head: String, body: Vec<u8>) -> String {
        let listener = TcpListener::bind("127.0.0.1:0").await.expect("bind");
        let addr = listener.local_addr().expect("addr");
        tokio::spawn(async move {
            if let Ok((mut socket, _)) = listener.accept().await {
                let mut buf = [0u8; 4096];
                let _ = socket.read(&mut buf).await;
                let _ = socket.write_all(head.as_bytes()).await;
                let _ = socket.write_all(&body).await;
                let _ = socket.shutdown().await;
            }
        });
        format!("http://{addr}/image.png")
    }

    #[test_case("http://x/a.png", true ; "http")]
    #[test_case("https://x/a.png", true ; "https")]
    #[test_case("file:///a.png", false ; "file")]
    #[test_case("/a.png", false ; "path")]
    fn test_can_handle(uri: &str, expected: bool) {
        let request = Request::uri(uri).build().expect("valid");
        assert_eq!(handler().can_handle(&request), expected);
    }

    #[test]
    fn test_retry_policy() {
        let handler = handler();
        assert_eq!(handler.retry_count(), DEFAULT_RETRY_COUNT);
        assert!(handler.supports_replay());
        assert!(handler.should_retry(false, Connectivity::Unknown));
        assert!(!handler.should_retry(false, Connectivity::Disconnected));
        assert!(!handler.should_retry(true, Connectivity::Connected));
    }

    #[test]
    fn test_policy_headers() {
        let request = Request::uri("http://x/a.png")
            .header("X-Token", "abc")
            .build()
            .expect("valid");

        let headers = NetworkRequestHandler::build_headers(&request, NetworkPolicy::NO_CACHE);
        assert_eq!(headers.get(CACHE_CONTROL).map(HeaderValue::as_bytes), Some(&b"no-cache"[..]));
        assert_eq!(headers.get("x-token").map(HeaderValue::as_bytes), Some(&b"abc"[..]));

        let headers = NetworkRequestHandler::build_headers(&request, NetworkPolicy::empty());
        assert!(headers.get(CACHE_CONTROL).is_none());
    }

    #[tokio::test]
    async fn test_offline_only_never_touches_network() {
        let request = Request::uri("http://127.0.0.1:9/a.png").build().expect("valid");
        let result = handler().load(&request, NetworkPolicy::OFFLINE).await;
        assert!(matches!(result, Err(LoadError::OfflineOnly { .. })));
    }

    #[tokio::test]
    async fn test_download_and_decode() {
        let png = encode_png(&DynamicImage::new_rgba8(6, 3));
        let head = format!(
            "HTTP/1.1 200 OK\r\nContent-Type: image/png\r\nContent-Length: {}\r\nConnection: close\r\n\r\n",
            png.len()
        );
        let url = serve_once(head, png.clone()).await;
        let stats = Arc::new(Stats::new());
        let handler =
            NetworkRequestHandler::new(Duration::from_secs(5), 0, stats.clone()).expect("client");

        let request = Request::uri(url).build().expect("valid");
        let result = handler
            .load(&request, NetworkPolicy::empty())
            .await
            .expect("loads");

        assert_eq!(result.loaded_from, LoadedFrom::Network);
        assert_eq!((result.image.width(), result.image.height()), (6, 3));
        assert_eq!(stats.snapshot().downloads, 1);
        assert_eq!(stats.snapshot().downloaded_bytes, png.len() as u64);
    }

    #[tokio::test]
    async fn test_error_status() {
        let head = "HTTP/1.1 404 Not Found\r\nContent-Length: 0\r\nConnection: close\r\n\r\n";
        let url = serve_once(head.to_string(), Vec::new()).await;

        let request = Request::uri(url).build().expect("valid");
        let result = handler().load(&request, NetworkPolicy::empty()).await;

        assert_eq!(
            result.err(),
            Some(LoadError::Response {
                status: 404,
                offline_only: false
            })
        );
    }

    #[tokio::test]
    async fn test_truncated_body_is_length_mismatch() {
        let head = "HTTP/1.1 200 OK\r\nContent-Length: 100\r\nConnection: close\r\n\r\n";
        let url = serve_once(head.to_string(), vec![0u8; 10]).await;

        let request = Request::uri(url).build().expect("valid");
        let result = handler().load(&request, NetworkPolicy::empty()).await;

        assert!(
            matches!(
                result,
                Err(LoadError::ContentLengthMismatch { expected: 100, .. })
            ),
            "got {result:?}"
        );
    }
}
