#[cfg(test)]
mod tests {
    use std::sync::Arc;
    use std::time::Duration;

    use tokio::sync::{Semaphore, mpsc};

    use crate::application::ImagePipeline;
    use crate::domain::entities::{LoadedFrom, MemoryPolicy, Request, TargetId};
    use crate::domain::errors::{LoadError, TransformFault};
    use crate::domain::ports::Target;
    use crate::domain::ports::mocks::{
        PanickingTransformation, RecordingTarget, StubHandler, TargetEvent,
    };
    use crate::infrastructure::cache::MemoryCache;
    use crate::infrastructure::config::PipelineConfig;
    use crate::infrastructure::dispatch::LoadOptions;

    const EVENT_TIMEOUT: Duration = Duration::from_secs(5);
    const QUIET_PERIOD: Duration = Duration::from_millis(200);

    type Events = mpsc::UnboundedReceiver<(TargetId, TargetEvent)>;

    fn pipeline_with(stub: Arc<StubHandler>) -> ImagePipeline {
        ImagePipeline::builder()
            .config(PipelineConfig {
                memory_cache_bytes: 1 << 22,
                ..PipelineConfig::default()
            })
            .add_request_handler(stub)
            .on_fault(|_fault: &TransformFault| {})
            .build()
            .expect("pipeline builds")
    }

    fn request(uri: &str) -> Request {
        Request::uri(uri).build().expect("valid request")
    }

    async fn next_event(rx: &mut Events) -> TargetEvent {
        tokio::time::timeout(EVENT_TIMEOUT, rx.recv())
            .await
            .expect("event in time")
            .expect("events channel open")
            .1
    }

    async fn assert_quiet(rx: &mut Events) {
        let event = tokio::time::timeout(QUIET_PERIOD, rx.recv()).await;
        // A closed channel means the target was dropped, which is quiet too.
        assert!(matches!(event, Err(_) | Ok(None)), "unexpected event {event:?}");
    }

    #[tokio::test]
    async fn test_load_prepares_then_succeeds() {
        let stub = Arc::new(StubHandler::new());
        let pipeline = pipeline_with(stub.clone());
        let (target, mut rx) = RecordingTarget::channel();
        let placeholder = Arc::new(image::DynamicImage::new_rgb8(1, 1));

        pipeline.load_with(
            request("stub://a"),
            Arc::new(target),
            LoadOptions::new().placeholder(placeholder),
        );

        assert!(matches!(
            next_event(&mut rx).await,
            TargetEvent::Prepared {
                had_placeholder: true
            }
        ));
        assert!(matches!(
            next_event(&mut rx).await,
            TargetEvent::Success {
                loaded_from: LoadedFrom::Network,
                ..
            }
        ));
        assert_eq!(stub.loads(), 1);
    }

    #[tokio::test]
    async fn test_second_load_is_quick_memory_hit() {
        let stub = Arc::new(StubHandler::new());
        let pipeline = pipeline_with(stub.clone());

        pipeline.fetch(request("stub://a")).await.expect("first load");

        let (target, mut rx) = RecordingTarget::channel();
        pipeline.load(request("stub://a"), Arc::new(target));

        // No prepare callback on a quick hit.
        assert!(matches!(
            next_event(&mut rx).await,
            TargetEvent::Success {
                loaded_from: LoadedFrom::Memory,
                ..
            }
        ));
        assert_eq!(stub.loads(), 1);

        let stats = pipeline.stats();
        assert_eq!((stats.cache_hits, stats.cache_misses), (1, 1));
    }

    #[tokio::test]
    async fn test_no_cache_skips_quick_check() {
        let stub = Arc::new(StubHandler::new());
        let pipeline = pipeline_with(stub.clone());
        pipeline.fetch(request("stub://a")).await.expect("first load");

        let bypass = Request::uri("stub://a")
            .memory_policy(MemoryPolicy::NO_CACHE)
            .build()
            .expect("valid");
        let (_, loaded_from) = pipeline.fetch(bypass).await.expect("second load");

        assert_eq!(loaded_from, LoadedFrom::Network);
        assert_eq!(stub.loads(), 2);
    }

    #[tokio::test]
    async fn test_newer_load_supersedes_older_in_same_target() {
        let gate = Arc::new(Semaphore::new(0));
        let stub = Arc::new(StubHandler::new().with_gate(gate.clone()));
        let pipeline = pipeline_with(stub);
        let (target, mut rx) = RecordingTarget::channel();
        let target = Arc::new(target);

        let first = pipeline.load(request("stub://first"), target.clone());
        let second = pipeline.load(request("stub://second"), target);
        gate.add_permits(2);

        assert!(first.is_cancelled());
        assert!(!second.is_cancelled());
        assert!(matches!(next_event(&mut rx).await, TargetEvent::Prepared { .. }));
        assert!(next_event(&mut rx).await.is_success());
        assert_quiet(&mut rx).await;
    }

    #[tokio::test]
    async fn test_cancel_tag_only_touches_tagged_loads() {
        let gate = Arc::new(Semaphore::new(0));
        let stub = Arc::new(StubHandler::new().with_gate(gate.clone()));
        let pipeline = pipeline_with(stub);
        let (tagged, mut tagged_rx) = RecordingTarget::channel();
        let (plain, mut plain_rx) = RecordingTarget::channel();

        let tagged_handle = pipeline.load_with(
            request("stub://tagged"),
            Arc::new(tagged),
            LoadOptions::new().tag("feed"),
        );
        pipeline.load(request("stub://plain"), Arc::new(plain));
        assert!(matches!(next_event(&mut tagged_rx).await, TargetEvent::Prepared { .. }));

        pipeline.cancel_tag("feed");
        gate.add_permits(2);

        assert!(tagged_handle.is_cancelled());
        assert!(matches!(next_event(&mut plain_rx).await, TargetEvent::Prepared { .. }));
        assert!(next_event(&mut plain_rx).await.is_success());
        assert_quiet(&mut tagged_rx).await;
    }

    #[tokio::test]
    async fn test_cancel_target_forgets_target() {
        let gate = Arc::new(Semaphore::new(0));
        let stub = Arc::new(StubHandler::new().with_gate(gate.clone()));
        let pipeline = pipeline_with(stub);
        let (target, mut rx) = RecordingTarget::channel();
        let target_id = target.id();

        let handle = pipeline.load(request("stub://a"), Arc::new(target));
        assert!(matches!(next_event(&mut rx).await, TargetEvent::Prepared { .. }));

        pipeline.cancel_target(target_id);
        gate.add_permits(1);

        assert!(handle.is_cancelled());
        assert_quiet(&mut rx).await;
        let snapshot = pipeline.snapshot().await.expect("dispatcher alive");
        assert_eq!(snapshot.hunters, 0);
    }

    #[tokio::test]
    async fn test_invalidate_drops_every_variant() {
        let stub = Arc::new(StubHandler::new());
        let pipeline = pipeline_with(stub);

        pipeline.fetch(request("stub://a")).await.expect("plain");
        let resized = Request::uri("stub://a").resize(4, 4).build().expect("valid");
        let (bitmap, _) = pipeline.fetch(resized.clone()).await.expect("resized");
        pipeline.fetch(request("stub://ab")).await.expect("other source");

        assert_eq!((bitmap.width(), bitmap.height()), (4, 4));
        assert_eq!(pipeline.cache_stats().expect("built-in cache").entries, 3);

        pipeline.evict(&resized);
        assert_eq!(pipeline.cache_stats().expect("built-in cache").entries, 2);

        pipeline.invalidate("stub://a");
        assert_eq!(pipeline.cache_stats().expect("built-in cache").entries, 1);

        pipeline.clear_cache();
        assert_eq!(pipeline.cache_stats().expect("built-in cache").entries, 0);
    }

    #[tokio::test]
    async fn test_fetch_reports_unrecognized_source() {
        let pipeline = pipeline_with(Arc::new(StubHandler::new()));

        let result = pipeline.fetch(request("ftp://example.com/a.png")).await;

        assert!(matches!(result, Err(LoadError::Unrecognized { .. })));
    }

    #[tokio::test]
    async fn test_fault_reaches_hook() {
        let (fault_tx, mut fault_rx) = mpsc::unbounded_channel();
        let pipeline = ImagePipeline::builder()
            .add_request_handler(Arc::new(StubHandler::new()))
            .on_fault(move |fault: &TransformFault| {
                let _ = fault_tx.send(fault.clone());
            })
            .build()
            .expect("pipeline builds");
        let (target, mut rx) = RecordingTarget::channel();
        let request = Request::uri("stub://a")
            .transform(Arc::new(PanickingTransformation))
            .build()
            .expect("valid");

        pipeline.load(request, Arc::new(target));

        let fault = tokio::time::timeout(EVENT_TIMEOUT, fault_rx.recv())
            .await
            .expect("fault in time")
            .expect("fault delivered");
        assert!(matches!(fault, TransformFault::Panicked { .. }));
        assert!(matches!(next_event(&mut rx).await, TargetEvent::Prepared { .. }));
        assert_quiet(&mut rx).await;
    }

    #[tokio::test]
    async fn test_custom_cache_has_no_builtin_stats() {
        let cache = Arc::new(MemoryCache::new(1 << 20));
        let pipeline = ImagePipeline::builder()
            .cache(cache.clone())
            .add_request_handler(Arc::new(StubHandler::new()))
            .build()
            .expect("pipeline builds");

        pipeline.fetch(request("stub://a")).await.expect("load");

        assert!(pipeline.cache_stats().is_none());
        assert_eq!(cache.stats().entries, 1);
    }

    #[tokio::test]
    async fn test_shutdown_fails_new_fetches() {
        let pipeline = pipeline_with(Arc::new(StubHandler::new()));
        pipeline.shutdown();
        let snapshot = pipeline.snapshot().await.expect("dispatcher alive");
        assert!(snapshot.shutdown);

        let result = pipeline.fetch(request("stub://late")).await;

        assert_eq!(result.map(|_| ()), Err(LoadError::Shutdown));
    }
}
