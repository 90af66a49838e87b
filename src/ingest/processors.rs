use async_trait::async_trait;
use std::sync::Arc;
use tracing::warn;

use crate::entity::constants::EventType;
use crate::model::event::IssueEventPayload;

/// Resolves minified frontend frames against uploaded sourcemaps for a
/// release.
#[async_trait]
pub trait SourcemapProcessor: Send + Sync {
    async fn process(
        &self,
        payload: &mut IssueEventPayload,
        project_id: i32,
        release_id: i32,
    ) -> anyhow::Result<()>;
}

/// Symbolicates native frames against uploaded debug information files.
#[async_trait]
pub trait DebugFileProcessor: Send + Sync {
    async fn process(&self, payload: &mut IssueEventPayload, project_id: i32)
        -> anyhow::Result<()>;
}

/// Optional payload processors applied before titles and hashes are derived.
/// A failing processor logs and leaves the payload as it was; ingestion
/// continues either way.
#[derive(Clone, Default)]
pub struct EventProcessors {
    pub sourcemaps: Option<Arc<dyn SourcemapProcessor>>,
    pub debug_files: Option<Arc<dyn DebugFileProcessor>>,
}

impl EventProcessors {
    pub async fn apply(
        &self,
        project_id: i32,
        release_id: Option<i32>,
        event_type: EventType,
        payload: &mut IssueEventPayload,
    ) {
        let is_frontend = matches!(payload.platform.as_deref(), Some("javascript" | "node"));
        if is_frontend && release_id.is_some() {
            if let (Some(processor), Some(release_id)) = (&self.sourcemaps, release_id) {
                if let Err(error) = processor.process(payload, project_id, release_id).await {
                    warn!(project_id, %error, "sourcemap processing failed");
                }
            }
        } else if event_type == EventType::Error && payload.exception.is_some() {
            if let Some(processor) = &self.debug_files {
                if let Err(error) = processor.process(payload, project_id).await {
                    warn!(project_id, %error, "debug file processing failed");
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::event::{ExceptionChain, ExceptionValue};
    use std::sync::atomic::{AtomicUsize, Ordering};

    struct CountingSourcemaps(Arc<AtomicUsize>);

    #[async_trait]
    impl SourcemapProcessor for CountingSourcemaps {
        async fn process(
            &self,
            _payload: &mut IssueEventPayload,
            _project_id: i32,
            _release_id: i32,
        ) -> anyhow::Result<()> {
            self.0.fetch_add(1, Ordering::SeqCst);
            Ok(())
        }
    }

    struct CountingDebugFiles(Arc<AtomicUsize>);

    #[async_trait]
    impl DebugFileProcessor for CountingDebugFiles {
        async fn process(
            &self,
            _payload: &mut IssueEventPayload,
            _project_id: i32,
        ) -> anyhow::Result<()> {
            self.0.fetch_add(1, Ordering::SeqCst);
            Ok(())
        }
    }

    struct FailingSourcemaps;

    #[async_trait]
    impl SourcemapProcessor for FailingSourcemaps {
        async fn process(
            &self,
            _payload: &mut IssueEventPayload,
            _project_id: i32,
            _release_id: i32,
        ) -> anyhow::Result<()> {
            anyhow::bail!("sourcemap fetch failed")
        }
    }

    fn processors(
        sourcemap_count: &Arc<AtomicUsize>,
        debug_count: &Arc<AtomicUsize>,
    ) -> EventProcessors {
        EventProcessors {
            sourcemaps: Some(Arc::new(CountingSourcemaps(Arc::clone(sourcemap_count)))),
            debug_files: Some(Arc::new(CountingDebugFiles(Arc::clone(debug_count)))),
        }
    }

    fn error_payload(platform: &str) -> IssueEventPayload {
        IssueEventPayload {
            platform: Some(platform.to_owned()),
            exception: Some(ExceptionChain::List(vec![ExceptionValue::default()])),
            ..Default::default()
        }
    }

    #[tokio::test]
    async fn javascript_with_release_routes_to_sourcemaps() {
        let sourcemaps = Arc::new(AtomicUsize::new(0));
        let debug_files = Arc::new(AtomicUsize::new(0));
        let processors = processors(&sourcemaps, &debug_files);
        let mut payload = error_payload("javascript");

        processors
            .apply(1, Some(3), EventType::Error, &mut payload)
            .await;

        assert_eq!(sourcemaps.load(Ordering::SeqCst), 1);
        assert_eq!(debug_files.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn javascript_without_release_falls_through_to_debug_files() {
        let sourcemaps = Arc::new(AtomicUsize::new(0));
        let debug_files = Arc::new(AtomicUsize::new(0));
        let processors = processors(&sourcemaps, &debug_files);
        let mut payload = error_payload("javascript");

        processors.apply(1, None, EventType::Error, &mut payload).await;

        assert_eq!(sourcemaps.load(Ordering::SeqCst), 0);
        assert_eq!(debug_files.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn native_error_routes_to_debug_files() {
        let sourcemaps = Arc::new(AtomicUsize::new(0));
        let debug_files = Arc::new(AtomicUsize::new(0));
        let processors = processors(&sourcemaps, &debug_files);
        let mut payload = error_payload("native");

        processors
            .apply(1, Some(3), EventType::Error, &mut payload)
            .await;

        assert_eq!(sourcemaps.load(Ordering::SeqCst), 0);
        assert_eq!(debug_files.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn processor_failure_does_not_propagate() {
        let processors = EventProcessors {
            sourcemaps: Some(Arc::new(FailingSourcemaps)),
            debug_files: None,
        };
        let mut payload = error_payload("javascript");
        // Must not panic or return an error.
        processors
            .apply(1, Some(3), EventType::Error, &mut payload)
            .await;
    }

    #[tokio::test]
    async fn default_processors_are_a_no_op() {
        let processors = EventProcessors::default();
        let mut payload = error_payload("javascript");
        processors
            .apply(1, Some(3), EventType::Error, &mut payload)
            .await;
        assert!(payload.exception.is_some());
    }
}
