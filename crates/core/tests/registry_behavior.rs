use std::sync::Arc;

use tokio_util::sync::CancellationToken;

use treeline_core::{
    DocumentBuffer, ParsePipeline, ParserRegistry, PipelineFactory, PipelineOutput,
    SchedulerConfig, Snapshot, StaticNameResolver, TracingDiagnostics, TreelineError,
};

struct NullPipeline;

impl ParsePipeline for NullPipeline {
    fn content_type(&self) -> &'static str {
        "test"
    }

    fn parse(&self, _snapshot: &Snapshot, _cancel: &CancellationToken) -> PipelineOutput {
        PipelineOutput::default()
    }
}

fn registry() -> ParserRegistry {
    let registry = ParserRegistry::new(
        Arc::new(StaticNameResolver::new()),
        Arc::new(TracingDiagnostics),
        SchedulerConfig::default(),
    );
    registry.register(
        "test",
        Arc::new(|| Arc::new(NullPipeline) as Arc<dyn ParsePipeline>) as Arc<dyn PipelineFactory>,
    );
    registry
}

#[tokio::test]
async fn same_document_yields_the_same_scheduler() {
    let registry = registry();
    let buffer = DocumentBuffer::new("test", "x");

    let first = registry.scheduler_for(&buffer).expect("registered");
    let second = registry.scheduler_for(&buffer).expect("registered");
    assert!(Arc::ptr_eq(&first, &second));
    assert_eq!(registry.open_documents(), 1);

    registry.close_all().await;
}

#[tokio::test]
async fn unregistered_content_type_fails_at_creation() {
    let registry = registry();
    let buffer = DocumentBuffer::new("ruby", "puts 1");

    match registry.scheduler_for(&buffer) {
        Err(TreelineError::UnknownContentType(ct)) => assert_eq!(ct, "ruby"),
        Err(other) => panic!("unexpected error: {other}"),
        Ok(_) => panic!("expected UnknownContentType"),
    }
    assert_eq!(registry.open_documents(), 0);
}

#[tokio::test]
async fn closing_a_document_disposes_its_scheduler() {
    let registry = registry();
    let buffer = DocumentBuffer::new("test", "x");

    registry.scheduler_for(&buffer).expect("registered");
    assert_eq!(registry.open_documents(), 1);

    registry.close_document(buffer.id()).await;
    assert_eq!(registry.open_documents(), 0);

    // Reopening creates a fresh scheduler.
    registry.scheduler_for(&buffer).expect("registered");
    assert_eq!(registry.open_documents(), 1);
    registry.close_all().await;
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn concurrent_first_access_creates_exactly_one_scheduler() {
    let registry = Arc::new(registry());
    let buffer = DocumentBuffer::new("test", "x");

    let mut handles = Vec::new();
    for _ in 0..16 {
        let registry = Arc::clone(&registry);
        let buffer = Arc::clone(&buffer);
        handles.push(tokio::spawn(async move {
            registry.scheduler_for(&buffer).expect("registered")
        }));
    }

    let mut schedulers = Vec::new();
    for handle in handles {
        schedulers.push(handle.await.expect("task panicked"));
    }
    for other in &schedulers[1..] {
        assert!(Arc::ptr_eq(&schedulers[0], other));
    }
    assert_eq!(registry.open_documents(), 1);

    registry.close_all().await;
}
