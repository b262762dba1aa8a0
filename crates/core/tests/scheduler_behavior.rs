use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Condvar, Mutex};
use std::time::Duration;

use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;

use treeline_core::{
    BackgroundParser, DiagnosticsSink, DocumentBuffer, DocumentId, OutlineKind, OutlineNode,
    OutlineTree, ParseError, ParsePipeline, ParseResult, PipelineOutput, SchedulerConfig, Snapshot,
    Span, StaticNameResolver, Token,
};

fn config(debounce_ms: u64) -> SchedulerConfig {
    SchedulerConfig {
        debounce: Duration::from_millis(debounce_ms),
    }
}

fn output_for(snapshot: &Snapshot) -> PipelineOutput {
    let span = Span::new(0, snapshot.len());
    PipelineOutput {
        tokens: vec![Token { kind: "text", span }],
        tree: OutlineTree {
            roots: vec![OutlineNode::new(OutlineKind::Region, None, span)],
        },
        errors: Vec::new(),
        cancelled: false,
    }
}

/// Completes immediately; counts invocations.
struct CountingPipeline {
    calls: AtomicUsize,
}

impl CountingPipeline {
    fn new() -> Arc<Self> {
        Arc::new(Self {
            calls: AtomicUsize::new(0),
        })
    }
}

impl ParsePipeline for CountingPipeline {
    fn content_type(&self) -> &'static str {
        "test"
    }

    fn parse(&self, snapshot: &Snapshot, _cancel: &CancellationToken) -> PipelineOutput {
        self.calls.fetch_add(1, Ordering::SeqCst);
        output_for(snapshot)
    }
}

struct Gate {
    released: Mutex<bool>,
    cv: Condvar,
}

impl Gate {
    fn new() -> Arc<Self> {
        Arc::new(Self {
            released: Mutex::new(false),
            cv: Condvar::new(),
        })
    }

    fn wait(&self) {
        let mut released = self.released.lock().expect("lock poisoned");
        while !*released {
            released = self.cv.wait(released).expect("lock poisoned");
        }
    }

    fn open(&self) {
        *self.released.lock().expect("lock poisoned") = true;
        self.cv.notify_all();
    }
}

/// Blocks inside `parse` until the gate opens, so tests control exactly
/// when a run completes relative to newer edits.
struct GatedPipeline {
    gate: Arc<Gate>,
    calls: AtomicUsize,
    observe_cancel: bool,
}

impl GatedPipeline {
    fn new(gate: Arc<Gate>, observe_cancel: bool) -> Arc<Self> {
        Arc::new(Self {
            gate,
            calls: AtomicUsize::new(0),
            observe_cancel,
        })
    }
}

impl ParsePipeline for GatedPipeline {
    fn content_type(&self) -> &'static str {
        "test"
    }

    fn parse(&self, snapshot: &Snapshot, cancel: &CancellationToken) -> PipelineOutput {
        self.calls.fetch_add(1, Ordering::SeqCst);
        self.gate.wait();
        if self.observe_cancel && cancel.is_cancelled() {
            return PipelineOutput::default().cancelled();
        }
        output_for(snapshot)
    }
}

/// Panics on the first call, succeeds afterwards.
struct FaultyOncePipeline {
    failed: AtomicUsize,
}

impl ParsePipeline for FaultyOncePipeline {
    fn content_type(&self) -> &'static str {
        "test"
    }

    fn parse(&self, snapshot: &Snapshot, _cancel: &CancellationToken) -> PipelineOutput {
        if self.failed.fetch_add(1, Ordering::SeqCst) == 0 {
            panic!("grammar bug");
        }
        output_for(snapshot)
    }
}

struct ErroringPipeline;

impl ParsePipeline for ErroringPipeline {
    fn content_type(&self) -> &'static str {
        "test"
    }

    fn parse(&self, snapshot: &Snapshot, _cancel: &CancellationToken) -> PipelineOutput {
        let mut output = output_for(snapshot);
        output.errors.push(ParseError::new(
            Span::new(8, 9),
            "expected expression".to_string(),
        ));
        output
    }
}

#[derive(Default)]
struct CollectingSink {
    lines: Mutex<Vec<(DocumentId, String)>>,
}

impl CollectingSink {
    fn lines(&self) -> Vec<String> {
        self.lines
            .lock()
            .expect("lock poisoned")
            .iter()
            .map(|(_, line)| line.clone())
            .collect()
    }
}

impl DiagnosticsSink for CollectingSink {
    fn write_line(&self, document: DocumentId, line: &str) {
        self.lines
            .lock()
            .expect("lock poisoned")
            .push((document, line.to_string()));
    }
}

struct Fixture {
    buffer: Arc<DocumentBuffer>,
    parser: BackgroundParser,
    results: mpsc::UnboundedReceiver<Arc<ParseResult>>,
    sink: Arc<CollectingSink>,
}

fn fixture(pipeline: Arc<dyn ParsePipeline>, debounce_ms: u64) -> Fixture {
    let buffer = DocumentBuffer::new("test", "initial");
    let resolver = Arc::new(StaticNameResolver::new());
    resolver.insert(buffer.id(), "A.test");
    let sink = Arc::new(CollectingSink::default());
    let parser = BackgroundParser::spawn(
        Arc::clone(&buffer),
        pipeline,
        resolver,
        Arc::clone(&sink) as Arc<dyn DiagnosticsSink>,
        config(debounce_ms),
    );
    let (tx, results) = mpsc::unbounded_channel();
    parser.subscribe(move |result| {
        let _ = tx.send(result);
    });
    Fixture {
        buffer,
        parser,
        results,
        sink,
    }
}

async fn recv(results: &mut mpsc::UnboundedReceiver<Arc<ParseResult>>) -> Arc<ParseResult> {
    tokio::time::timeout(Duration::from_secs(5), results.recv())
        .await
        .expect("timed out waiting for a parse result")
        .expect("result channel closed")
}

async fn wait_until(what: &str, mut cond: impl FnMut() -> bool) {
    for _ in 0..1000 {
        if cond() {
            return;
        }
        tokio::time::sleep(Duration::from_millis(5)).await;
    }
    panic!("timed out waiting for {what}");
}

#[tokio::test(start_paused = true)]
async fn debounce_coalesces_a_burst_of_requests() {
    let pipeline = CountingPipeline::new();
    let mut fx = fixture(Arc::clone(&pipeline) as Arc<dyn ParsePipeline>, 75);

    // Three rapid edits plus explicit reparse requests, all inside one
    // debounce window.
    fx.buffer.edit("v2");
    fx.parser.request_reparse();
    fx.buffer.edit("v3");
    fx.parser.request_reparse();
    fx.buffer.edit("v4");
    fx.parser.request_reparse();

    let result = recv(&mut fx.results).await;
    assert_eq!(result.version, 4, "parse runs for the newest snapshot");
    assert_eq!(pipeline.calls.load(Ordering::SeqCst), 1, "one execution, not k");

    // The window is spent; nothing else arrives.
    tokio::time::sleep(Duration::from_millis(500)).await;
    assert!(fx.results.try_recv().is_err());
    assert_eq!(pipeline.calls.load(Ordering::SeqCst), 1);

    fx.parser.shutdown().await;
}

#[tokio::test]
async fn delivered_versions_are_strictly_increasing() {
    let pipeline = CountingPipeline::new();
    let mut fx = fixture(Arc::clone(&pipeline) as Arc<dyn ParsePipeline>, 10);

    let mut seen = Vec::new();
    for text in ["b", "c", "d"] {
        fx.buffer.edit(text);
        let result = recv(&mut fx.results).await;
        assert!(!result.tokens.is_empty());
        seen.push(result.version);
    }
    assert_eq!(seen, vec![2, 3, 4]);

    fx.parser.shutdown().await;
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn superseded_parse_is_cancelled_and_never_delivered() {
    let gate = Gate::new();
    let pipeline = GatedPipeline::new(Arc::clone(&gate), false);
    let mut fx = fixture(Arc::clone(&pipeline) as Arc<dyn ParsePipeline>, 10);

    fx.buffer.edit("old");
    wait_until("first parse to start", || {
        pipeline.calls.load(Ordering::SeqCst) == 1
    })
    .await;

    // A newer edit supersedes the blocked run.
    fx.buffer.edit("new");
    wait_until("second parse to start", || {
        pipeline.calls.load(Ordering::SeqCst) == 2
    })
    .await;

    gate.open();
    let result = recv(&mut fx.results).await;
    assert_eq!(result.version, 3, "only the newest version is delivered");

    tokio::time::sleep(Duration::from_millis(50)).await;
    assert!(fx.results.try_recv().is_err(), "stale v2 result was suppressed");

    fx.parser.shutdown().await;
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn cooperatively_cancelled_partial_output_is_suppressed() {
    let gate = Gate::new();
    let pipeline = GatedPipeline::new(Arc::clone(&gate), true);
    let mut fx = fixture(Arc::clone(&pipeline) as Arc<dyn ParsePipeline>, 10);

    fx.buffer.edit("old");
    wait_until("first parse to start", || {
        pipeline.calls.load(Ordering::SeqCst) == 1
    })
    .await;
    fx.buffer.edit("new");
    wait_until("second parse to start", || {
        pipeline.calls.load(Ordering::SeqCst) == 2
    })
    .await;

    // First run now observes its cancelled token and returns partial
    // output; the second completes normally.
    gate.open();
    let result = recv(&mut fx.results).await;
    assert_eq!(result.version, 3);
    tokio::time::sleep(Duration::from_millis(50)).await;
    assert!(fx.results.try_recv().is_err());

    fx.parser.shutdown().await;
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn shutdown_silences_in_flight_work() {
    let gate = Gate::new();
    let pipeline = GatedPipeline::new(Arc::clone(&gate), false);
    let mut fx = fixture(Arc::clone(&pipeline) as Arc<dyn ParsePipeline>, 10);

    fx.buffer.edit("v2");
    wait_until("parse to start", || {
        pipeline.calls.load(Ordering::SeqCst) == 1
    })
    .await;

    fx.parser.shutdown().await;
    gate.open();

    tokio::time::sleep(Duration::from_millis(100)).await;
    assert!(
        fx.results.try_recv().is_err(),
        "no result is delivered after shutdown returns"
    );
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn pipeline_fault_is_logged_and_does_not_wedge_the_scheduler() {
    let pipeline = Arc::new(FaultyOncePipeline {
        failed: AtomicUsize::new(0),
    });
    let mut fx = fixture(Arc::clone(&pipeline) as Arc<dyn ParsePipeline>, 10);

    // First cycle panics: no result, one diagnostics line.
    fx.buffer.edit("boom");
    wait_until("fault to reach the sink", || {
        fx.sink.lines().iter().any(|l| l.contains("background parse failed"))
    })
    .await;
    assert!(fx.results.try_recv().is_err());
    assert!(fx.sink.lines()[0].contains("grammar bug"));

    // Next edit retries cleanly.
    fx.buffer.edit("fine");
    let result = recv(&mut fx.results).await;
    assert_eq!(result.version, 3);

    fx.parser.shutdown().await;
}

#[tokio::test]
async fn syntax_errors_are_mirrored_to_the_diagnostics_sink() {
    let mut fx = fixture(Arc::new(ErroringPipeline), 10);

    fx.buffer.edit("line one\nline two");
    let result = recv(&mut fx.results).await;
    assert_eq!(result.errors.len(), 1);

    let lines = fx.sink.lines();
    assert_eq!(lines.len(), 1);
    // Byte offset 8 of "line one\nline two" is the newline: line 0, col 8.
    assert_eq!(lines[0], "A.test(0:8): expected expression");

    fx.parser.shutdown().await;
}

#[tokio::test]
async fn unsubscribed_consumers_stop_receiving() {
    let pipeline = CountingPipeline::new();
    let buffer = DocumentBuffer::new("test", "x");
    let parser = BackgroundParser::spawn(
        Arc::clone(&buffer),
        pipeline as Arc<dyn ParsePipeline>,
        Arc::new(StaticNameResolver::new()),
        Arc::new(CollectingSink::default()) as Arc<dyn DiagnosticsSink>,
        config(10),
    );

    let (tx_a, mut rx_a) = mpsc::unbounded_channel();
    let (tx_b, mut rx_b) = mpsc::unbounded_channel();
    let sub_a = parser.subscribe(move |r| {
        let _ = tx_a.send(r);
    });
    let _sub_b = parser.subscribe(move |r| {
        let _ = tx_b.send(r);
    });

    buffer.edit("y");
    assert_eq!(recv(&mut rx_a).await.version, 2);
    assert_eq!(recv(&mut rx_b).await.version, 2);

    parser.unsubscribe(sub_a);
    buffer.edit("z");
    assert_eq!(recv(&mut rx_b).await.version, 3);
    assert!(rx_a.try_recv().is_err());

    parser.shutdown().await;
}
