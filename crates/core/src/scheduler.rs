//! The background parse scheduler.
//!
//! One scheduler owns the single logical "current parse" of one document.
//! It listens to the buffer's change stream, debounces bursts of edits,
//! cancels in-flight work that a newer edit superseded, runs the pipeline
//! on the blocking pool, and delivers non-superseded results to
//! subscribers in snapshot-version order.
//!
//! All mutable scheduling state (debounce deadline, in-flight parse, last
//! delivered version) lives inside one control task, so the public surface
//! never blocks and never races: `request_reparse` and the change stream
//! only enqueue wake-ups.

use std::sync::Arc;
use std::sync::Mutex;
use std::time::Duration;

use tokio::sync::mpsc;
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tokio::time::Instant;
use tokio_util::sync::CancellationToken;

use crate::document::{DocumentBuffer, DocumentId, Snapshot};
use crate::pipeline::{ParseError, ParsePipeline, ParseResult, PipelineOutput};
use crate::sink::{DiagnosticsSink, DocumentNameResolver};

/// Scheduler tunables. The debounce delay trades latency for wasted work;
/// it is configuration, not a correctness property.
#[derive(Debug, Clone)]
pub struct SchedulerConfig {
    pub debounce: Duration,
}

impl Default for SchedulerConfig {
    fn default() -> Self {
        Self {
            debounce: Duration::from_millis(75),
        }
    }
}

/// Handle for removing a subscriber registered with
/// [`BackgroundParser::subscribe`].
#[derive(Debug)]
pub struct Subscription(u64);

type SubscriberFn = Box<dyn Fn(Arc<ParseResult>) + Send + Sync>;

#[derive(Default)]
struct Subscribers {
    closed: bool,
    next_id: u64,
    entries: Vec<(u64, SubscriberFn)>,
}

/// Subscriber list shared between the handle and the control task.
///
/// Delivery and the closed flag are checked under one lock: once `close`
/// returns, no delivery can start, which is what makes shutdown silence a
/// hard guarantee rather than a race.
#[derive(Default)]
struct Shared {
    subscribers: Mutex<Subscribers>,
}

impl Shared {
    fn lock(&self) -> std::sync::MutexGuard<'_, Subscribers> {
        match self.subscribers.lock() {
            Ok(guard) => guard,
            Err(poisoned) => poisoned.into_inner(),
        }
    }

    fn add(&self, callback: SubscriberFn) -> Subscription {
        let mut subs = self.lock();
        let id = subs.next_id;
        subs.next_id += 1;
        // Registering against a closed scheduler yields an inert
        // subscription rather than an error; the document is going away.
        if !subs.closed {
            subs.entries.push((id, callback));
        }
        Subscription(id)
    }

    fn remove(&self, subscription: Subscription) {
        let mut subs = self.lock();
        subs.entries.retain(|(id, _)| *id != subscription.0);
    }

    fn close(&self) {
        let mut subs = self.lock();
        subs.closed = true;
        subs.entries.clear();
    }

    fn deliver(&self, result: &Arc<ParseResult>) -> bool {
        let subs = self.lock();
        if subs.closed {
            return false;
        }
        for (_, callback) in &subs.entries {
            callback(Arc::clone(result));
        }
        true
    }
}

struct InFlight {
    version: u64,
    cancel: CancellationToken,
}

enum CompletionPayload {
    Finished {
        snapshot: Arc<Snapshot>,
        output: PipelineOutput,
        elapsed: Duration,
    },
    /// The pipeline panicked; carries the panic message.
    Faulted(String),
}

struct Completion {
    version: u64,
    payload: CompletionPayload,
}

/// Background parser for one document.
///
/// Created via [`BackgroundParser::spawn`], which also starts listening to
/// the buffer's change stream (there is no separate start step). Dropping
/// the handle without calling [`BackgroundParser::shutdown`] leaves the
/// control task running until the runtime shuts down, so owners — normally
/// the [`crate::registry::ParserRegistry`] — shut schedulers down when the
/// document closes.
pub struct BackgroundParser {
    document: DocumentId,
    shared: Arc<Shared>,
    reparse_tx: mpsc::UnboundedSender<()>,
    shutdown: CancellationToken,
    task: Mutex<Option<JoinHandle<()>>>,
}

impl BackgroundParser {
    /// Starts a scheduler for `buffer`, parsing with `pipeline`.
    ///
    /// Must be called inside a tokio runtime. The first parse happens one
    /// debounce window after the first edit or `request_reparse`.
    pub fn spawn(
        buffer: Arc<DocumentBuffer>,
        pipeline: Arc<dyn ParsePipeline>,
        resolver: Arc<dyn DocumentNameResolver>,
        sink: Arc<dyn DiagnosticsSink>,
        config: SchedulerConfig,
    ) -> Self {
        let document = buffer.id();
        let shutdown = CancellationToken::new();
        let shared = Arc::new(Shared::default());
        let (reparse_tx, reparse_rx) = mpsc::unbounded_channel();
        let (completion_tx, completion_rx) = mpsc::unbounded_channel();

        let state = ControlState {
            document,
            changes: buffer.changes(),
            buffer,
            pipeline,
            resolver,
            sink,
            shared: Arc::clone(&shared),
            config,
            reparse_rx,
            completion_tx,
            completion_rx,
            shutdown: shutdown.clone(),
            deadline: None,
            in_flight: None,
            last_delivered: 0,
            changes_closed: false,
        };
        let task = tokio::spawn(state.run());

        Self {
            document,
            shared,
            reparse_tx,
            shutdown,
            task: Mutex::new(Some(task)),
        }
    }

    pub fn document(&self) -> DocumentId {
        self.document
    }

    /// Arms (or re-arms) the debounce window. Idempotent, non-blocking,
    /// safe to call once per keystroke from any thread.
    pub fn request_reparse(&self) {
        let _ = self.reparse_tx.send(());
    }

    /// Registers a consumer of delivered parse results.
    ///
    /// Every subscriber receives every non-superseded result, in snapshot
    /// version order. Callbacks run on the scheduler's control task and
    /// should hand off promptly rather than doing heavy work inline.
    pub fn subscribe(
        &self,
        callback: impl Fn(Arc<ParseResult>) + Send + Sync + 'static,
    ) -> Subscription {
        self.shared.add(Box::new(callback))
    }

    pub fn unsubscribe(&self, subscription: Subscription) {
        self.shared.remove(subscription);
    }

    /// Stops the scheduler: cancels any in-flight parse and releases the
    /// change subscription. After this returns, no subscriber sees another
    /// result, even if a parse was mid-flight at the moment of shutdown.
    pub async fn shutdown(&self) {
        // Closing first makes delivery silence unconditional; cancelling
        // merely makes the control task exit promptly.
        self.shared.close();
        self.shutdown.cancel();
        let task = {
            let mut guard = match self.task.lock() {
                Ok(guard) => guard,
                Err(poisoned) => poisoned.into_inner(),
            };
            guard.take()
        };
        if let Some(task) = task {
            let _ = task.await;
        }
    }
}

struct ControlState {
    document: DocumentId,
    buffer: Arc<DocumentBuffer>,
    pipeline: Arc<dyn ParsePipeline>,
    resolver: Arc<dyn DocumentNameResolver>,
    sink: Arc<dyn DiagnosticsSink>,
    shared: Arc<Shared>,
    config: SchedulerConfig,
    reparse_rx: mpsc::UnboundedReceiver<()>,
    completion_tx: mpsc::UnboundedSender<Completion>,
    completion_rx: mpsc::UnboundedReceiver<Completion>,
    shutdown: CancellationToken,
    changes: watch::Receiver<u64>,
    deadline: Option<Instant>,
    in_flight: Option<InFlight>,
    last_delivered: u64,
    changes_closed: bool,
}

impl ControlState {
    async fn run(mut self) {
        tracing::debug!(document = %self.document, "background parser started");
        loop {
            let deadline = self.deadline;
            tokio::select! {
                _ = self.shutdown.cancelled() => break,
                changed = self.changes.changed(), if !self.changes_closed => {
                    match changed {
                        Ok(()) => {
                            self.changes.borrow_and_update();
                            self.arm();
                        }
                        // Buffer dropped; explicit reparse requests still work.
                        Err(_) => self.changes_closed = true,
                    }
                }
                Some(()) = self.reparse_rx.recv() => self.arm(),
                _ = tokio::time::sleep_until(deadline.unwrap_or_else(far_future)), if deadline.is_some() => {
                    self.deadline = None;
                    self.begin_parse();
                }
                Some(done) = self.completion_rx.recv() => self.finish(done),
            }
        }
        if let Some(in_flight) = self.in_flight.take() {
            in_flight.cancel.cancel();
        }
        tracing::debug!(document = %self.document, "background parser stopped");
    }

    fn arm(&mut self) {
        self.deadline = Some(Instant::now() + self.config.debounce);
    }

    /// Debounce window elapsed: capture the newest snapshot and start a
    /// parse for it, cancelling any older run still in flight.
    fn begin_parse(&mut self) {
        let snapshot = self.buffer.current();
        let version = snapshot.version();
        if version <= self.last_delivered {
            return;
        }
        if let Some(in_flight) = &self.in_flight {
            if in_flight.version >= version {
                // Already parsing this version; nothing newer to do.
                return;
            }
            tracing::debug!(
                document = %self.document,
                stale = in_flight.version,
                newest = version,
                "cancelling superseded parse"
            );
            in_flight.cancel.cancel();
        }

        let cancel = self.shutdown.child_token();
        let worker_cancel = cancel.clone();
        let pipeline = Arc::clone(&self.pipeline);
        let worker = tokio::task::spawn_blocking(move || {
            let started = std::time::Instant::now();
            let output = pipeline.parse(&snapshot, &worker_cancel);
            (snapshot, output, started.elapsed())
        });

        let completion_tx = self.completion_tx.clone();
        tokio::spawn(async move {
            let payload = match worker.await {
                Ok((snapshot, output, elapsed)) => CompletionPayload::Finished {
                    snapshot,
                    output,
                    elapsed,
                },
                Err(join_error) => CompletionPayload::Faulted(describe_join_error(join_error)),
            };
            let _ = completion_tx.send(Completion { version, payload });
        });

        self.in_flight = Some(InFlight { version, cancel });
    }

    /// A pipeline run finished. Deliver it only if it is still the current
    /// one; superseded completions are discarded silently, which keeps
    /// delivery strictly increasing in snapshot version.
    fn finish(&mut self, done: Completion) {
        let is_current = self
            .in_flight
            .as_ref()
            .is_some_and(|p| p.version == done.version);
        if !is_current {
            tracing::trace!(
                document = %self.document,
                version = done.version,
                "discarding superseded completion"
            );
            return;
        }
        self.in_flight = None;

        match done.payload {
            CompletionPayload::Finished {
                snapshot,
                output,
                elapsed,
            } => {
                if output.cancelled {
                    // Partial output from a cooperative stop; never shown.
                    return;
                }
                self.report_errors(&snapshot, &output.errors);
                let result = Arc::new(ParseResult {
                    document: self.document,
                    version: done.version,
                    tokens: output.tokens.into(),
                    tree: output.tree,
                    errors: output.errors,
                    elapsed,
                });
                self.last_delivered = done.version;
                tracing::debug!(
                    document = %self.document,
                    version = done.version,
                    errors = result.errors.len(),
                    nodes = result.tree.node_count(),
                    elapsed_ms = elapsed.as_millis() as u64,
                    "parse complete"
                );
                self.shared.deliver(&result);
            }
            CompletionPayload::Faulted(message) => {
                // A grammar bug must not wedge the document: log it and let
                // the next reparse retry cleanly.
                let name = self.resolver.display_name_or_unknown(self.document);
                tracing::error!(document = %self.document, "pipeline fault: {message}");
                self.sink.write_line(
                    self.document,
                    &format!("{name}: background parse failed: {message}"),
                );
            }
        }
    }

    /// Mirrors each recovered syntax error to the diagnostics sink as
    /// `name(line:col): message`, truncating very long messages.
    fn report_errors(&self, snapshot: &Snapshot, errors: &[ParseError]) {
        if errors.is_empty() {
            return;
        }
        let name = self.resolver.display_name_or_unknown(self.document);
        for error in errors {
            let (line, col) = snapshot.line_col(error.span.start);
            let message = truncate_message(&error.message, 100);
            self.sink
                .write_line(self.document, &format!("{name}({line}:{col}): {message}"));
        }
    }
}

fn far_future() -> Instant {
    Instant::now() + Duration::from_secs(86_400)
}

fn truncate_message(message: &str, max: usize) -> String {
    if message.len() <= max {
        return message.to_string();
    }
    let mut cut = max;
    while !message.is_char_boundary(cut) {
        cut -= 1;
    }
    format!("{} ...", &message[..cut])
}

fn describe_join_error(join_error: tokio::task::JoinError) -> String {
    if join_error.is_panic() {
        match join_error.into_panic().downcast::<String>() {
            Ok(message) => *message,
            Err(payload) => match payload.downcast::<&'static str>() {
                Ok(message) => (*message).to_string(),
                Err(_) => "pipeline panicked".to_string(),
            },
        }
    } else {
        "pipeline task cancelled by runtime".to_string()
    }
}
