//! Content-type dispatch and per-document scheduler memoization.
//!
//! Hosts register one pipeline factory per content type, then ask for the
//! scheduler of a buffer as often as they like: the first call creates it,
//! every later call returns the same instance. Creation is at-most-once
//! even under concurrent first access — two subsystems racing to open the
//! same document must never end up with two live schedulers.

use std::sync::Arc;

use dashmap::DashMap;
use dashmap::mapref::entry::Entry;

use crate::document::{DocumentBuffer, DocumentId};
use crate::error::{Result, TreelineError};
use crate::pipeline::ParsePipeline;
use crate::scheduler::{BackgroundParser, SchedulerConfig};
use crate::sink::{DiagnosticsSink, DocumentNameResolver};

/// Constructs a fresh pipeline for one document.
///
/// Closures returning `Arc<dyn ParsePipeline>` implement this directly.
pub trait PipelineFactory: Send + Sync {
    fn create(&self) -> Arc<dyn ParsePipeline>;
}

impl<F> PipelineFactory for F
where
    F: Fn() -> Arc<dyn ParsePipeline> + Send + Sync,
{
    fn create(&self) -> Arc<dyn ParsePipeline> {
        self()
    }
}

/// Maps content types to pipeline factories and memoizes one
/// [`BackgroundParser`] per open document.
pub struct ParserRegistry {
    factories: DashMap<String, Arc<dyn PipelineFactory>>,
    schedulers: DashMap<DocumentId, Arc<BackgroundParser>>,
    resolver: Arc<dyn DocumentNameResolver>,
    sink: Arc<dyn DiagnosticsSink>,
    config: SchedulerConfig,
}

impl ParserRegistry {
    pub fn new(
        resolver: Arc<dyn DocumentNameResolver>,
        sink: Arc<dyn DiagnosticsSink>,
        config: SchedulerConfig,
    ) -> Self {
        Self {
            factories: DashMap::new(),
            schedulers: DashMap::new(),
            resolver,
            sink,
            config,
        }
    }

    pub fn register(&self, content_type: impl Into<String>, factory: Arc<dyn PipelineFactory>) {
        self.factories.insert(content_type.into(), factory);
    }

    pub fn supports(&self, content_type: &str) -> bool {
        self.factories.contains_key(content_type)
    }

    /// Builds a pipeline for a content type without a scheduler, for
    /// one-shot (non-background) parses.
    pub fn pipeline_for(&self, content_type: &str) -> Result<Arc<dyn ParsePipeline>> {
        let factory = self
            .factories
            .get(content_type)
            .ok_or_else(|| TreelineError::UnknownContentType(content_type.to_string()))?;
        Ok(factory.create())
    }

    /// Returns the scheduler for `buffer`, creating it on first access.
    ///
    /// Fails loudly when no pipeline is registered for the buffer's content
    /// type — a misconfigured host should find out immediately, not observe
    /// a document that silently never parses.
    pub fn scheduler_for(&self, buffer: &Arc<DocumentBuffer>) -> Result<Arc<BackgroundParser>> {
        if let Some(existing) = self.schedulers.get(&buffer.id()) {
            return Ok(Arc::clone(&existing));
        }

        let pipeline = self.pipeline_for(buffer.content_type())?;

        // The entry lock makes creation atomic: a racing first access either
        // creates the scheduler or observes the one the winner inserted.
        match self.schedulers.entry(buffer.id()) {
            Entry::Occupied(occupied) => Ok(Arc::clone(occupied.get())),
            Entry::Vacant(vacant) => {
                let parser = Arc::new(BackgroundParser::spawn(
                    Arc::clone(buffer),
                    pipeline,
                    Arc::clone(&self.resolver),
                    Arc::clone(&self.sink),
                    self.config.clone(),
                ));
                vacant.insert(Arc::clone(&parser));
                tracing::debug!(document = %buffer.id(), content_type = buffer.content_type(), "scheduler created");
                Ok(parser)
            }
        }
    }

    /// Removes and shuts down the scheduler of a closing document. No-op
    /// for documents the registry never saw.
    pub async fn close_document(&self, document: DocumentId) {
        if let Some((_, parser)) = self.schedulers.remove(&document) {
            parser.shutdown().await;
            tracing::debug!(%document, "scheduler closed");
        }
    }

    /// Shuts down every live scheduler.
    pub async fn close_all(&self) {
        let open: Vec<DocumentId> = self.schedulers.iter().map(|e| *e.key()).collect();
        for document in open {
            self.close_document(document).await;
        }
    }

    pub fn open_documents(&self) -> usize {
        self.schedulers.len()
    }
}
