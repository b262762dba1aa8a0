pub mod document;
pub mod error;
pub mod logging;
pub mod pipeline;
pub mod registry;
pub mod scheduler;
pub mod sink;

pub use document::{DocumentBuffer, DocumentId, Snapshot};
pub use error::{Result, TreelineError};
pub use pipeline::{
    OutlineKind, OutlineNode, OutlineTree, ParseError, ParsePipeline, ParseResult, PipelineOutput,
    Span, Token,
};
pub use registry::{ParserRegistry, PipelineFactory};
pub use scheduler::{BackgroundParser, SchedulerConfig, Subscription};
pub use sink::{DiagnosticsSink, DocumentNameResolver, StaticNameResolver, TracingDiagnostics};
