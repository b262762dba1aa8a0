//! PHP outlining backend for the treeline background parse engine.

mod lexer;
mod parser;

use tokio_util::sync::CancellationToken;

use treeline_core::{ParsePipeline, PipelineOutput, Snapshot, Token};

/// The PHP pipeline: region splitter, logos lexer, outline parser with
/// error recovery.
///
/// Stateless and deterministic; one instance can serve any number of
/// sequential parses, and the registry may create one per document.
#[derive(Debug, Default)]
pub struct PhpPipeline;

impl PhpPipeline {
    pub fn new() -> Self {
        Self
    }
}

impl ParsePipeline for PhpPipeline {
    fn content_type(&self) -> &'static str {
        "php"
    }

    fn parse(&self, snapshot: &Snapshot, cancel: &CancellationToken) -> PipelineOutput {
        let text = snapshot.text();
        let lexed = lexer::lex(text);
        let tokens: Vec<Token> = lexed
            .regions
            .iter()
            .flat_map(|region| region.tokens.iter())
            .map(|(token, span)| Token {
                kind: token.name(),
                span: *span,
            })
            .collect();

        if cancel.is_cancelled() {
            return PipelineOutput {
                tokens,
                errors: lexed.errors,
                ..PipelineOutput::default()
            }
            .cancelled();
        }

        let parsed = parser::parse(text, &lexed.regions, cancel);

        let mut errors = lexed.errors;
        errors.extend(parsed.errors);
        errors.sort_by_key(|e| (e.span.start, e.span.end));

        let mut output = PipelineOutput {
            tokens,
            tree: parsed.tree,
            errors,
            cancelled: false,
        };
        if parsed.cancelled {
            output = output.cancelled();
        }
        output
    }
}
