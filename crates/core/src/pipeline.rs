//! The parse pipeline contract shared by every language backend.
//!
//! A pipeline is a pure function of a snapshot: lex the full text, run the
//! grammar with error recovery, and derive the outline tree. Determinism is
//! load-bearing — the scheduler may cancel and re-run a pipeline at any
//! time, which is only correct because re-running on the same snapshot
//! always reproduces the same tokens, errors, and tree.

use std::sync::Arc;
use std::time::Duration;

use serde::Serialize;
use tokio_util::sync::CancellationToken;

use crate::document::{DocumentId, Snapshot};

/// Half-open byte range into the snapshot text.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct Span {
    pub start: usize,
    pub end: usize,
}

impl Span {
    pub fn new(start: usize, end: usize) -> Self {
        Self { start, end }
    }

    pub fn len(&self) -> usize {
        self.end.saturating_sub(self.start)
    }

    pub fn is_empty(&self) -> bool {
        self.end <= self.start
    }

    /// Smallest span covering both operands.
    pub fn merge(&self, other: Span) -> Span {
        Span {
            start: self.start.min(other.start),
            end: self.end.max(other.end),
        }
    }

    pub fn contains(&self, other: Span) -> bool {
        self.start <= other.start && other.end <= self.end
    }
}

/// One lexed token. The kind is a language-owned static name so the core
/// model stays language-agnostic; backends keep their structured token
/// enums private to the grammar.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct Token {
    pub kind: &'static str,
    pub span: Span,
}

/// A recovered syntax error: where, and what the grammar reported.
///
/// Emitted in source order, never deduplicated.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ParseError {
    pub span: Span,
    pub message: String,
}

impl ParseError {
    pub fn new(span: Span, message: impl Into<String>) -> Self {
        Self {
            span,
            message: message.into(),
        }
    }
}

/// Structural classification of an outline node.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum OutlineKind {
    Class,
    Interface,
    Enum,
    Record,
    Trait,
    Function,
    Method,
    Field,
    Block,
    Region,
}

impl OutlineKind {
    pub fn name(&self) -> &'static str {
        match self {
            OutlineKind::Class => "class",
            OutlineKind::Interface => "interface",
            OutlineKind::Enum => "enum",
            OutlineKind::Record => "record",
            OutlineKind::Trait => "trait",
            OutlineKind::Function => "function",
            OutlineKind::Method => "method",
            OutlineKind::Field => "field",
            OutlineKind::Block => "block",
            OutlineKind::Region => "region",
        }
    }
}

/// One node of the structural tree; immutable after construction.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct OutlineNode {
    pub kind: OutlineKind,
    /// Declared name, when the construct has one (`class A` → `"A"`).
    pub name: Option<String>,
    pub span: Span,
    pub children: Vec<OutlineNode>,
}

impl OutlineNode {
    pub fn new(kind: OutlineKind, name: Option<String>, span: Span) -> Self {
        Self {
            kind,
            name,
            span,
            children: Vec::new(),
        }
    }

    /// Depth-first lookup by declared name, for consumers and tests.
    pub fn find(&self, name: &str) -> Option<&OutlineNode> {
        if self.name.as_deref() == Some(name) {
            return Some(self);
        }
        self.children.iter().find_map(|c| c.find(name))
    }
}

/// The structural tree derived from one parse.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct OutlineTree {
    pub roots: Vec<OutlineNode>,
}

impl OutlineTree {
    pub fn find(&self, name: &str) -> Option<&OutlineNode> {
        self.roots.iter().find_map(|r| r.find(name))
    }

    /// Foldable regions: the spans of every node, depth-first. The editor
    /// surface decides which of these are worth collapsing.
    pub fn fold_spans(&self) -> Vec<Span> {
        fn walk(node: &OutlineNode, out: &mut Vec<Span>) {
            out.push(node.span);
            for child in &node.children {
                walk(child, out);
            }
        }
        let mut out = Vec::new();
        for root in &self.roots {
            walk(root, &mut out);
        }
        out
    }

    pub fn node_count(&self) -> usize {
        fn count(node: &OutlineNode) -> usize {
            1 + node.children.iter().map(count).sum::<usize>()
        }
        self.roots.iter().map(count).sum()
    }
}

/// What a pipeline run produced.
///
/// `cancelled` tags a partial run that observed its cancellation token and
/// stopped early; the scheduler never delivers such output, so consumers
/// only ever see complete results.
#[derive(Debug, Default)]
pub struct PipelineOutput {
    pub tokens: Vec<Token>,
    pub tree: OutlineTree,
    pub errors: Vec<ParseError>,
    pub cancelled: bool,
}

impl PipelineOutput {
    /// Marks output as a partial, cancelled run.
    pub fn cancelled(mut self) -> Self {
        self.cancelled = true;
        self
    }
}

/// A delivered parse: everything a subscriber needs to render outline
/// regions and error squiggles for one snapshot version.
#[derive(Debug)]
pub struct ParseResult {
    pub document: DocumentId,
    pub version: u64,
    pub tokens: Arc<[Token]>,
    pub tree: OutlineTree,
    pub errors: Vec<ParseError>,
    pub elapsed: Duration,
}

/// A language backend: deterministic snapshot → output transformation.
///
/// Implementations must be side-effect free, must recover from syntax
/// errors rather than abort, and should poll `cancel` at top-level grammar
/// boundaries so cancellation latency stays bounded.
pub trait ParsePipeline: Send + Sync {
    /// Content type this pipeline understands (`"java"`, `"php"`).
    fn content_type(&self) -> &'static str;

    fn parse(&self, snapshot: &Snapshot, cancel: &CancellationToken) -> PipelineOutput;
}

#[cfg(test)]
mod tests {
    use super::*;

    fn node(kind: OutlineKind, name: &str, span: Span) -> OutlineNode {
        OutlineNode::new(kind, Some(name.to_string()), span)
    }

    #[test]
    fn find_walks_depth_first() {
        let mut class = node(OutlineKind::Class, "A", Span::new(0, 30));
        class.children.push(node(OutlineKind::Method, "f", Span::new(10, 20)));
        let tree = OutlineTree { roots: vec![class] };

        assert_eq!(tree.find("A").map(|n| n.kind), Some(OutlineKind::Class));
        assert_eq!(tree.find("f").map(|n| n.kind), Some(OutlineKind::Method));
        assert!(tree.find("g").is_none());
    }

    #[test]
    fn fold_spans_cover_nested_nodes() {
        let mut class = node(OutlineKind::Class, "A", Span::new(0, 30));
        class.children.push(node(OutlineKind::Method, "f", Span::new(10, 20)));
        let tree = OutlineTree { roots: vec![class] };

        let spans = tree.fold_spans();
        assert_eq!(spans, vec![Span::new(0, 30), Span::new(10, 20)]);
        assert!(spans[0].contains(spans[1]));
        assert_eq!(tree.node_count(), 2);
    }

    #[test]
    fn span_merge_and_contains() {
        let a = Span::new(2, 5);
        let b = Span::new(4, 9);
        assert_eq!(a.merge(b), Span::new(2, 9));
        assert!(a.merge(b).contains(a));
        assert!(!a.contains(b));
    }
}
