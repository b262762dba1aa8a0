//! Collaborator seams the scheduler reports through.
//!
//! Both traits are deliberately tiny so hosts can adapt whatever surface
//! they have (an output pane, an LSP log, a test collector). Failures to
//! log are non-fatal by contract; implementations swallow their own errors.

use std::collections::HashMap;
use std::sync::Mutex;

use crate::document::DocumentId;

/// Shown when the identity resolver has no name for a document.
pub const UNKNOWN_DOCUMENT: &str = "<unknown>";

/// Write-only, line-oriented diagnostics surface.
pub trait DiagnosticsSink: Send + Sync {
    fn write_line(&self, document: DocumentId, line: &str);
}

/// Resolves a document to a stable display name (usually a file path).
pub trait DocumentNameResolver: Send + Sync {
    fn display_name(&self, document: DocumentId) -> Option<String>;

    /// Name with the `<unknown>` fallback applied.
    fn display_name_or_unknown(&self, document: DocumentId) -> String {
        self.display_name(document)
            .unwrap_or_else(|| UNKNOWN_DOCUMENT.to_string())
    }
}

/// Default sink: forwards to the tracing subscriber.
#[derive(Debug, Default)]
pub struct TracingDiagnostics;

impl DiagnosticsSink for TracingDiagnostics {
    fn write_line(&self, document: DocumentId, line: &str) {
        tracing::info!(target: "treeline::diagnostics", %document, "{line}");
    }
}

/// Simple map-backed resolver for hosts that register names up front.
#[derive(Default)]
pub struct StaticNameResolver {
    names: Mutex<HashMap<DocumentId, String>>,
}

impl StaticNameResolver {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(&self, document: DocumentId, name: impl Into<String>) {
        if let Ok(mut names) = self.names.lock() {
            names.insert(document, name.into());
        }
    }

    pub fn remove(&self, document: DocumentId) {
        if let Ok(mut names) = self.names.lock() {
            names.remove(&document);
        }
    }
}

impl DocumentNameResolver for StaticNameResolver {
    fn display_name(&self, document: DocumentId) -> Option<String> {
        self.names.lock().ok()?.get(&document).cloned()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::document::DocumentBuffer;

    #[test]
    fn resolver_falls_back_to_placeholder() {
        let buffer = DocumentBuffer::new("java", "");
        let resolver = StaticNameResolver::new();
        assert_eq!(
            resolver.display_name_or_unknown(buffer.id()),
            UNKNOWN_DOCUMENT
        );

        resolver.insert(buffer.id(), "src/A.java");
        assert_eq!(resolver.display_name_or_unknown(buffer.id()), "src/A.java");

        resolver.remove(buffer.id());
        assert_eq!(
            resolver.display_name_or_unknown(buffer.id()),
            UNKNOWN_DOCUMENT
        );
    }
}
