//! Documents, immutable snapshots, and the change-notification stream.
//!
//! A [`DocumentBuffer`] is the editor-facing side of a single open text
//! buffer: it hands out cheap [`Snapshot`] clones (readers never block
//! writers) and signals a watch channel on every edit. Snapshots are the
//! unit of cancellation comparison for the background parser: a parse is
//! relevant exactly as long as its snapshot is still the latest version.

use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};

use tokio::sync::watch;

static NEXT_DOCUMENT_ID: AtomicU64 = AtomicU64::new(1);

/// Stable identity of one open text buffer.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct DocumentId(u64);

impl DocumentId {
    fn next() -> Self {
        DocumentId(NEXT_DOCUMENT_ID.fetch_add(1, Ordering::Relaxed))
    }

    pub fn as_u64(&self) -> u64 {
        self.0
    }
}

impl std::fmt::Display for DocumentId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "doc#{}", self.0)
    }
}

/// Immutable, versioned view of a document's text at one point in time.
///
/// Never mutated after creation; a new edit always produces a new snapshot
/// with a strictly higher version. Safe to share across threads freely.
#[derive(Debug)]
pub struct Snapshot {
    document: DocumentId,
    version: u64,
    text: Arc<str>,
}

impl Snapshot {
    pub fn document(&self) -> DocumentId {
        self.document
    }

    pub fn version(&self) -> u64 {
        self.version
    }

    pub fn text(&self) -> &str {
        &self.text
    }

    pub fn len(&self) -> usize {
        self.text.len()
    }

    pub fn is_empty(&self) -> bool {
        self.text.is_empty()
    }

    /// 0-based (line, column) of a byte offset, for diagnostics lines.
    ///
    /// Offsets past the end clamp to the last position.
    pub fn line_col(&self, offset: usize) -> (usize, usize) {
        let offset = offset.min(self.text.len());
        let prefix = &self.text[..offset];
        let line = prefix.bytes().filter(|b| *b == b'\n').count();
        let col = prefix.len() - prefix.rfind('\n').map(|i| i + 1).unwrap_or(0);
        (line, col)
    }
}

/// An open text buffer: the current snapshot plus a change stream.
///
/// This is the "change-notification source" collaborator of the background
/// parser. `edit` installs a new snapshot and wakes every receiver returned
/// by `changes`; it never blocks on readers and readers never observe a
/// half-applied edit.
pub struct DocumentBuffer {
    id: DocumentId,
    content_type: String,
    current: std::sync::RwLock<Arc<Snapshot>>,
    changed_tx: watch::Sender<u64>,
}

impl DocumentBuffer {
    pub fn new(content_type: impl Into<String>, initial_text: impl Into<Arc<str>>) -> Arc<Self> {
        let id = DocumentId::next();
        let snapshot = Arc::new(Snapshot {
            document: id,
            version: 1,
            text: initial_text.into(),
        });
        let (changed_tx, _) = watch::channel(snapshot.version);
        Arc::new(Self {
            id,
            content_type: content_type.into(),
            current: std::sync::RwLock::new(snapshot),
            changed_tx,
        })
    }

    pub fn id(&self) -> DocumentId {
        self.id
    }

    pub fn content_type(&self) -> &str {
        &self.content_type
    }

    /// Latest snapshot; an `Arc` clone, cheap to call from any thread.
    pub fn current(&self) -> Arc<Snapshot> {
        match self.current.read() {
            Ok(guard) => Arc::clone(&guard),
            Err(poisoned) => Arc::clone(&poisoned.into_inner()),
        }
    }

    /// Replaces the full text, producing the next snapshot version.
    ///
    /// Returns the new snapshot and signals the change stream. Edits are
    /// full-text by design: incremental deltas are a buffer-implementation
    /// concern the parse engine never sees.
    pub fn edit(&self, new_text: impl Into<Arc<str>>) -> Arc<Snapshot> {
        let snapshot = {
            let mut guard = match self.current.write() {
                Ok(guard) => guard,
                Err(poisoned) => poisoned.into_inner(),
            };
            let next = Arc::new(Snapshot {
                document: self.id,
                version: guard.version + 1,
                text: new_text.into(),
            });
            *guard = Arc::clone(&next);
            next
        };
        // Receivers only care that something changed; the payload is the
        // version for debugging convenience.
        let _ = self.changed_tx.send(snapshot.version);
        snapshot
    }

    /// Subscribes to edit notifications. The receiver coalesces bursts; the
    /// consumer re-reads `current()` rather than trusting the payload.
    pub fn changes(&self) -> watch::Receiver<u64> {
        self.changed_tx.subscribe()
    }
}
