use std::fs;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use notify::{Config, Event, RecommendedWatcher, RecursiveMode, Watcher as NotifyWatcher};
use tokio::sync::mpsc;
use tracing::{info, warn};

use treeline_core::{DocumentBuffer, StaticNameResolver, TracingDiagnostics};

/// Filesystem watcher bridged onto a tokio channel.
struct Watcher {
    // Keep watcher alive
    _watcher: RecommendedWatcher,
    rx: mpsc::UnboundedReceiver<notify::Result<Event>>,
}

impl Watcher {
    fn new(root: &Path) -> notify::Result<Self> {
        let (tx, rx) = mpsc::unbounded_channel();

        let mut watcher = RecommendedWatcher::new(
            move |res| {
                let _ = tx.send(res);
            },
            Config::default(),
        )?;

        // Editors save by rename, so watch the directory rather than the
        // file's own inode.
        watcher.watch(root, RecursiveMode::NonRecursive)?;

        Ok(Self {
            _watcher: watcher,
            rx,
        })
    }
}

pub(crate) async fn run(path: PathBuf) -> Result<(), Box<dyn std::error::Error>> {
    let content_type = crate::content_type_of(&path)?;
    let text = fs::read_to_string(&path)?;

    let buffer = DocumentBuffer::new(content_type, text);
    let resolver = Arc::new(StaticNameResolver::new());
    resolver.insert(buffer.id(), path.display().to_string());

    let registry = crate::default_registry(resolver, Arc::new(TracingDiagnostics));
    let parser = registry.scheduler_for(&buffer)?;

    let subscription = parser.subscribe(|result| {
        println!(
            "v{}: {} nodes, {} errors ({:?})",
            result.version,
            result.tree.node_count(),
            result.errors.len(),
            result.elapsed,
        );
    });

    let parent = path.parent().filter(|p| !p.as_os_str().is_empty());
    let mut watcher = Watcher::new(parent.unwrap_or(Path::new(".")))?;
    let file_name = path.file_name().map(|n| n.to_owned());

    parser.request_reparse();
    info!(file = %path.display(), "watching; press Ctrl+C to stop");

    loop {
        tokio::select! {
            _ = tokio::signal::ctrl_c() => break,
            event = watcher.rx.recv() => {
                let event = match event {
                    Some(Ok(event)) => event,
                    Some(Err(error)) => {
                        warn!(%error, "watch error");
                        continue;
                    }
                    None => break,
                };
                let ours = event
                    .paths
                    .iter()
                    .any(|p| p.file_name() == file_name.as_deref());
                if !ours {
                    continue;
                }
                // Saves arrive as several events; a failed read mid-save
                // just waits for the next one.
                match fs::read_to_string(&path) {
                    Ok(text) => {
                        buffer.edit(text);
                        parser.request_reparse();
                    }
                    Err(error) => warn!(%error, "skipping unreadable snapshot"),
                }
            }
        }
    }

    parser.unsubscribe(subscription);
    registry.close_all().await;
    info!("watcher stopped");
    Ok(())
}
