use std::fs;
use std::path::Path;
use std::sync::Arc;

use tokio_util::sync::CancellationToken;

use treeline_core::{
    DocumentBuffer, OutlineNode, Snapshot, StaticNameResolver, TracingDiagnostics,
};

use crate::OutputFormat;

pub(crate) fn run(
    path: &Path,
    format: OutputFormat,
) -> Result<(), Box<dyn std::error::Error>> {
    let content_type = crate::content_type_of(path)?;
    let text = fs::read_to_string(path)?;

    let registry = crate::default_registry(
        Arc::new(StaticNameResolver::new()),
        Arc::new(TracingDiagnostics),
    );
    let pipeline = registry.pipeline_for(content_type)?;

    let buffer = DocumentBuffer::new(content_type, text);
    let snapshot = buffer.current();
    let output = pipeline.parse(&snapshot, &CancellationToken::new());

    match format {
        OutputFormat::Json => {
            let report = serde_json::json!({
                "file": path.display().to_string(),
                "content_type": content_type,
                "outline": output.tree,
                "errors": output.errors,
            });
            println!("{}", serde_json::to_string_pretty(&report)?);
        }
        OutputFormat::Text => {
            for root in &output.tree.roots {
                print_node(root, 0, &snapshot);
            }
            if !output.errors.is_empty() {
                println!();
            }
            for error in &output.errors {
                let (line, col) = snapshot.line_col(error.span.start);
                println!("{}({line}:{col}): {}", path.display(), error.message);
            }
        }
    }
    Ok(())
}

fn print_node(node: &OutlineNode, depth: usize, snapshot: &Snapshot) {
    let (line, _) = snapshot.line_col(node.span.start);
    let name = node.name.as_deref().unwrap_or("<anonymous>");
    println!(
        "{:indent$}{} {} (line {line})",
        "",
        node.kind.name(),
        name,
        indent = depth * 2
    );
    for child in &node.children {
        print_node(child, depth + 1, snapshot);
    }
}
