mod outline;
mod watch;

use std::path::{Path, PathBuf};
use std::sync::Arc;

use clap::{Parser, Subcommand, ValueEnum};

use treeline_core::pipeline::ParsePipeline;
use treeline_core::registry::ParserRegistry;
use treeline_core::scheduler::SchedulerConfig;
use treeline_core::sink::{DiagnosticsSink, DocumentNameResolver};
use treeline_core::{Result, TreelineError};
use treeline_java::JavaPipeline;
use treeline_php::PhpPipeline;

#[derive(Parser)]
#[command(
    name = "treeline",
    version,
    about = "Background re-parse engine for editor buffers",
    long_about = "Treeline keeps a structural outline of open documents current while they are \
                  being edited. The outline command runs one parse and prints the result; the \
                  watch command keeps a document open, debounces filesystem changes, and prints \
                  every delivered parse."
)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, ValueEnum)]
pub enum OutputFormat {
    Text,
    Json,
}

#[derive(Subcommand)]
pub enum Commands {
    /// Parse a file once and print its outline and syntax errors
    Outline {
        /// Path to the source file
        #[arg(value_name = "FILE")]
        path: PathBuf,

        /// Output format
        #[arg(long, value_enum, default_value_t = OutputFormat::Text)]
        format: OutputFormat,
    },
    /// Watch a file and re-parse it in the background on every change
    Watch {
        /// Path to the source file
        #[arg(value_name = "FILE")]
        path: PathBuf,
    },
}

pub fn run() -> std::result::Result<(), Box<dyn std::error::Error>> {
    let cli = Cli::parse();
    let _guard = treeline_core::logging::init_logging("cli", true);

    let rt = tokio::runtime::Runtime::new()?;

    match cli.command {
        Commands::Outline { path, format } => outline::run(&path, format),
        Commands::Watch { path } => rt.block_on(watch::run(path)),
    }
}

/// A registry with every bundled language backend registered.
fn default_registry(
    resolver: Arc<dyn DocumentNameResolver>,
    sink: Arc<dyn DiagnosticsSink>,
) -> ParserRegistry {
    let registry = ParserRegistry::new(resolver, sink, SchedulerConfig::default());
    registry.register(
        "java",
        Arc::new(|| Arc::new(JavaPipeline::new()) as Arc<dyn ParsePipeline>),
    );
    registry.register(
        "php",
        Arc::new(|| Arc::new(PhpPipeline::new()) as Arc<dyn ParsePipeline>),
    );
    registry
}

fn content_type_of(path: &Path) -> Result<&'static str> {
    match path.extension().and_then(|e| e.to_str()) {
        Some("java") => Ok("java"),
        Some("php" | "phtml") => Ok("php"),
        _ => Err(TreelineError::Config(format!(
            "cannot infer a content type for {}",
            path.display()
        ))),
    }
}
