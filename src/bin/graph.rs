//! Dependency Graph CLI
//!
//! Builds the dependency graph of an XSD (or a directory of them) and prints
//! it as text, GraphViz DOT or a JSON report.

use anyhow::{bail, Context};
use clap::{Parser, ValueEnum};
use std::path::PathBuf;
use tracing::info;
use tracing_subscriber::EnvFilter;
use xsd_helper::config::GraphFormat;
use xsd_helper::{CyclePolicy, DependencyVisitor, HelperConfig, SchemaLoader, TopologicalSorter};

#[derive(Parser)]
#[command(name = "xsd-graph")]
#[command(about = "Export the dependency graph of an XSD bundle")]
struct Cli {
    /// Schema file or directory of schema files
    #[arg(short, long)]
    source: PathBuf,

    /// Output file (defaults to stdout)
    #[arg(short, long)]
    output: Option<PathBuf>,

    /// Output format; overrides the configured one
    #[arg(short, long, value_enum)]
    format: Option<FormatArg>,

    /// Fail when the graph contains a cycle
    #[arg(long)]
    strict: bool,

    /// Element names to leave out of the graph (repeatable)
    #[arg(short, long = "ignore")]
    ignore: Vec<String>,

    /// Configuration file
    #[arg(short, long)]
    config: Option<String>,
}

#[derive(Clone, Copy, ValueEnum)]
enum FormatArg {
    Text,
    Dot,
    Json,
}

impl From<FormatArg> for GraphFormat {
    fn from(arg: FormatArg) -> Self {
        match arg {
            FormatArg::Text => GraphFormat::Text,
            FormatArg::Dot => GraphFormat::Dot,
            FormatArg::Json => GraphFormat::Json,
        }
    }
}

fn main() {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env())
        .with_writer(std::io::stderr)
        .init();

    let cli = Cli::parse();

    if let Err(e) = run(cli) {
        eprintln!("Error: {:#}", e);
        std::process::exit(1);
    }
}

fn run(cli: Cli) -> anyhow::Result<()> {
    let config = HelperConfig::load_from(cli.config.as_deref()).context("Failed to load configuration")?;

    let mut loader = SchemaLoader::new(config.load_config());
    if cli.source.is_dir() {
        loader.load_directory(&cli.source)?;
    } else if cli.source.is_file() {
        loader.load_file(&cli.source)?;
    } else {
        bail!("Missing source specified: '{}'", cli.source.display());
    }
    if loader.document_count() == 0 {
        bail!("No schema files found in '{}'", cli.source.display());
    }
    let schema = loader.finish()?;

    let graph = DependencyVisitor::new(&schema)
        .with_skip(config.export.skip.iter().cloned().chain(cli.ignore))
        .run()?;
    info!(
        nodes = graph.nodes().len(),
        edges = graph.edges().len(),
        "Dependency graph built"
    );

    let policy = if cli.strict {
        CyclePolicy::Fail
    } else {
        config.cycle_policy()
    };
    TopologicalSorter::with_policy(policy)
        .run(graph.edges())
        .context("Dependency graph is not acyclic")?;

    let format = cli.format.map(GraphFormat::from).unwrap_or(config.graph.format);
    let content = match format {
        GraphFormat::Text => graph.to_text(),
        GraphFormat::Dot => graph.to_dot(),
        GraphFormat::Json => {
            let report = graph.report(&schema.bundle_hash);
            let mut json = serde_json::to_string_pretty(&report)?;
            json.push('\n');
            json
        }
    };

    match cli.output {
        Some(path) => {
            std::fs::write(&path, &content)
                .with_context(|| format!("Cannot write '{}'", path.display()))?;
            println!("✅ Exported graph to: {}", path.display());
        }
        None => print!("{}", content),
    }

    Ok(())
}
