//! XPath Export CLI
//!
//! Loads an XSD (with its includes and imports) and writes one CSV row per
//! element and attribute reachable from a root element.

use anyhow::{bail, Context};
use clap::Parser;
use std::fs::{self, File};
use std::io::BufWriter;
use std::path::PathBuf;
use tracing_subscriber::EnvFilter;
use xsd_helper::export::{loaded_schemas, suggest_roots};
use xsd_helper::{
    extract_xpaths, AttributeLayout, HelperConfig, ReferenceKind, SchemaLoader, XsdError,
};

#[derive(Parser)]
#[command(name = "xsd-xpaths")]
#[command(about = "Extract the XPath of every element in an XSD into a CSV file")]
#[command(
    after_help = "Example: xsd-xpaths -s Source.xsd -t XPaths.csv -i MetaData -i Error -a annotation:deprecated"
)]
struct Cli {
    /// The source xsd file to generate the XPaths from
    #[arg(short, long)]
    source: PathBuf,

    /// The target csv file for the extracted XPaths
    #[arg(short, long)]
    target: PathBuf,

    /// Root element to start from; defaults to the first root node found
    #[arg(short, long)]
    root: Option<String>,

    /// Element to ignore, with everything below it (repeatable)
    #[arg(short, long = "ignore")]
    ignore: Vec<String>,

    /// Additional attribute to extract from each element (repeatable)
    #[arg(short, long = "add")]
    add: Vec<String>,

    /// Give attribute rows the same columns as element rows
    #[arg(long)]
    unified_attributes: bool,

    /// Configuration file
    #[arg(short, long)]
    config: Option<String>,
}

fn main() {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env())
        .init();

    let cli = Cli::parse();

    if let Err(e) = run(cli) {
        eprintln!("Error: {:#}", e);
        std::process::exit(1);
    }
}

fn run(cli: Cli) -> anyhow::Result<()> {
    let config = HelperConfig::load_from(cli.config.as_deref()).context("Failed to load configuration")?;

    if !cli.source.is_file() {
        bail!("Missing source file specified: '{}'", cli.source.display());
    }
    if let Some(dir) = cli.target.parent().filter(|d| !d.as_os_str().is_empty()) {
        if !dir.is_dir() {
            bail!("Missing target directory specified: '{}'", dir.display());
        }
    }
    if let Ok(metadata) = fs::metadata(&cli.target) {
        if metadata.permissions().readonly() {
            bail!(
                "Target file '{}' is read only. Please make it writable.",
                cli.target.display()
            );
        }
    }

    println!("Loading schemas...");
    let mut loader = SchemaLoader::new(config.load_config());
    loader.load_file(&cli.source)?;
    let schema = loader.finish()?;

    let listing = loaded_schemas(&schema);
    println!("{} files loaded", listing.len());
    for (file, namespace) in &listing {
        println!("File: {}, Namespace: {}", file, namespace);
    }

    let mut options = config.export_options();
    if cli.root.is_some() {
        options.root = cli.root.clone();
    }
    options.skip.extend(cli.ignore);
    options.extract.extend(cli.add);
    if cli.unified_attributes {
        options.attribute_layout = AttributeLayout::Unified;
    }

    let file = File::create(&cli.target)
        .with_context(|| format!("Cannot create '{}'", cli.target.display()))?;

    match extract_xpaths(&schema, &options, BufWriter::new(file)) {
        Ok(summary) => {
            if options.root.is_none() {
                println!("Automatically selecting: {} as the root node", summary.root);
            }
            println!("✅ {} XPaths written to {}", summary.records, cli.target.display());
            Ok(())
        }
        Err(XsdError::UnresolvedReference {
            kind: ReferenceKind::Root,
            name,
        }) => {
            let suggestions = suggest_roots(&schema, &name, 5);
            if suggestions.is_empty() {
                bail!(
                    "Unable to find a root node {}. Please supply a properly qualified node name.",
                    name
                );
            }
            bail!(
                "Unable to find a root node {}. Did you mean: {}?",
                name,
                suggestions.join(", ")
            );
        }
        Err(e) => Err(e.into()),
    }
}
