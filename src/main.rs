use std::path::PathBuf;
use std::sync::Arc;

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use serde::Serialize;

use promrag::{bootstrap, init_logging, sample, Embedder, RagConfig, StubEmbedder};

#[derive(Parser)]
#[command(name = "promrag")]
#[command(about = "Metric catalog and retrieval engine for PromQL generation")]
#[command(version)]
struct Cli {
    /// YAML configuration file (defaults are used when omitted)
    #[arg(short, long, global = true)]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Load the reference metrics into the catalog
    Seed,
    /// List every metric, ordered by name
    List,
    /// Substring search over metric names and descriptions
    Search {
        text: String,
        #[arg(short = 'k', long)]
        top_k: Option<usize>,
    },
    /// Embed the text and run a similarity search, falling back to text search
    Retrieve {
        text: String,
        #[arg(short = 'k', long)]
        top_k: Option<usize>,
        #[arg(short, long)]
        threshold: Option<f32>,
    },
    /// Show one metric with its labels and templates
    Show { name: String },
    /// Delete a metric and everything attached to it
    Delete { name: String },
}

fn print_json<T: Serialize>(value: &T) -> Result<()> {
    println!("{}", serde_json::to_string_pretty(value)?);
    Ok(())
}

fn main() -> Result<()> {
    let cli = Cli::parse();

    let mut config = match &cli.config {
        Some(path) => RagConfig::from_file(path)
            .with_context(|| format!("loading config from {}", path.display()))?,
        None => RagConfig::default(),
    };
    config.apply_env_overrides()?;
    init_logging(&config.logging);

    let embedder = Arc::new(StubEmbedder::new(config.store.dimension));
    let retriever = bootstrap(&config, Some(embedder.clone() as Arc<dyn Embedder>))
        .context("opening metric catalog")?;

    match cli.command {
        Commands::Seed => {
            let ids = sample::seed_sample_catalog(&retriever, embedder.as_ref())?;
            print_json(&ids)?;
        }
        Commands::List => print_json(&retriever.list_all()?)?,
        Commands::Search { text, top_k } => {
            let top_k = top_k.unwrap_or(config.search.top_k);
            print_json(&retriever.search_by_text(&text, top_k)?)?;
        }
        Commands::Retrieve {
            text,
            top_k,
            threshold,
        } => {
            let hits = retriever.retrieve(
                &text,
                top_k.unwrap_or(config.search.top_k),
                threshold.unwrap_or(config.search.threshold),
            )?;
            print_json(&hits)?;
        }
        Commands::Show { name } => match retriever.get_by_name(&name)? {
            Some(metric) => print_json(&metric)?,
            None => anyhow::bail!("metric '{name}' not found"),
        },
        Commands::Delete { name } => {
            let metric = retriever
                .get_by_name(&name)?
                .with_context(|| format!("metric '{name}' not found"))?;
            let deleted = retriever.delete_metric(metric.id)?;
            print_json(&serde_json::json!({ "name": name, "id": metric.id, "deleted": deleted }))?;
        }
    }

    retriever.close()?;
    Ok(())
}
