use std::time::Instant;

use anyhow::{Context, Result};
use clap::Args;

use crate::cli::commands::resolve_project;
use crate::cli::output::get_formatter;
use crate::client::DaemonClient;
use crate::models::{Config, OutputFormat, SearchQuery};

#[derive(Debug, Args)]
pub struct SearchArgs {
    #[arg(required = true, help = "Search query text")]
    pub query: String,

    #[arg(long, short = 'p', help = "Project to search (defaults to the default project)")]
    pub project: Option<String>,

    #[arg(long, short = 'k', help = "Maximum number of results to return")]
    pub top_k: Option<u32>,

    #[arg(long, help = "Minimum similarity score threshold (-1.0 to 1.0)")]
    pub min_score: Option<f32>,
}

pub async fn handle_search(args: SearchArgs, format: OutputFormat, verbose: bool) -> Result<()> {
    let query = args.query.trim();
    if query.is_empty() {
        anyhow::bail!("search query cannot be empty");
    }
    if args.top_k == Some(0) {
        anyhow::bail!("top-k must be at least 1");
    }
    if let Some(score) = args.min_score {
        if !(-1.0..=1.0).contains(&score) {
            anyhow::bail!("min_score must be between -1.0 and 1.0");
        }
    }

    let config = Config::load()?;
    let formatter = get_formatter(format);
    let client = DaemonClient::new(&config);
    let project = resolve_project(&config, args.project);

    let mut search = SearchQuery::new(project.as_str(), query);
    if let Some(k) = args.top_k {
        search = search.with_top_k(k);
    }
    if let Some(score) = args.min_score {
        search = search.with_min_score(score);
    }

    if verbose {
        eprintln!("Query: \"{query}\"");
        eprintln!("  Project: {project}");
        if let Some(k) = search.top_k {
            eprintln!("  Top-k: {k}");
        }
        if let Some(score) = search.min_score {
            eprintln!("  Min score: {score:.3}");
        }
    }

    let start = Instant::now();
    let results = client.search(search).await.context("search failed")?;

    if verbose {
        eprintln!("Timing:");
        eprintln!("  Daemon: {}ms", results.duration_ms);
        eprintln!("  Total: {}ms", start.elapsed().as_millis());
        eprintln!();
    }

    print!("{}", formatter.format_search_results(&results));
    Ok(())
}
