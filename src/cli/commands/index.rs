//! Index command implementation.

use std::time::Duration;

use anyhow::{Context, Result};
use clap::Args;
use indicatif::{ProgressBar, ProgressStyle};

use crate::cli::commands::resolve_project;
use crate::cli::output::get_formatter;
use crate::client::DaemonClient;
use crate::models::{Config, OutputFormat};

#[derive(Debug, Args)]
pub struct IndexArgs {
    #[arg(long, short = 'p')]
    pub project: Option<String>,

    /// Schedule the rebuild and return immediately
    #[arg(long)]
    pub no_wait: bool,
}

pub async fn handle_index(args: IndexArgs, format: OutputFormat, _verbose: bool) -> Result<()> {
    let config = Config::load()?;
    let formatter = get_formatter(format);
    let client = DaemonClient::new(&config);
    let project = resolve_project(&config, args.project);

    if args.no_wait {
        client.trigger_reindex(&project).await?;
        println!(
            "{}",
            formatter.format_message(&format!("Reindex of {project} scheduled"))
        );
        return Ok(());
    }

    let spinner = ProgressBar::new_spinner();
    spinner.set_style(
        ProgressStyle::default_spinner()
            .template("{spinner:.green} [{elapsed_precise}] {msg}")
            .context("invalid progress template")?,
    );
    spinner.set_message(format!("Indexing {project}"));
    spinner.enable_steady_tick(Duration::from_millis(100));

    let result = client.reindex(&project).await;
    spinner.finish_and_clear();

    let report = result.with_context(|| format!("failed to index {project}"))?;
    print!("{}", formatter.format_index_report(&report));
    Ok(())
}
