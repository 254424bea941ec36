//! Source command implementation.

use std::path::PathBuf;

use anyhow::{Context, Result};
use clap::Subcommand;
use indicatif::{ProgressBar, ProgressStyle};

use crate::cli::commands::{confirm, resolve_project};
use crate::cli::output::get_formatter;
use crate::client::DaemonClient;
use crate::models::{Config, OutputFormat, SourceOrigin};
use crate::utils::file::MAX_SOURCE_FILE_BYTES;
use crate::utils::{collect_text_files, file_title, read_file_content};

#[derive(Debug, Subcommand)]
pub enum SourceCommand {
    /// List the sources of a project
    List {
        #[arg(long, short = 'p')]
        project: Option<String>,
    },

    /// Add text files (or every text file under a directory) as sources
    Add {
        #[arg(required = true)]
        path: PathBuf,

        #[arg(long, short = 'p')]
        project: Option<String>,

        /// Title for a single-file source (defaults to the file name)
        #[arg(long)]
        title: Option<String>,
    },

    /// Remove a source by id
    Remove {
        #[arg(required = true)]
        source_id: String,

        #[arg(long, short = 'p')]
        project: Option<String>,
    },

    /// Remove every source and the index of a project
    Clear {
        #[arg(long, short = 'p')]
        project: Option<String>,

        /// Skip confirmation prompt
        #[arg(long, short = 'y')]
        force: bool,
    },
}

pub async fn handle_source(cmd: SourceCommand, format: OutputFormat, verbose: bool) -> Result<()> {
    let config = Config::load()?;
    let formatter = get_formatter(format);
    let client = DaemonClient::new(&config);

    match cmd {
        SourceCommand::List { project } => {
            let project = resolve_project(&config, project);
            let sources = client.list_sources(&project).await?;
            print!("{}", formatter.format_sources(&sources));
        }
        SourceCommand::Add {
            path,
            project,
            title,
        } => {
            let project = resolve_project(&config, project);
            let path = std::path::absolute(&path)
                .with_context(|| format!("invalid path {}", path.display()))?;
            if !path.exists() {
                anyhow::bail!("path not found: {}", path.display());
            }

            let files = collect_text_files(&path);
            if files.is_empty() {
                anyhow::bail!("no text files found at {}", path.display());
            }

            let pb = ProgressBar::new(files.len() as u64);
            pb.set_style(
                ProgressStyle::default_bar()
                    .template("{spinner:.green} [{elapsed_precise}] [{bar:40.cyan/blue}] {pos}/{len}")
                    .context("invalid progress template")?
                    .progress_chars("#>-"),
            );

            let single = files.len() == 1;
            let mut added = Vec::new();
            let mut skipped = 0usize;
            for file in files {
                pb.inc(1);
                let text = match read_file_content(&file, MAX_SOURCE_FILE_BYTES) {
                    Ok(text) => text,
                    Err(e) => {
                        skipped += 1;
                        if verbose {
                            pb.println(format!("skip {}: {e}", file.display()));
                        }
                        continue;
                    }
                };
                let source_title = match (&title, single) {
                    (Some(t), true) => t.clone(),
                    _ => file_title(&file),
                };
                let origin = SourceOrigin::File(file.display().to_string());
                added.push(client.add_source(&project, origin, source_title, text).await?);
            }
            pb.finish_and_clear();

            print!("{}", formatter.format_sources(&added));
            if skipped > 0 {
                eprintln!("Skipped {skipped} unreadable file(s)");
            }
        }
        SourceCommand::Remove { source_id, project } => {
            let project = resolve_project(&config, project);
            client.remove_source(&project, &source_id).await?;
            println!(
                "{}",
                formatter.format_message(&format!("Removed source {source_id} from {project}"))
            );
        }
        SourceCommand::Clear { project, force } => {
            let project = resolve_project(&config, project);
            if !force && !confirm(&format!("Remove every source of {project}?"))? {
                println!("{}", formatter.format_message("Cancelled."));
                return Ok(());
            }
            let removed = client.clear_project(&project).await?;
            println!(
                "{}",
                formatter.format_message(&format!("Removed {removed} source(s) from {project}"))
            );
        }
    }

    Ok(())
}
