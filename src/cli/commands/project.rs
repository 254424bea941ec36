//! Project management and bundle export/import.

use std::path::PathBuf;

use anyhow::{Context, Result};
use clap::Subcommand;

use crate::cli::commands::{confirm, resolve_project};
use crate::cli::output::get_formatter;
use crate::client::DaemonClient;
use crate::models::{Config, ImportMode, OutputFormat};

#[derive(Debug, Subcommand)]
pub enum ProjectCommand {
    /// List projects
    List,

    /// Create a project
    Create {
        /// Display name (defaults to "Project N")
        #[arg(default_value = "")]
        name: String,
    },

    /// Delete a project, its sources and its index
    Delete {
        #[arg(required = true)]
        project: String,

        /// Skip confirmation prompt
        #[arg(long, short = 'y')]
        force: bool,
    },

    /// Write a project bundle (zip) to a file
    Export {
        /// Output file
        #[arg(required = true)]
        output: PathBuf,

        #[arg(long, short = 'p', conflicts_with = "all")]
        project: Option<String>,

        /// Export every project into one workspace bundle
        #[arg(long)]
        all: bool,

        /// Include the vector collection so the bundle is searchable without a rebuild
        #[arg(long)]
        with_vectors: bool,
    },

    /// Load a project bundle
    Import {
        /// Bundle file
        #[arg(required = true)]
        input: PathBuf,

        /// merge (append sources) or replace (overwrite the project)
        #[arg(long, short = 'm', default_value = "merge")]
        mode: ImportMode,

        /// Existing project to import into (defaults to the bundle's project)
        #[arg(long, short = 't', conflicts_with = "all")]
        target: Option<String>,

        /// Load a workspace bundle; with --mode replace it becomes the whole project set
        #[arg(long)]
        all: bool,

        /// Skip confirmation prompt
        #[arg(long, short = 'y')]
        force: bool,
    },
}

pub async fn handle_project(
    cmd: ProjectCommand,
    format: OutputFormat,
    verbose: bool,
) -> Result<()> {
    let config = Config::load()?;
    let formatter = get_formatter(format);
    let client = DaemonClient::new(&config);

    match cmd {
        ProjectCommand::List => {
            let projects = client.list_projects().await?;
            print!("{}", formatter.format_projects(&projects));
        }
        ProjectCommand::Create { name } => {
            let project = client.create_project(&name).await?;
            println!(
                "{}",
                formatter.format_message(&format!("Created project {} ({})", project.id, project.name))
            );
        }
        ProjectCommand::Delete { project, force } => {
            if !force && !confirm(&format!("Delete project {project} and all its sources?"))? {
                println!("{}", formatter.format_message("Cancelled."));
                return Ok(());
            }
            client.delete_project(&project).await?;
            println!(
                "{}",
                formatter.format_message(&format!("Deleted project {project}"))
            );
        }
        ProjectCommand::Export {
            output,
            project,
            all,
            with_vectors,
        } => {
            let path = std::path::absolute(&output)
                .with_context(|| format!("invalid output path {}", output.display()))?;
            if all {
                let bytes = client.export_all(path.clone(), with_vectors).await?;
                println!(
                    "{}",
                    formatter.format_message(&format!(
                        "Exported all projects to {} ({bytes} bytes)",
                        path.display()
                    ))
                );
                return Ok(());
            }
            let project = resolve_project(&config, project);
            let bytes = client.export(&project, path.clone(), with_vectors).await?;
            println!(
                "{}",
                formatter.format_message(&format!(
                    "Exported {project} to {} ({bytes} bytes)",
                    path.display()
                ))
            );
        }
        ProjectCommand::Import {
            input,
            mode,
            target,
            all,
            force,
        } => {
            let path = std::path::absolute(&input)
                .with_context(|| format!("invalid bundle path {}", input.display()))?;
            if !path.is_file() {
                anyhow::bail!("bundle not found: {}", path.display());
            }
            if verbose {
                eprintln!("Importing {} ({mode})", path.display());
            }
            if all {
                if mode == ImportMode::Replace
                    && !force
                    && !confirm("Replace every project with the bundle contents?")?
                {
                    println!("{}", formatter.format_message("Cancelled."));
                    return Ok(());
                }
                let summary = client.import_all(path, mode).await?;
                print!("{}", formatter.format_workspace_import(&summary));
                return Ok(());
            }
            let summary = client.import(path, mode, target).await?;
            print!("{}", formatter.format_import_summary(&summary));
        }
    }

    Ok(())
}
