//! Command-line interface for the project retrieval index.

pub mod commands;
pub mod output;

use clap::{Parser, Subcommand};

use crate::models::OutputFormat;

/// Project-scoped semantic retrieval over notebook sources.
#[derive(Debug, Parser)]
#[command(name = "nbindex")]
#[command(author, version, about, long_about = None)]
#[command(propagate_version = true)]
pub struct Cli {
    #[arg(
        long,
        short = 'f',
        global = true,
        help = "Output format: text, json, or markdown"
    )]
    pub format: Option<OutputFormat>,

    #[arg(long, short = 'v', global = true, help = "Enable verbose output")]
    pub verbose: bool,

    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Debug, Subcommand)]
pub enum Commands {
    /// Show daemon, embedding and per-project index status
    Status,

    /// Run or control the background daemon
    Serve(commands::ServeArgs),

    /// Manage projects and project bundles
    #[command(subcommand)]
    Project(commands::ProjectCommand),

    /// Manage the sources of a project
    #[command(subcommand)]
    Source(commands::SourceCommand),

    /// Rebuild a project's vector index
    Index(commands::IndexArgs),

    /// Search a project's index
    Search(commands::SearchArgs),

    /// Manage configuration
    #[command(subcommand)]
    Config(commands::ConfigCommand),
}
