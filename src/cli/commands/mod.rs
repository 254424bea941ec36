mod config;
mod index;
mod project;
mod search;
mod serve;
mod source;
mod status;

pub use config::ConfigCommand;
pub use index::IndexArgs;
pub use project::ProjectCommand;
pub use search::SearchArgs;
pub use serve::ServeArgs;
pub use source::SourceCommand;

pub use config::handle_config;
pub use index::handle_index;
pub use project::handle_project;
pub use search::handle_search;
pub use serve::handle_serve;
pub use source::handle_source;
pub use status::handle_status;

use anyhow::Result;

use crate::models::Config;

/// Project named on the command line, or the configured default.
pub(crate) fn resolve_project(config: &Config, project: Option<String>) -> String {
    project.unwrap_or_else(|| config.projects.default_project_id.clone())
}

pub(crate) fn confirm(prompt: &str) -> Result<bool> {
    eprint!("{prompt} [y/N] ");
    let mut input = String::new();
    std::io::stdin().read_line(&mut input)?;
    Ok(input.trim().eq_ignore_ascii_case("y"))
}
