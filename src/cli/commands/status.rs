use anyhow::Result;
use console::style;

use crate::cli::output::{StatusInfo, get_formatter};
use crate::client::DaemonClient;
use crate::models::{Config, OutputFormat, VectorDriver};

pub async fn handle_status(format: OutputFormat, _verbose: bool) -> Result<()> {
    let config = Config::load()?;
    let formatter = get_formatter(format);

    let client = DaemonClient::new(&config);
    let workspace = if client.is_running() {
        client.status().await.ok()
    } else {
        None
    };

    let status = StatusInfo {
        daemon_running: workspace.is_some(),
        socket_path: client.socket_path().display().to_string(),
        workspace,
    };
    print!("{}", formatter.format_status(&status));

    match &status.workspace {
        None => {
            eprintln!();
            eprintln!(
                "{} daemon not running. It starts automatically on the first command.",
                style("Hint:").yellow()
            );
            eprintln!("      Or start it with: nbindex serve");
        }
        Some(ws) if !ws.backend_healthy && ws.driver == VectorDriver::Qdrant => {
            eprintln!();
            eprintln!(
                "{} Qdrant not reachable at {}",
                style("Warning:").red(),
                config.vector_store.url
            );
        }
        Some(_) => {}
    }

    Ok(())
}
