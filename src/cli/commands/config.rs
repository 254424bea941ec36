use anyhow::{Context, Result};
use clap::Subcommand;

use crate::cli::output::get_formatter;
use crate::models::{Config, OutputFormat};

#[derive(Debug, Subcommand)]
pub enum ConfigCommand {
    #[command(about = "Write a configuration file with default values")]
    Init {
        #[arg(long, short = 'f', help = "Force overwrite existing config")]
        force: bool,
    },
    #[command(about = "Show the effective configuration")]
    Show,
    #[command(about = "Show configuration and data paths")]
    Path,
}

pub async fn handle_config(cmd: ConfigCommand, format: OutputFormat, _verbose: bool) -> Result<()> {
    match cmd {
        ConfigCommand::Init { force } => handle_init(force, format),
        ConfigCommand::Show => handle_show(format),
        ConfigCommand::Path => handle_path(format),
    }
}

fn handle_init(force: bool, format: OutputFormat) -> Result<()> {
    let formatter = get_formatter(format);
    let config_path =
        Config::config_path().ok_or_else(|| anyhow::anyhow!("could not determine config directory"))?;

    if config_path.exists() && !force {
        anyhow::bail!(
            "Config already exists at: {}\nUse --force to overwrite.",
            config_path.display()
        );
    }

    let path = Config::default().save().context("failed to write config")?;
    println!(
        "{}",
        formatter.format_message(&format!("Created config at: {}", path.display()))
    );
    Ok(())
}

fn handle_show(format: OutputFormat) -> Result<()> {
    let mut config = Config::load()?;
    if config.vector_store.api_key.is_some() {
        config.vector_store.api_key = Some("********".to_string());
    }

    if format == OutputFormat::Json {
        println!("{}", serde_json::to_string_pretty(&config)?);
        return Ok(());
    }

    if let Some(path) = Config::config_path() {
        let state = if path.exists() { "" } else { " (not created, defaults)" };
        println!("# {}{}", path.display(), state);
    }
    println!("{}", toml::to_string_pretty(&config)?);
    Ok(())
}

fn handle_path(format: OutputFormat) -> Result<()> {
    let config = Config::load()?;
    let config_path = Config::config_path();
    let models_dir = config
        .embedding
        .model_path
        .clone()
        .or_else(Config::models_dir);

    if format == OutputFormat::Json {
        let json = serde_json::json!({
            "config": config_path,
            "data_dir": Config::data_dir(),
            "models": models_dir,
            "metrics": Config::metrics_db_path(),
            "socket": config.socket_path(),
            "pid": config.pid_path(),
        });
        println!("{}", serde_json::to_string_pretty(&json)?);
        return Ok(());
    }

    let show = |label: &str, path: Option<std::path::PathBuf>| match path {
        Some(p) => println!("{label:<10} {}", p.display()),
        None => println!("{label:<10} (unavailable)"),
    };
    show("Config:", config_path);
    show("Data:", Config::data_dir());
    show("Models:", models_dir);
    show("Metrics:", Config::metrics_db_path());
    show("Socket:", Some(config.socket_path()));
    show("Pid:", Some(config.pid_path()));
    Ok(())
}
