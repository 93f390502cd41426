//! Honyaku - Game Text Translation Proxy
//!
//! Entry point: loads the configuration, sets up logging and runs the HTTP
//! proxy, a one-off translation or config initialization.

use anyhow::{Context, Result};
use clap::Parser;
use std::path::{Path, PathBuf};
use tracing::{Level, info, warn};
use tracing_appender::{non_blocking, rolling};
use tracing_subscriber::{EnvFilter, fmt, layer::SubscriberExt, util::SubscriberInitExt};

use honyaku::cli::{Args, Commands};
use honyaku::config::Config;
use honyaku::reload::{self, Runtime, Snapshot};
use honyaku::server::{self, AppState};
use honyaku::translate::dictionary::Dictionary;
use honyaku::translate::{TranslateOptions, TranslationService};

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();

    setup_logging(args.verbose)?;
    info!("Starting Honyaku - Game Text Translation Proxy");

    let command = args.command.unwrap_or(Commands::Serve { bind: None });

    if let Commands::Init { output, force } = &command {
        if output.exists() && !*force {
            anyhow::bail!("{} already exists, pass --force to overwrite", output.display());
        }
        Config::default()
            .save_to_file(output)
            .with_context(|| format!("Failed to write {}", output.display()))?;
        info!("Wrote default configuration to {}", output.display());
        return Ok(());
    }

    let config_path = resolve_config_path(args.config.as_deref())?;
    info!("Loading configuration from {}", config_path.display());
    let runtime = Runtime::load(&config_path)?;

    let dictionary = match reload::load_dictionary(&runtime.config.dictionary_path) {
        Ok(dictionary) => dictionary,
        Err(e) => {
            warn!("Starting without dictionary: {}", e);
            Dictionary::default()
        }
    };
    info!("Dictionary entries: {}", dictionary.len());

    let server_config = runtime.config.server.clone();
    let runtime = Snapshot::new(runtime);
    let dictionary = Snapshot::new(dictionary);
    let service = TranslationService::new(runtime.clone(), dictionary.clone());

    match command {
        Commands::Translate { text, separator } => {
            let options = TranslateOptions { separator };
            let translated = service.translate(&text, &options).await?;
            println!("{}", translated);
        }
        Commands::Serve { bind } => {
            let interval = server_config.reload_interval();
            reload::spawn_config_watcher(config_path, runtime.clone(), interval);
            reload::spawn_dictionary_watcher(runtime, dictionary, interval);

            let bind = bind.unwrap_or(server_config.bind);
            server::serve(&bind, AppState::new(service)).await?;
        }
        Commands::Init { .. } => {}
    }

    Ok(())
}

fn resolve_config_path(explicit: Option<&Path>) -> Result<PathBuf> {
    if let Some(path) = explicit {
        return Ok(path.to_path_buf());
    }
    ["config.toml", "config.json"]
        .iter()
        .map(PathBuf::from)
        .find(|p| p.exists())
        .context("No config.toml or config.json in the current directory; run `honyaku init` to create one")
}

fn setup_logging(verbose: bool) -> Result<()> {
    // Create log directory
    let log_dir = std::env::current_dir()?.join(".honyaku").join("log");
    std::fs::create_dir_all(&log_dir)?;

    let file_appender = rolling::daily(&log_dir, "honyaku.log");
    let (non_blocking_file, _guard) = non_blocking(file_appender);
    // Keep the guard alive for the duration of the program
    std::mem::forget(_guard);

    let log_level = if verbose { Level::DEBUG } else { Level::INFO };

    let console_layer = fmt::layer()
        .with_target(false)
        .with_thread_ids(true);

    let file_layer = fmt::layer()
        .with_writer(non_blocking_file)
        .with_target(false)
        .with_thread_ids(true)
        .with_file(true)
        .with_line_number(true)
        .with_ansi(false);

    tracing_subscriber::registry()
        .with(EnvFilter::from_default_env().add_directive(log_level.into()))
        .with(console_layer)
        .with(file_layer)
        .try_init()
        .map_err(|e| anyhow::anyhow!("Failed to initialize logging: {}", e))?;

    info!("Logging initialized - console: {}, file: {}",
          log_level, log_dir.join("honyaku.log").display());

    Ok(())
}
