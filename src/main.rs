//! live-config watcher
//!
//! Loads a configuration file into a [`ConfigManager`], keeps it in sync
//! with the file and logs every accepted or rejected change until Ctrl-C.

use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use clap::Parser;
use serde_json::Value;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use live_config::{ConfigManager, FileFormat, Options, ReloadCallback, ReloadContext};

#[derive(Parser)]
#[command(name = "live-config")]
#[command(about = "Watch a configuration file and log its reloads", long_about = None)]
struct Cli {
    /// Directory holding the configuration file
    #[arg(short, long, default_value = live_config::options::DEFAULT_DIRECTORY)]
    dir: PathBuf,

    /// Configuration file name
    #[arg(short, long, default_value = live_config::options::DEFAULT_FILENAME)]
    file: String,

    /// File format (yaml, json, toml); inferred from the extension if omitted
    #[arg(long)]
    format: Option<FileFormat>,

    /// Minimum interval between two accepted reloads
    #[arg(long, default_value_t = 800)]
    debounce_ms: u64,

    /// Prefix for environment overrides
    #[arg(long)]
    env_prefix: Option<String>,

    /// Overlay matching environment variables on every read
    #[arg(long)]
    automatic_env: bool,
}

impl Cli {
    fn options(&self) -> Options {
        let mut options = Options::new()
            .with_directory(&self.dir)
            .with_filename(&self.file)
            .with_debounce(Duration::from_millis(self.debounce_ms))
            .with_automatic_env(self.automatic_env);
        if let Some(format) = self.format {
            options = options.with_format(format);
        }
        if let Some(prefix) = &self.env_prefix {
            options = options.with_env_prefix(prefix);
        }
        options
    }
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "live_config=debug".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    let cli = Cli::parse();

    let manager = ConfigManager::new(Value::Object(Default::default()));
    manager.set_option(cli.options());

    let log_changes: ReloadCallback<Value> = Arc::new(|ctx: &ReloadContext<'_, Value>| {
        for (field, change) in ctx.changes() {
            tracing::info!(
                field = %field,
                old = %change.old,
                new = %change.new,
                "Configuration field changed"
            );
        }
    });
    manager.init([log_changes])?;

    tracing::info!(path = %manager.config_path().display(), "Watching for changes");

    tokio::signal::ctrl_c().await?;
    manager.stop();

    tracing::info!("Shutdown complete");
    Ok(())
}
