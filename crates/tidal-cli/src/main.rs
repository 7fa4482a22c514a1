use std::path::{Path, PathBuf};
use std::sync::Arc;

use clap::Parser;
use tidal_client::config::{apply_env_overrides, load_config};
use tidal_client::{store_for, Notifier, SessionClient, TracingNotifier};
use tracing_subscriber::EnvFilter;

mod cli_args;
mod commands;
mod notifier;

use crate::cli_args::*;
use crate::commands::handle_command;
use crate::notifier::TerminalNotifier;

const CONFIG_FILE: &str = "config.yaml";
const TOKEN_FILE: &str = "tokens.json";

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();
    let json_logs = init_logging(cli.verbose)?;

    let home = tidal_home()?;
    let config_path = cli
        .config
        .as_deref()
        .map(PathBuf::from)
        .unwrap_or_else(|| home.join(CONFIG_FILE));
    let mut config = load_config(&config_path);
    apply_env_overrides(&mut config);
    if let Some(base_url) = cli.base_url {
        config.base_url = base_url;
    }

    // JSON logs are read by machines, so notices join the log stream there.
    let notifier: Arc<dyn Notifier> = if json_logs {
        Arc::new(TracingNotifier::new(&config.login_surface))
    } else {
        Arc::new(TerminalNotifier::new(matches!(
            cli.command,
            Command::Login(_)
        )))
    };
    let store = store_for(&config, &home.join(TOKEN_FILE));
    let client = SessionClient::new(config, store, notifier)?;

    handle_command(cli.command, &client).await
}

fn tidal_home() -> anyhow::Result<PathBuf> {
    let home = std::env::var("HOME")
        .or_else(|_| std::env::var("USERPROFILE"))
        .map_err(|_| anyhow::anyhow!("HOME is not set"))?;
    Ok(Path::new(&home).join(".tidal"))
}

/// Installs the stderr subscriber and reports whether it emits JSON.
fn init_logging(verbosity: u8) -> anyhow::Result<bool> {
    let filter = match verbosity {
        0 => "warn",
        1 => "info",
        _ => "debug",
    };
    let builder = tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_new(filter)?)
        .with_target(false)
        .with_writer(std::io::stderr);
    let json = std::env::var("LOG_FORMAT").is_ok_and(|value| value.eq_ignore_ascii_case("json"));
    if json {
        builder.json().init();
    } else {
        builder.init();
    }
    Ok(json)
}
