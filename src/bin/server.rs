use clap::Parser;
use sitegate::config::{AppConfig, DEFAULT_CONFIG_FILE};
use sitegate::start_server_with_config;
use std::path::PathBuf;
use tracing_subscriber::EnvFilter;

/// Serve the sitegate login, signup and logout pages
#[derive(Debug, Parser)]
#[command(version, about)]
struct Args {
    /// TOML configuration file; `SITEGATE_*` environment variables override it
    #[arg(short, long, default_value = DEFAULT_CONFIG_FILE)]
    config: PathBuf,

    /// Override the listening port
    #[arg(short, long)]
    port: Option<u16>,
}

fn init_tracing(json: bool) {
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new("sitegate=info,tower_http=info"));

    if json {
        tracing_subscriber::fmt()
            .with_env_filter(filter)
            .json()
            .init();
    } else {
        tracing_subscriber::fmt()
            .with_env_filter(filter)
            .compact()
            .init();
    }
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let args = Args::parse();

    let mut config = AppConfig::load(&args.config)?;
    if let Some(port) = args.port {
        config.server.port = port;
    }

    init_tracing(config.logging.json);
    tracing::info!(
        config = %args.config.display(),
        sso_enabled = config.sso.enabled,
        "starting sitegate"
    );

    let (shutdown_tx, shutdown_rx) = tokio::sync::oneshot::channel::<()>();

    // Start the server in a background task so we can listen for Ctrl-C in the main task
    let mut server_task = tokio::spawn(start_server_with_config(config, shutdown_rx));

    tokio::select! {
        res = &mut server_task => {
            res??;
        }
        _ = tokio::signal::ctrl_c() => {
            if shutdown_tx.send(()).is_err() {
                tracing::warn!("server task already exited");
            }
            server_task.await??;
            tracing::info!("server stopped");
        }
    }

    Ok(())
}
