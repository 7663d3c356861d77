use anyhow::{Context, Result};
use clap::Parser;
use std::net::SocketAddr;
use std::path::PathBuf;
use tracing::info;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use signal_relay::{AppState, FileConfig, RelayConfig, build_router, load_config};

#[derive(Parser)]
#[command(name = "relay")]
#[command(about = "WebRTC signaling relay: peer presence and point-to-point forwarding")]
struct Args {
    /// Path to a TOML config file
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// Host to bind to (overrides config)
    #[arg(short = 'b', long)]
    host: Option<String>,

    /// Port for the web server (overrides config, 0 = auto-select)
    #[arg(short, long)]
    port: Option<u16>,

    /// Directory of client assets served at / (overrides config)
    #[arg(long)]
    static_dir: Option<PathBuf>,

    /// Enable debug logging
    #[arg(short, long)]
    debug: bool,
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();

    let default_directive = if args.debug {
        "signal_relay=debug,tower_http=debug,info"
    } else {
        "signal_relay=info,tower_http=info,warn"
    };
    let env_filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new(default_directive));
    tracing_subscriber::registry()
        .with(tracing_subscriber::fmt::layer())
        .with(env_filter)
        .init();

    let mut file_config: FileConfig = load_config(args.config.as_deref())
        .extract()
        .context("Failed to load configuration")?;

    if let Some(host) = args.host {
        file_config.server.host = host;
    }
    if let Some(port) = args.port {
        file_config.server.port = port;
    }
    if let Some(dir) = args.static_dir {
        file_config.server.static_dir = Some(dir);
    }

    let relay_config =
        RelayConfig::from_file(&file_config.relay).context("Invalid relay configuration")?;
    info!(
        max_message_bytes = relay_config.max_message_bytes,
        pong_wait = ?relay_config.pong_wait,
        ping_interval = ?relay_config.ping_interval,
        write_wait = ?relay_config.write_wait,
        "Starting signaling relay"
    );

    let static_dir = file_config.server.static_dir.clone();
    if let Some(dir) = &static_dir {
        if !dir.is_dir() {
            anyhow::bail!("Static directory {} does not exist", dir.display());
        }
        info!("Serving client assets from {}", dir.display());
    }

    let app = build_router(AppState::new(relay_config), static_dir.as_deref());

    let addr = format!("{}:{}", file_config.server.host, file_config.server.port)
        .parse::<SocketAddr>()
        .context("Invalid listen address")?;
    let listener = tokio::net::TcpListener::bind(addr)
        .await
        .with_context(|| format!("Failed to bind {}", addr))?;
    let actual_addr = listener.local_addr()?;

    info!("Relay listening on http://{}", actual_addr);
    info!("Signaling endpoint: ws://{}/ws?id=<peer>", actual_addr);

    let shutdown_signal = async {
        if let Err(e) = tokio::signal::ctrl_c().await {
            tracing::error!("Failed to install Ctrl+C handler: {}", e);
            std::future::pending::<()>().await;
        }
        info!("Received shutdown signal");
    };

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal)
        .await
        .context("Server error")?;

    info!("Relay stopped");
    Ok(())
}
