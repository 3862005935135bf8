//! # tether
//!
//! Runs the SSE + POST transport server with the built-in JSON-RPC methods,
//! or probes a running server with `initialize` and `ping`.

#![deny(unsafe_code)]

use std::path::PathBuf;
use std::time::Duration;

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use serde_json::json;
use tether_client::TetherClient;
use tether_core::{LogFormat, init_subscriber};
use tether_rpc::{RpcService, ServerInfo};
use tether_server::{ServerConfig, TetherServer};

/// Environment variable naming the config file when `--config` is absent.
const CONFIG_ENV: &str = "TETHER_CONFIG";

/// Duplex JSON-RPC over Server-Sent Events and HTTP POST.
#[derive(Parser, Debug)]
#[command(name = "tether", version, about = "SSE + POST duplex transport")]
struct Cli {
    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Run the server until ctrl-c.
    Serve(ServeArgs),
    /// Open a session against a running server and round-trip `initialize` and `ping`.
    Probe(ProbeArgs),
}

#[derive(clap::Args, Debug)]
struct ServeArgs {
    /// JSON config file (falls back to `TETHER_CONFIG`).
    #[arg(long)]
    config: Option<PathBuf>,

    /// Host to bind (overrides config).
    #[arg(long)]
    host: Option<String>,

    /// Port to bind, 0 for auto-assign (overrides config).
    #[arg(long)]
    port: Option<u16>,

    /// Maximum concurrent sessions (overrides config).
    #[arg(long)]
    max_sessions: Option<usize>,

    /// Log level when `RUST_LOG` is unset (overrides config).
    #[arg(long)]
    log_level: Option<String>,

    /// Log format: `compact` or `json` (overrides config).
    #[arg(long)]
    log_format: Option<LogFormat>,

    /// Do not install the Prometheus recorder.
    #[arg(long, default_value_t = false)]
    no_metrics: bool,
}

#[derive(clap::Args, Debug)]
struct ProbeArgs {
    /// Server base URL.
    #[arg(long, default_value = "http://127.0.0.1:8080")]
    url: String,

    /// Push stream path on the server.
    #[arg(long, default_value = "/sse")]
    sse_path: String,

    /// Seconds to wait for the handshake and for each response.
    #[arg(long, default_value_t = 10)]
    timeout_secs: u64,
}

impl ServeArgs {
    fn config_path(&self) -> Option<PathBuf> {
        self.config
            .clone()
            .or_else(|| std::env::var_os(CONFIG_ENV).map(PathBuf::from))
    }

    /// Apply command-line overrides on top of the loaded config.
    fn apply(&self, config: &mut ServerConfig) {
        if let Some(host) = &self.host {
            config.host.clone_from(host);
        }
        if let Some(port) = self.port {
            config.port = port;
        }
        if let Some(max) = self.max_sessions {
            config.max_sessions = max;
        }
        if let Some(level) = &self.log_level {
            config.log_level.clone_from(level);
        }
        if let Some(format) = self.log_format {
            config.log_format = format;
        }
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    match Cli::parse().command {
        Command::Serve(args) => serve(args).await,
        Command::Probe(args) => probe(args).await,
    }
}

async fn serve(args: ServeArgs) -> Result<()> {
    let path = args.config_path();
    let mut config = ServerConfig::load(path.as_deref()).context("Failed to load configuration")?;
    args.apply(&mut config);
    config.validate().context("Invalid configuration")?;

    init_subscriber(&config.log_level, config.log_format);

    let mut server = TetherServer::new(config, RpcService::with_builtins(ServerInfo::default()));
    if !args.no_metrics {
        match tether_server::metrics::install_recorder() {
            Ok(handle) => server = server.with_metrics(handle),
            Err(e) => tracing::warn!(error = %e, "metrics recorder unavailable"),
        }
    }

    let listener = server.bind().await.context("Failed to bind server")?;
    let serving = server.serve(listener);
    tokio::pin!(serving);

    tokio::select! {
        result = &mut serving => result.context("Server error")?,
        signal = tokio::signal::ctrl_c() => {
            signal.context("Failed to listen for ctrl-c")?;
            tracing::info!("Shutting down...");
            server.shutdown().shutdown();
            serving.await.context("Server error during shutdown")?;
        }
    }

    tracing::info!("Shutdown complete");
    Ok(())
}

async fn probe(args: ProbeArgs) -> Result<()> {
    init_subscriber("warn", LogFormat::Compact);

    let timeout = Duration::from_secs(args.timeout_secs);
    let client = TetherClient::new(&args.url)
        .context("Invalid server URL")?
        .with_sse_path(args.sse_path)
        .with_handshake_timeout(timeout)
        .with_call_timeout(timeout);

    let mut session = client.open().await.context("Failed to open session")?;
    println!("session {} -> {}", session.session_id(), session.endpoint());

    let init = session
        .call(
            "initialize",
            Some(json!({
                "protocolVersion": "2025-03-26",
                "capabilities": {},
                "clientInfo": { "name": "tether-probe", "version": env!("CARGO_PKG_VERSION") },
            })),
        )
        .await
        .context("initialize failed")?;
    println!("{}", serde_json::to_string_pretty(&init)?);

    session
        .notify("notifications/initialized", None)
        .await
        .context("initialized notification failed")?;

    let pong = session.call("ping", None).await.context("ping failed")?;
    println!("ping -> {pong}");
    Ok(())
}
