#![deny(clippy::all)]
#![warn(clippy::pedantic)]
#![allow(clippy::module_name_repetitions)]

//! # esologs
//!
//! Archive server and live-streaming log viewer for IRC-style chat.
//!
//! esologs reads tee'd events off a local Unix-socket pipe, keeps a bounded
//! in-memory ring per target for instant live delivery over websockets, and
//! serves rendered HTML/text/raw views of the on-disk day-file archive.
//!
//! ## Subcommands
//!
//! - `esologs serve` (default) — run the HTTP/WS server
//! - `esologs check-config` — load and validate a config file, then exit

use std::collections::HashMap;
use std::path::PathBuf;
use std::sync::Arc;

use axum::routing::get;
use axum::Router;
use clap::{Parser, Subcommand};
use tokio::net::TcpListener;
use tower_http::trace::TraceLayer;
use tracing::{error, info, warn};

use esologs::clock::{Clock, SystemClock};
use esologs::config::Config;
use esologs::index::Index;
use esologs::router::{build_router, RouterState, TargetState};
use esologs::stalker::{run_pipe_client, Stalker};
use esologs::state::Health;

/// Archive server and live-streaming log viewer for IRC-style chat.
#[derive(Parser)]
#[command(name = "esologs", version)]
struct Cli {
    #[command(subcommand)]
    command: Option<Commands>,
}

#[derive(Subcommand)]
enum Commands {
    /// Run the HTTP/WS server (default when no subcommand given).
    Serve {
        /// Path to TOML config file.
        #[arg(long)]
        config: Option<String>,
    },
    /// Load and validate a config file, then exit.
    CheckConfig {
        /// Path to TOML config file.
        #[arg(long)]
        config: Option<String>,
    },
}

#[tokio::main]
async fn main() {
    let cli = Cli::parse();

    match cli.command {
        Some(Commands::CheckConfig { config }) => {
            run_check_config(config.as_deref());
        }
        Some(Commands::Serve { config }) => {
            run_server(config.as_deref()).await;
        }
        None => {
            let args: Vec<String> = std::env::args().collect();
            let config_path = args
                .windows(2)
                .find(|w| w[0] == "--config")
                .map(|w| w[1].clone());
            run_server(config_path.as_deref()).await;
        }
    }
}

fn run_check_config(config_path: Option<&str>) {
    let config = Config::load(config_path);
    let errors = config.validate();
    if errors.is_empty() {
        println!("config ok: {} target(s)", config.targets.len());
    } else {
        for err in &errors {
            eprintln!("config error: {err}");
        }
        std::process::exit(1);
    }
}

#[allow(clippy::too_many_lines)]
async fn run_server(config_path: Option<&str>) {
    let config = Config::load(config_path);

    let log_filter = std::env::var("RUST_LOG").unwrap_or_else(|_| config.logging.level.clone());
    tracing_subscriber::fmt().with_env_filter(log_filter).init();

    let validation_errors = config.validate();
    if !validation_errors.is_empty() {
        for err in &validation_errors {
            error!("Config error: {err}");
        }
        std::process::exit(1);
    }

    info!("esologs v{} starting", env!("CARGO_PKG_VERSION"));
    info!("Listening on {}", config.server.listen);
    info!("Pipe socket: {}", config.server.pipe_socket);

    let clock: Arc<dyn Clock> = Arc::new(SystemClock);

    #[cfg(feature = "metrics")]
    let metrics = config.metrics.as_ref().map(|_| Arc::new(esologs::state::Metrics::new()));
    #[cfg(not(feature = "metrics"))]
    let metrics: Option<()> = None;

    let mut targets = HashMap::new();
    let mut index_by_name: HashMap<String, Arc<Index>> = HashMap::new();
    let mut stalker_targets = Vec::new();

    for entry in &config.targets {
        let root = PathBuf::from(&entry.log_path);
        let index = match Index::new(root, clock.clone()).await {
            Ok(index) => Arc::new(index),
            Err(err) => {
                error!(target = %entry.name, error = %err, "failed to build index, skipping target");
                continue;
            }
        };

        let render_config = esologs::format::TargetConfig {
            name: entry.name.clone(),
            nick: entry.nick.clone(),
            title: entry.title.clone(),
            about: entry.about.clone(),
            announce: entry.announce.clone(),
        };

        index_by_name.insert(entry.name.clone(), index.clone());
        stalker_targets.push(render_config.clone());
        targets.insert(
            entry.name.clone(),
            TargetState {
                index,
                config: render_config,
            },
        );
    }

    let mut stalker = Stalker::new(stalker_targets, Arc::new(index_by_name), clock.clone());
    #[cfg(feature = "metrics")]
    if let Some(metrics) = &metrics {
        stalker = stalker.with_metrics(metrics.clone());
    }
    let stalker = Arc::new(stalker);

    let pipe_socket = PathBuf::from(&config.server.pipe_socket);
    let pipe_task = tokio::spawn(run_pipe_client(stalker.clone(), pipe_socket));

    let router_state = Arc::new(RouterState {
        targets,
        stalker: stalker.clone(),
        clock: clock.clone(),
    });

    let health = Health::new();
    let app = build_router(router_state)
        .route("/health", get(move || health_handler(health.clone())))
        .layer(TraceLayer::new_for_http());

    #[cfg(feature = "metrics")]
    let metrics_task = if let (Some(mc), Some(metrics)) = (&config.metrics, &metrics) {
        let metrics = metrics.clone();
        let listen = mc.listen.clone();
        Some(tokio::spawn(async move {
            serve_metrics(listen, metrics).await;
        }))
    } else {
        None
    };

    let listener = TcpListener::bind(&config.server.listen)
        .await
        .expect("Failed to bind");

    info!("Server ready");

    let shutdown = async {
        let ctrl_c = tokio::signal::ctrl_c();
        #[cfg(unix)]
        {
            let mut sigterm =
                tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate())
                    .expect("Failed to register SIGTERM");
            tokio::select! {
                _ = ctrl_c => info!("Received SIGINT"),
                _ = sigterm.recv() => info!("Received SIGTERM"),
            }
        }
        #[cfg(not(unix))]
        {
            ctrl_c.await.ok();
            info!("Received SIGINT");
        }
    };

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown)
        .await
        .expect("Server error");

    info!("Shutting down...");
    pipe_task.abort();
    #[cfg(feature = "metrics")]
    if let Some(task) = metrics_task {
        task.abort();
    }
    info!("Goodbye");
}

async fn health_handler(health: Health) -> String {
    format!("ok uptime={}s\n", health.uptime_secs())
}

#[cfg(feature = "metrics")]
async fn serve_metrics(listen: String, metrics: Arc<esologs::state::Metrics>) {
    use prometheus::Encoder;

    let app = Router::new().route(
        "/metrics",
        get(move || {
            let metrics = metrics.clone();
            async move {
                let encoder = prometheus::TextEncoder::new();
                let families = metrics.registry.gather();
                let mut buf = Vec::new();
                if let Err(err) = encoder.encode(&families, &mut buf) {
                    warn!(error = %err, "failed to encode metrics");
                }
                String::from_utf8_lossy(&buf).into_owned()
            }
        }),
    );

    match TcpListener::bind(&listen).await {
        Ok(listener) => {
            info!("Metrics listening on {listen}");
            if let Err(err) = axum::serve(listener, app).await {
                error!(error = %err, "metrics server error");
            }
        }
        Err(err) => error!(error = %err, "failed to bind metrics listener"),
    }
}
