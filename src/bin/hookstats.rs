use std::net::SocketAddr;
use std::path::PathBuf;

use anyhow::Context;
use clap::Parser;
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;
use tracing_subscriber::EnvFilter;

use hookstats::{create_app, AppConfig, DbClient, ServerState, WebhookSecret};

#[derive(clap::Parser)]
struct Opts {
    /// Address on which the HTTP server listens.
    #[arg(long, env = "BIND_ADDR", default_value = "0.0.0.0:3000")]
    bind: SocketAddr,

    /// Database connection URL.
    #[arg(long, env = "DATABASE_URL", default_value = "sqlite://hookstats.db?mode=rwc")]
    db: String,

    /// Secret used to authenticate webhooks.
    /// Without it, all incoming webhooks are rejected.
    #[arg(long, env = "WEBHOOK_SECRET")]
    webhook_secret: Option<String>,

    /// Path to a TOML configuration file.
    #[arg(long, env = "HOOKSTATS_CONFIG")]
    config: Option<PathBuf>,
}

async fn server(opts: Opts) -> anyhow::Result<()> {
    let config = match &opts.config {
        Some(path) => AppConfig::load(path)?,
        None => AppConfig::default(),
    };

    let db = DbClient::connect(&opts.db).await?;
    db.migrate().await?;

    let webhook_secret = opts
        .webhook_secret
        .filter(|secret| !secret.is_empty())
        .map(WebhookSecret::new);
    if webhook_secret.is_none() {
        tracing::warn!("No webhook secret configured, all webhooks will be rejected");
    }

    let state = ServerState::new(db.clone(), webhook_secret, config);
    let app = create_app(state);

    let listener = tokio::net::TcpListener::bind(opts.bind)
        .await
        .with_context(|| format!("Cannot bind to {}", opts.bind))?;
    tracing::info!("Listening on {}", opts.bind);

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await
        .context("Server has failed")?;

    tracing::info!("Shutting down");
    db.close().await;
    Ok(())
}

/// Resolves on Ctrl+C or, on Unix, on SIGTERM.
async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(error) = tokio::signal::ctrl_c().await {
            tracing::error!("Cannot listen for Ctrl+C: {error:?}");
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate()) {
            Ok(mut signal) => {
                signal.recv().await;
            }
            Err(error) => {
                tracing::error!("Cannot listen for SIGTERM: {error:?}");
                std::future::pending::<()>().await;
            }
        }
    };
    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        () = ctrl_c => {},
        () = terminate => {},
    }
}

fn try_main(opts: Opts) -> anyhow::Result<()> {
    let runtime = tokio::runtime::Builder::new_multi_thread()
        .enable_all()
        .build()
        .context("Cannot build tokio runtime")?;
    runtime.block_on(server(opts))
}

fn main() {
    tracing_subscriber::registry()
        .with(
            EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "hookstats=info,tower_http=info".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    let opts = Opts::parse();
    if let Err(error) = try_main(opts) {
        eprintln!("Error: {error:?}");
        std::process::exit(1);
    }
}
