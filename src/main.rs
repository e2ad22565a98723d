use anyhow::{Context, Result};
use clap::Parser;
use std::net::SocketAddr;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use craveit::config::Config;
use craveit::notifications::{
    LogNotifier, NotificationDispatcher, NotificationSender, Notifier, SmtpNotifier,
};
use craveit::storage::LocalBlobStore;
use craveit::AppState;

#[derive(Parser, Debug)]
#[command(name = "craveit")]
#[command(author, version, about = "Food vendor discovery and onboarding service", long_about = None)]
struct Cli {
    /// Path to configuration file
    #[arg(short, long, env = "CRAVEIT_CONFIG", default_value = "craveit.toml")]
    config: PathBuf,

    /// Override log level
    #[arg(short, long)]
    log_level: Option<String>,
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    let config = Config::load(&cli.config)?;

    let log_level = cli
        .log_level
        .as_ref()
        .unwrap_or(&config.logging.level)
        .clone();

    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new(&log_level)),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    tracing::info!("Starting CraveIt v{}", env!("CARGO_PKG_VERSION"));

    std::fs::create_dir_all(&config.server.data_dir).with_context(|| {
        format!(
            "Failed to create data directory {}",
            config.server.data_dir.display()
        )
    })?;
    let uploads_dir = config.server.uploads_dir();
    std::fs::create_dir_all(&uploads_dir)
        .with_context(|| format!("Failed to create uploads directory {}", uploads_dir.display()))?;

    // Fail fast when storage is unavailable
    let db = craveit::db::init(&config.server.data_dir).await?;

    craveit::auth::ensure_admin_user(&db, &config.auth)
        .await
        .context("Failed to seed admin user")?;

    let notifier: Arc<dyn Notifier> = if config.email.is_configured() {
        tracing::info!("Email delivery via SMTP enabled");
        Arc::new(SmtpNotifier::new(config.email.clone()))
    } else {
        tracing::warn!("SMTP not configured, notifications will only be logged");
        Arc::new(LogNotifier)
    };
    let (sender, rx) = NotificationSender::channel();
    tokio::spawn(NotificationDispatcher::new(rx, notifier).run());

    let blobs = Arc::new(LocalBlobStore::new(uploads_dir));
    let state = Arc::new(AppState::new(config.clone(), db, blobs, sender));

    craveit::spawn_cleanup_task(state.clone(), Duration::from_secs(60));

    let app = craveit::api::create_router(state);

    let addr = format!("{}:{}", config.server.host, config.server.port);
    let listener = tokio::net::TcpListener::bind(&addr)
        .await
        .with_context(|| format!("Failed to bind {}", addr))?;

    tracing::info!("API server listening on http://{}", addr);

    axum::serve(
        listener,
        app.into_make_service_with_connect_info::<SocketAddr>(),
    )
    .with_graceful_shutdown(shutdown_signal())
    .await?;

    tracing::info!("Server stopped");
    Ok(())
}

async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = tokio::signal::ctrl_c().await {
            tracing::error!(error = %e, "Failed to listen for Ctrl+C");
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate()) {
            Ok(mut signal) => {
                signal.recv().await;
            }
            Err(e) => {
                tracing::error!(error = %e, "Failed to install SIGTERM handler");
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {},
        _ = terminate => {},
    }

    tracing::info!("Shutdown signal received");
}
