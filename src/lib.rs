pub mod api;
pub mod auth;
pub mod config;
pub mod db;
pub mod directory;
pub mod notifications;
pub mod signup;
pub mod storage;
pub mod workflow;

pub use db::DbPool;

use config::Config;
use std::sync::Arc;
use std::time::Duration;

use crate::api::rate_limit::RateLimiter;
use crate::notifications::NotificationSender;
use crate::signup::ChallengeStore;
use crate::storage::BlobStore;

pub struct AppState {
    pub config: Config,
    pub db: DbPool,
    pub challenges: Arc<ChallengeStore>,
    pub blobs: Arc<dyn BlobStore>,
    pub notifier: NotificationSender,
    pub rate_limiter: Arc<RateLimiter>,
}

impl AppState {
    pub fn new(
        config: Config,
        db: DbPool,
        blobs: Arc<dyn BlobStore>,
        notifier: NotificationSender,
    ) -> Self {
        let rate_limiter = Arc::new(RateLimiter::new(config.rate_limit.clone()));
        let challenges = Arc::new(ChallengeStore::new(
            Duration::from_secs(config.signup.otp_ttl_seconds),
            config.signup.max_attempts,
        ));
        Self {
            config,
            db,
            challenges,
            blobs,
            notifier,
            rate_limiter,
        }
    }
}

/// Periodically drop expired sessions, signup challenges and rate limit buckets
pub fn spawn_cleanup_task(state: Arc<AppState>, every: Duration) {
    tokio::spawn(async move {
        let mut interval = tokio::time::interval(every);
        interval.tick().await;
        loop {
            interval.tick().await;

            let buckets = state.rate_limiter.cleanup_expired();
            let challenges = state.challenges.cleanup_expired();
            let sessions = match auth::purge_expired_sessions(&state.db).await {
                Ok(n) => n,
                Err(e) => {
                    tracing::warn!(error = %e, "Failed to purge expired sessions");
                    0
                }
            };

            tracing::debug!(buckets, challenges, sessions, "Cleanup complete");
        }
    });
}
