//! Two-phase signup with an emailed one-time code.
//!
//! `request_signup` parks the hashed credentials in a [`ChallengeStore`]
//! under a challenge id the client keeps in a cookie, and emails the code.
//! `verify_signup` checks the code and only then creates the user.

use dashmap::DashMap;
use rand::Rng;
use std::time::{Duration, Instant};
use subtle::ConstantTimeEq;
use thiserror::Error;

use crate::auth::{hash_password, normalize_email, AuthError};
use crate::db::{self, DbPool, SignupRequest, User, UserRole};
use crate::notifications::{Notification, NotificationSender};

#[derive(Debug, Error)]
pub enum SignupError {
    #[error("User with this email already exists")]
    DuplicateEmail,

    #[error("No signup in progress")]
    NoChallengeInProgress,

    #[error("Invalid OTP")]
    InvalidCode,

    #[error("OTP has expired, please request a new one")]
    ChallengeExpired,

    #[error("Could not send the verification code, please try again later")]
    DeliveryUnavailable,

    #[error("Failed to hash password: {0}")]
    PasswordHash(String),

    #[error(transparent)]
    Database(#[from] sqlx::Error),
}

impl From<AuthError> for SignupError {
    fn from(err: AuthError) -> Self {
        match err {
            AuthError::Database(e) => SignupError::Database(e),
            other => SignupError::PasswordHash(other.to_string()),
        }
    }
}

/// Credentials waiting for their code to be confirmed
#[derive(Debug, Clone)]
pub struct PendingSignup {
    pub username: String,
    pub email: String,
    pub password_hash: String,
    pub role: UserRole,
    code: String,
    issued_at: Instant,
    attempts: u32,
}

/// Result of checking a code against the store
#[derive(Debug)]
pub enum ChallengeOutcome {
    NoChallenge,
    Expired,
    Mismatch { remaining: u32 },
    Matched(PendingSignup),
}

/// In-memory, TTL-bounded store of pending signups keyed by challenge id
pub struct ChallengeStore {
    challenges: DashMap<String, PendingSignup>,
    ttl: Duration,
    max_attempts: u32,
}

impl ChallengeStore {
    pub fn new(ttl: Duration, max_attempts: u32) -> Self {
        Self {
            challenges: DashMap::new(),
            ttl,
            max_attempts: max_attempts.max(1),
        }
    }

    pub fn ttl(&self) -> Duration {
        self.ttl
    }

    /// Store a challenge under `id`, replacing any earlier one, and return its code
    pub fn issue(&self, id: &str, username: String, email: String, password_hash: String) -> String {
        let code = generate_code();
        self.challenges.insert(
            id.to_string(),
            PendingSignup {
                username,
                email,
                password_hash,
                role: UserRole::User,
                code: code.clone(),
                issued_at: Instant::now(),
                attempts: 0,
            },
        );
        code
    }

    /// Check `code` for the challenge under `id`.
    ///
    /// Matched and expired challenges are removed, as are challenges that
    /// run out of attempts.
    pub fn verify(&self, id: &str, code: &str) -> ChallengeOutcome {
        let outcome = {
            let Some(mut entry) = self.challenges.get_mut(id) else {
                return ChallengeOutcome::NoChallenge;
            };

            if entry.issued_at.elapsed() > self.ttl {
                ChallengeOutcome::Expired
            } else if bool::from(entry.code.as_bytes().ct_eq(code.trim().as_bytes())) {
                ChallengeOutcome::Matched((*entry).clone())
            } else {
                entry.attempts += 1;
                ChallengeOutcome::Mismatch {
                    remaining: self.max_attempts.saturating_sub(entry.attempts),
                }
            }
        };

        match &outcome {
            ChallengeOutcome::Expired
            | ChallengeOutcome::Matched(_)
            | ChallengeOutcome::Mismatch { remaining: 0 } => {
                self.challenges.remove(id);
            }
            _ => {}
        }
        outcome
    }

    pub fn discard(&self, id: &str) {
        self.challenges.remove(id);
    }

    /// Drop challenges older than the TTL
    pub fn cleanup_expired(&self) -> usize {
        let before = self.challenges.len();
        let ttl = self.ttl;
        self.challenges.retain(|_, c| c.issued_at.elapsed() <= ttl);
        before - self.challenges.len()
    }

    pub fn len(&self) -> usize {
        self.challenges.len()
    }

    pub fn is_empty(&self) -> bool {
        self.challenges.is_empty()
    }
}

fn generate_code() -> String {
    rand::rng().random_range(100_000..=999_999u32).to_string()
}

async fn email_taken(pool: &DbPool, email: &str) -> Result<bool, sqlx::Error> {
    let row: Option<(String,)> = sqlx::query_as("SELECT id FROM users WHERE email = ?")
        .bind(email)
        .fetch_optional(pool)
        .await?;
    Ok(row.is_some())
}

/// Issue a signup challenge and queue the code for delivery.
///
/// Returns the challenge id; an existing `challenge_id` is reused so a
/// repeated request replaces the earlier code.
pub async fn request_signup(
    pool: &DbPool,
    store: &ChallengeStore,
    notifier: &NotificationSender,
    challenge_id: Option<&str>,
    req: SignupRequest,
) -> Result<String, SignupError> {
    let email = normalize_email(&req.email);
    if email_taken(pool, &email).await? {
        return Err(SignupError::DuplicateEmail);
    }

    let password_hash = hash_password(&req.password)?;
    let id = challenge_id
        .filter(|id| !id.is_empty())
        .map(str::to_string)
        .unwrap_or_else(|| uuid::Uuid::new_v4().to_string());

    let code = store.issue(&id, req.username.trim().to_string(), email.clone(), password_hash);
    let ttl_minutes = store.ttl().as_secs().div_ceil(60);

    // The code is the only way forward, so a dropped email fails the request
    let queued = notifier.enqueue(Notification::SignupOtp {
        email: email.clone(),
        code,
        ttl_minutes,
    });
    if !queued {
        store.discard(&id);
        return Err(SignupError::DeliveryUnavailable);
    }

    tracing::info!(email = %email, "Signup code issued");
    Ok(id)
}

/// Confirm a signup code and create the user
pub async fn verify_signup(
    pool: &DbPool,
    store: &ChallengeStore,
    challenge_id: Option<&str>,
    code: &str,
) -> Result<User, SignupError> {
    let id = challenge_id.ok_or(SignupError::NoChallengeInProgress)?;

    let pending = match store.verify(id, code) {
        ChallengeOutcome::NoChallenge => return Err(SignupError::NoChallengeInProgress),
        ChallengeOutcome::Expired => return Err(SignupError::ChallengeExpired),
        ChallengeOutcome::Mismatch { remaining } => {
            tracing::info!(remaining, "Signup code mismatch");
            return Err(SignupError::InvalidCode);
        }
        ChallengeOutcome::Matched(pending) => pending,
    };

    let now = db::now();
    let user_id = uuid::Uuid::new_v4().to_string();
    let inserted = sqlx::query(
        "INSERT INTO users (id, username, email, password_hash, role, created_at, updated_at)
         VALUES (?, ?, ?, ?, ?, ?, ?)",
    )
    .bind(&user_id)
    .bind(&pending.username)
    .bind(&pending.email)
    .bind(&pending.password_hash)
    .bind(pending.role.as_str())
    .bind(&now)
    .bind(&now)
    .execute(pool)
    .await;

    match inserted {
        Ok(_) => {}
        Err(sqlx::Error::Database(e)) if e.is_unique_violation() => {
            return Err(SignupError::DuplicateEmail);
        }
        Err(e) => return Err(e.into()),
    }

    let user: User = sqlx::query_as("SELECT * FROM users WHERE id = ?")
        .bind(&user_id)
        .fetch_one(pool)
        .await?;

    tracing::info!(user_id = %user.id, email = %user.email, "User registered");
    Ok(user)
}
