//! Session authentication and role authorization.
//!
//! Sessions are rows in `sessions` keyed by an HMAC of the opaque token the
//! client holds; the raw token is never stored. Each successful lookup slides
//! the expiry forward by the configured idle lifetime.

use argon2::{
    password_hash::{rand_core::OsRng, PasswordHash, PasswordHasher, PasswordVerifier, SaltString},
    Argon2,
};
use hmac::{Hmac, Mac};
use lazy_static::lazy_static;
use rand::Rng;
use serde::Serialize;
use sha2::Sha256;
use thiserror::Error;

use crate::config::AuthConfig;
use crate::db::{self, DbPool, Session, User, UserResponse, UserRole};

type HmacSha256 = Hmac<Sha256>;

lazy_static! {
    /// Verified against when the email is unknown, so both login failures cost one argon2 run
    static ref DUMMY_PASSWORD_HASH: String = hash_password(&generate_token()).unwrap_or_default();
}

#[derive(Debug, Error)]
pub enum AuthError {
    #[error("Invalid credentials")]
    InvalidCredentials,

    #[error("Not authenticated")]
    Unauthenticated,

    #[error("Forbidden")]
    Forbidden,

    #[error("Failed to hash password: {0}")]
    PasswordHash(String),

    #[error(transparent)]
    Database(#[from] sqlx::Error),
}

/// The identity attached to an authenticated request
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Principal {
    pub id: String,
    pub username: String,
    pub email: String,
    pub role: UserRole,
}

impl From<User> for Principal {
    fn from(user: User) -> Self {
        let role = user.role_enum();
        Self {
            id: user.id,
            username: user.username,
            email: user.email,
            role,
        }
    }
}

impl From<Principal> for UserResponse {
    fn from(p: Principal) -> Self {
        Self {
            id: p.id,
            username: p.username,
            email: p.email,
            role: p.role,
        }
    }
}

/// Role guard shared by every protected endpoint.
///
/// No principal is `Unauthenticated`; a principal whose role is not in
/// `roles` is `Forbidden`. An empty `roles` only requires authentication.
pub fn authorize<'a>(
    principal: Option<&'a Principal>,
    roles: &[UserRole],
) -> Result<&'a Principal, AuthError> {
    let principal = principal.ok_or(AuthError::Unauthenticated)?;
    if !roles.is_empty() && !roles.contains(&principal.role) {
        return Err(AuthError::Forbidden);
    }
    Ok(principal)
}

/// Hash a password using Argon2
pub fn hash_password(password: &str) -> Result<String, AuthError> {
    let salt = SaltString::generate(&mut OsRng);
    Argon2::default()
        .hash_password(password.as_bytes(), &salt)
        .map(|hash| hash.to_string())
        .map_err(|e| AuthError::PasswordHash(e.to_string()))
}

/// Verify a password against a hash
pub fn verify_password(password: &str, hash: &str) -> bool {
    let parsed_hash = match PasswordHash::new(hash) {
        Ok(h) => h,
        Err(_) => return false,
    };
    Argon2::default()
        .verify_password(password.as_bytes(), &parsed_hash)
        .is_ok()
}

fn check_credentials(user: Option<&User>, password: &str) -> bool {
    match user {
        Some(user) => verify_password(password, &user.password_hash),
        None => {
            verify_password(password, &DUMMY_PASSWORD_HASH);
            false
        }
    }
}

/// Generate a random token
pub fn generate_token() -> String {
    let mut rng = rand::rng();
    let bytes: [u8; 32] = rng.random();
    hex::encode(bytes)
}

/// Keyed hash of a token for storage
pub fn hash_token(secret: &str, token: &str) -> String {
    let mut mac =
        HmacSha256::new_from_slice(secret.as_bytes()).expect("HMAC accepts keys of any length");
    mac.update(token.as_bytes());
    hex::encode(mac.finalize().into_bytes())
}

/// Lowercase and trim an email so lookups and uniqueness agree
pub fn normalize_email(email: &str) -> String {
    email.trim().to_lowercase()
}

fn expiry_from_now(config: &AuthConfig) -> String {
    let expires = chrono::Utc::now() + chrono::Duration::minutes(config.session_idle_minutes);
    expires.to_rfc3339_opts(chrono::SecondsFormat::Micros, true)
}

/// Create a session for a user and return the raw token
pub async fn create_session(
    pool: &DbPool,
    config: &AuthConfig,
    user_id: &str,
) -> Result<String, AuthError> {
    let token = generate_token();
    let token_hash = hash_token(&config.session_secret, &token);

    sqlx::query(
        "INSERT INTO sessions (id, user_id, token_hash, expires_at, created_at) VALUES (?, ?, ?, ?, ?)",
    )
    .bind(uuid::Uuid::new_v4().to_string())
    .bind(user_id)
    .bind(&token_hash)
    .bind(expiry_from_now(config))
    .bind(db::now())
    .execute(pool)
    .await?;

    Ok(token)
}

/// Check credentials and open a session
pub async fn login(
    pool: &DbPool,
    config: &AuthConfig,
    email: &str,
    password: &str,
) -> Result<(String, User), AuthError> {
    let user: Option<User> = sqlx::query_as("SELECT * FROM users WHERE email = ?")
        .bind(normalize_email(email))
        .fetch_optional(pool)
        .await?;

    // Same error and the same hashing work for unknown email and wrong password
    if !check_credentials(user.as_ref(), password) {
        match &user {
            Some(user) => tracing::info!(user_id = %user.id, "Login rejected: wrong password"),
            None => tracing::info!("Login rejected: unknown email"),
        }
        return Err(AuthError::InvalidCredentials);
    }
    let user = user.ok_or(AuthError::InvalidCredentials)?;

    let token = create_session(pool, config, &user.id).await?;
    tracing::info!(user_id = %user.id, role = %user.role, "User logged in");
    Ok((token, user))
}

/// Resolve a session token to its principal, refreshing the idle expiry.
///
/// The user row is re-read on every call so role changes apply immediately.
pub async fn current_principal(
    pool: &DbPool,
    config: &AuthConfig,
    token: &str,
) -> Result<Principal, AuthError> {
    let token_hash = hash_token(&config.session_secret, token);
    let session: Option<Session> =
        sqlx::query_as("SELECT * FROM sessions WHERE token_hash = ? AND expires_at > ?")
            .bind(&token_hash)
            .bind(db::now())
            .fetch_optional(pool)
            .await?;
    let session = session.ok_or(AuthError::Unauthenticated)?;

    let user: Option<User> = sqlx::query_as("SELECT * FROM users WHERE id = ?")
        .bind(&session.user_id)
        .fetch_optional(pool)
        .await?;
    let user = user.ok_or(AuthError::Unauthenticated)?;

    sqlx::query("UPDATE sessions SET expires_at = ? WHERE id = ?")
        .bind(expiry_from_now(config))
        .bind(&session.id)
        .execute(pool)
        .await?;

    Ok(Principal::from(user))
}

/// Destroy the session behind a token. Unknown tokens are ignored.
pub async fn logout(pool: &DbPool, config: &AuthConfig, token: &str) -> Result<(), AuthError> {
    let token_hash = hash_token(&config.session_secret, token);
    let result = sqlx::query("DELETE FROM sessions WHERE token_hash = ?")
        .bind(&token_hash)
        .execute(pool)
        .await?;
    if result.rows_affected() > 0 {
        tracing::info!("Session destroyed");
    }
    Ok(())
}

/// Drop expired session rows
pub async fn purge_expired_sessions(pool: &DbPool) -> Result<u64, AuthError> {
    let result = sqlx::query("DELETE FROM sessions WHERE expires_at <= ?")
        .bind(db::now())
        .execute(pool)
        .await?;
    Ok(result.rows_affected())
}

/// Ensure the configured administrator account exists
pub async fn ensure_admin_user(pool: &DbPool, config: &AuthConfig) -> Result<(), AuthError> {
    let (Some(email), Some(password)) = (&config.admin_email, &config.admin_password) else {
        return Ok(());
    };
    let email = normalize_email(email);

    let existing: Option<User> = sqlx::query_as("SELECT * FROM users WHERE email = ?")
        .bind(&email)
        .fetch_optional(pool)
        .await?;

    if let Some(user) = existing {
        if user.role_enum() != UserRole::Admin {
            tracing::warn!(
                email = %email,
                role = %user.role,
                "Configured admin email belongs to a non-admin account; leaving it unchanged"
            );
        }
        return Ok(());
    }

    let now = db::now();
    sqlx::query(
        "INSERT INTO users (id, username, email, password_hash, role, created_at, updated_at)
         VALUES (?, ?, ?, ?, ?, ?, ?)",
    )
    .bind(uuid::Uuid::new_v4().to_string())
    .bind(&config.admin_username)
    .bind(&email)
    .bind(hash_password(password)?)
    .bind(UserRole::Admin.as_str())
    .bind(&now)
    .bind(&now)
    .execute(pool)
    .await?;

    tracing::info!(email = %email, "Created admin user");
    Ok(())
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;

    pub(crate) async fn insert_user(pool: &DbPool, email: &str, password: &str, role: UserRole) -> User {
        let now = db::now();
        let id = uuid::Uuid::new_v4().to_string();
        sqlx::query(
            "INSERT INTO users (id, username, email, password_hash, role, created_at, updated_at)
             VALUES (?, ?, ?, ?, ?, ?, ?)",
        )
        .bind(&id)
        .bind("Test User")
        .bind(email)
        .bind(hash_password(password).unwrap())
        .bind(role.as_str())
        .bind(&now)
        .bind(&now)
        .execute(pool)
        .await
        .unwrap();

        sqlx::query_as("SELECT * FROM users WHERE id = ?")
            .bind(&id)
            .fetch_one(pool)
            .await
            .unwrap()
    }

    fn principal(role: UserRole) -> Principal {
        Principal {
            id: "u1".to_string(),
            username: "Asha Rao".to_string(),
            email: "asha@example.com".to_string(),
            role,
        }
    }

    #[test]
    fn test_password_hash_round_trip() {
        let hash = hash_password("Masala@123").unwrap();
        assert!(hash.starts_with("$argon2"));
        assert!(verify_password("Masala@123", &hash));
        assert!(!verify_password("masala@123", &hash));
        assert!(!verify_password("Masala@123", "not-a-hash"));
    }

    #[test]
    fn test_token_hash_depends_on_secret() {
        let token = generate_token();
        assert_eq!(token.len(), 64);
        assert_eq!(hash_token("a", &token), hash_token("a", &token));
        assert_ne!(hash_token("a", &token), hash_token("b", &token));
    }

    #[test]
    fn test_authorize() {
        let user = principal(UserRole::User);
        let admin = principal(UserRole::Admin);

        assert!(matches!(
            authorize(None, &[]),
            Err(AuthError::Unauthenticated)
        ));
        assert!(matches!(
            authorize(None, &[UserRole::Admin]),
            Err(AuthError::Unauthenticated)
        ));
        assert!(authorize(Some(&user), &[]).is_ok());
        assert!(matches!(
            authorize(Some(&user), &[UserRole::Admin]),
            Err(AuthError::Forbidden)
        ));
        assert!(authorize(Some(&admin), &[UserRole::Admin]).is_ok());
        assert!(authorize(Some(&user), &[UserRole::User, UserRole::Vendor]).is_ok());
    }

    #[tokio::test]
    async fn test_login_creates_session_with_stored_role() {
        let pool = db::connect_in_memory().await.unwrap();
        let config = AuthConfig::default();
        insert_user(&pool, "vendor@example.com", "Masala@123", UserRole::Vendor).await;

        let (token, user) = login(&pool, &config, " Vendor@Example.com ", "Masala@123")
            .await
            .unwrap();
        assert_eq!(user.email, "vendor@example.com");

        let principal = current_principal(&pool, &config, &token).await.unwrap();
        assert_eq!(principal.role, UserRole::Vendor);
        assert_eq!(principal.id, user.id);
    }

    #[test]
    fn test_unknown_email_still_runs_argon2() {
        let dummy = PasswordHash::new(&DUMMY_PASSWORD_HASH).unwrap();
        let real_hash = hash_password("Masala@123").unwrap();
        let real = PasswordHash::new(&real_hash).unwrap();
        assert_eq!(dummy.algorithm, real.algorithm);
        assert_eq!(dummy.params, real.params);

        assert!(!check_credentials(None, "Masala@123"));
        assert!(!check_credentials(None, ""));
    }

    #[tokio::test]
    async fn test_login_failures_create_no_session() {
        let pool = db::connect_in_memory().await.unwrap();
        let config = AuthConfig::default();
        insert_user(&pool, "asha@example.com", "Masala@123", UserRole::User).await;

        assert!(matches!(
            login(&pool, &config, "asha@example.com", "wrong").await,
            Err(AuthError::InvalidCredentials)
        ));
        assert!(matches!(
            login(&pool, &config, "nobody@example.com", "Masala@123").await,
            Err(AuthError::InvalidCredentials)
        ));

        let count: (i64,) = sqlx::query_as("SELECT COUNT(*) FROM sessions")
            .fetch_one(&pool)
            .await
            .unwrap();
        assert_eq!(count.0, 0);
    }

    #[tokio::test]
    async fn test_role_change_is_visible_without_relogin() {
        let pool = db::connect_in_memory().await.unwrap();
        let config = AuthConfig::default();
        let user = insert_user(&pool, "asha@example.com", "Masala@123", UserRole::User).await;
        let (token, _) = login(&pool, &config, "asha@example.com", "Masala@123")
            .await
            .unwrap();

        sqlx::query("UPDATE users SET role = 'vendor' WHERE id = ?")
            .bind(&user.id)
            .execute(&pool)
            .await
            .unwrap();

        let principal = current_principal(&pool, &config, &token).await.unwrap();
        assert_eq!(principal.role, UserRole::Vendor);
    }

    #[tokio::test]
    async fn test_logout_and_expiry() {
        let pool = db::connect_in_memory().await.unwrap();
        let config = AuthConfig::default();
        insert_user(&pool, "asha@example.com", "Masala@123", UserRole::User).await;
        let (token, _) = login(&pool, &config, "asha@example.com", "Masala@123")
            .await
            .unwrap();

        logout(&pool, &config, &token).await.unwrap();
        assert!(matches!(
            current_principal(&pool, &config, &token).await,
            Err(AuthError::Unauthenticated)
        ));
        // Logging out twice is harmless
        logout(&pool, &config, &token).await.unwrap();

        let expired = AuthConfig {
            session_idle_minutes: -1,
            ..config.clone()
        };
        let (stale, _) = login(&pool, &expired, "asha@example.com", "Masala@123")
            .await
            .unwrap();
        assert!(matches!(
            current_principal(&pool, &expired, &stale).await,
            Err(AuthError::Unauthenticated)
        ));
        assert_eq!(purge_expired_sessions(&pool).await.unwrap(), 1);
    }

    #[tokio::test]
    async fn test_token_from_other_secret_is_rejected() {
        let pool = db::connect_in_memory().await.unwrap();
        let config = AuthConfig::default();
        insert_user(&pool, "asha@example.com", "Masala@123", UserRole::User).await;
        let (token, _) = login(&pool, &config, "asha@example.com", "Masala@123")
            .await
            .unwrap();

        let rotated = AuthConfig {
            session_secret: "rotated".to_string(),
            ..config
        };
        assert!(current_principal(&pool, &rotated, &token).await.is_err());
    }

    #[tokio::test]
    async fn test_ensure_admin_user_is_idempotent() {
        let pool = db::connect_in_memory().await.unwrap();
        let config = AuthConfig {
            admin_email: Some("Admin@CraveIt.local".to_string()),
            admin_password: Some("Adm1n!pass".to_string()),
            ..AuthConfig::default()
        };

        ensure_admin_user(&pool, &config).await.unwrap();
        ensure_admin_user(&pool, &config).await.unwrap();

        let admins: Vec<User> = sqlx::query_as("SELECT * FROM users WHERE role = 'admin'")
            .fetch_all(&pool)
            .await
            .unwrap();
        assert_eq!(admins.len(), 1);
        assert_eq!(admins[0].email, "admin@craveit.local");

        let (_, user) = login(&pool, &config, "admin@craveit.local", "Adm1n!pass")
            .await
            .unwrap();
        assert_eq!(user.role_enum(), UserRole::Admin);
    }

    #[tokio::test]
    async fn test_ensure_admin_user_without_config_does_nothing() {
        let pool = db::connect_in_memory().await.unwrap();
        ensure_admin_user(&pool, &AuthConfig::default()).await.unwrap();
        let count: (i64,) = sqlx::query_as("SELECT COUNT(*) FROM users")
            .fetch_one(&pool)
            .await
            .unwrap();
        assert_eq!(count.0, 0);
    }
}
