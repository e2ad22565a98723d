//! User and session models.

use serde::{Deserialize, Serialize};
use sqlx::FromRow;

/// Account roles. The only automatic transition is `User -> Vendor`,
/// applied when a vendor application is approved.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum UserRole {
    User,
    Vendor,
    Admin,
}

impl UserRole {
    pub fn as_str(&self) -> &'static str {
        match self {
            UserRole::User => "user",
            UserRole::Vendor => "vendor",
            UserRole::Admin => "admin",
        }
    }
}

impl std::fmt::Display for UserRole {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl std::str::FromStr for UserRole {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "user" => Ok(UserRole::User),
            "vendor" => Ok(UserRole::Vendor),
            "admin" => Ok(UserRole::Admin),
            _ => Err(format!("Unknown role: {}", s)),
        }
    }
}

impl From<String> for UserRole {
    fn from(s: String) -> Self {
        s.parse().unwrap_or(UserRole::User)
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, FromRow)]
pub struct User {
    pub id: String,
    pub username: String,
    pub email: String,
    pub password_hash: String,
    pub role: String,
    pub created_at: String,
    pub updated_at: String,
}

impl User {
    pub fn role_enum(&self) -> UserRole {
        UserRole::from(self.role.clone())
    }
}

/// Public profile of a user, never carries the password hash
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct UserResponse {
    pub id: String,
    pub username: String,
    pub email: String,
    pub role: UserRole,
}

impl From<User> for UserResponse {
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

#[derive(Debug, Clone, Serialize, Deserialize, FromRow)]
pub struct Session {
    pub id: String,
    pub user_id: String,
    pub token_hash: String,
    pub expires_at: String,
    pub created_at: String,
}

#[derive(Debug, Deserialize)]
pub struct LoginRequest {
    pub email: String,
    pub password: String,
}

#[derive(Debug, Serialize)]
pub struct LoginResponse {
    pub msg: String,
    pub user: UserResponse,
}

#[derive(Debug, Serialize)]
pub struct CurrentUserResponse {
    pub user: UserResponse,
}

#[derive(Debug, Clone, Deserialize)]
pub struct SignupRequest {
    pub username: String,
    pub email: String,
    pub password: String,
}

/// The code arrives either as a JSON string or a bare number
#[derive(Debug, Clone, Deserialize)]
#[serde(untagged)]
pub enum OtpCode {
    Text(String),
    Number(u64),
}

impl OtpCode {
    pub fn into_string(self) -> String {
        match self {
            OtpCode::Text(s) => s.trim().to_string(),
            OtpCode::Number(n) => n.to_string(),
        }
    }
}

#[derive(Debug, Deserialize)]
pub struct VerifyOtpRequest {
    pub otp: OtpCode,
}

#[derive(Debug, Serialize)]
pub struct MessageResponse {
    pub msg: String,
}

impl MessageResponse {
    pub fn new(msg: impl Into<String>) -> Self {
        Self { msg: msg.into() }
    }
}

#[derive(Debug, Serialize)]
pub struct CountResponse {
    pub count: i64,
}
