//! Login, logout and the session guard for protected routes.

use axum::{
    async_trait,
    body::Body,
    extract::{FromRequestParts, State},
    http::{header, request::Parts, HeaderMap, Request},
    middleware::Next,
    response::Response,
    Json,
};
use axum_extra::extract::cookie::{Cookie, CookieJar, SameSite};
use std::sync::Arc;

use super::error::{ApiError, ValidationErrorBuilder};
use crate::auth::{self, AuthError, Principal};
use crate::db::{CurrentUserResponse, LoginRequest, LoginResponse, MessageResponse, UserRole};
use crate::AppState;

/// Build an HttpOnly cookie scoped to the whole site
pub(crate) fn http_only_cookie(state: &AppState, name: &str, value: String) -> Cookie<'static> {
    Cookie::build((name.to_string(), value))
        .path("/")
        .http_only(true)
        .same_site(SameSite::Lax)
        .secure(state.config.auth.cookie_secure)
        .build()
}

/// A cookie that tells the browser to drop `name`
pub(crate) fn removal_cookie(name: &str) -> Cookie<'static> {
    Cookie::build((name.to_string(), String::new()))
        .path("/")
        .build()
}

/// Session token from the session cookie or an `Authorization: Bearer` header
fn session_token(headers: &HeaderMap, cookie_name: &str) -> Option<String> {
    if let Some(cookie) = CookieJar::from_headers(headers).get(cookie_name) {
        if !cookie.value().is_empty() {
            return Some(cookie.value().to_string());
        }
    }

    headers
        .get(header::AUTHORIZATION)
        .and_then(|h| h.to_str().ok())
        .and_then(|h| h.strip_prefix("Bearer "))
        .map(|t| t.trim().to_string())
        .filter(|t| !t.is_empty())
}

/// Resolve the request's principal, if it carries a live session
async fn resolve_principal(
    state: &AppState,
    headers: &HeaderMap,
) -> Result<Option<Principal>, ApiError> {
    let Some(token) = session_token(headers, &state.config.auth.cookie_name) else {
        return Ok(None);
    };
    match auth::current_principal(&state.db, &state.config.auth, &token).await {
        Ok(principal) => Ok(Some(principal)),
        Err(AuthError::Unauthenticated) => Ok(None),
        Err(e) => Err(e.into()),
    }
}

async fn guard(
    state: &AppState,
    mut request: Request<Body>,
    next: Next,
    roles: &[UserRole],
) -> Result<Response, ApiError> {
    let principal = resolve_principal(state, request.headers()).await?;
    let principal = auth::authorize(principal.as_ref(), roles)?.clone();
    request.extensions_mut().insert(principal);
    Ok(next.run(request).await)
}

/// Middleware: any authenticated principal
pub async fn require_auth(
    State(state): State<Arc<AppState>>,
    request: Request<Body>,
    next: Next,
) -> Result<Response, ApiError> {
    guard(&state, request, next, &[]).await
}

/// Middleware: admins only
pub async fn require_admin(
    State(state): State<Arc<AppState>>,
    request: Request<Body>,
    next: Next,
) -> Result<Response, ApiError> {
    guard(&state, request, next, &[UserRole::Admin]).await
}

/// Extracts the principal placed by the guard middleware, resolving the
/// session itself when used on a route without one
#[async_trait]
impl FromRequestParts<Arc<AppState>> for Principal {
    type Rejection = ApiError;

    async fn from_request_parts(
        parts: &mut Parts,
        state: &Arc<AppState>,
    ) -> Result<Self, Self::Rejection> {
        if let Some(principal) = parts.extensions.get::<Principal>() {
            return Ok(principal.clone());
        }
        let principal = resolve_principal(state, &parts.headers).await?;
        Ok(auth::authorize(principal.as_ref(), &[])?.clone())
    }
}

/// POST /auth/login
pub async fn login(
    State(state): State<Arc<AppState>>,
    jar: CookieJar,
    Json(request): Json<LoginRequest>,
) -> Result<(CookieJar, Json<LoginResponse>), ApiError> {
    let mut errors = ValidationErrorBuilder::new();
    if request.email.trim().is_empty() {
        errors.add("email", "Email is required");
    }
    if request.password.is_empty() {
        errors.add("password", "Password is required");
    }
    errors.finish()?;

    let (token, user) =
        auth::login(&state.db, &state.config.auth, &request.email, &request.password).await?;

    let mut jar = jar.add(http_only_cookie(
        &state,
        &state.config.auth.cookie_name,
        token,
    ));

    // A finished login abandons any half-done signup
    let challenge_cookie = &state.config.signup.challenge_cookie;
    if let Some(challenge) = jar.get(challenge_cookie).map(|c| c.value().to_string()) {
        state.challenges.discard(&challenge);
        jar = jar.remove(removal_cookie(challenge_cookie));
    }

    Ok((
        jar,
        Json(LoginResponse {
            msg: "Login successful".to_string(),
            user: user.into(),
        }),
    ))
}

/// GET /auth/currentuser
pub async fn current_user(principal: Principal) -> Json<CurrentUserResponse> {
    Json(CurrentUserResponse {
        user: principal.into(),
    })
}

/// POST /auth/logout
pub async fn logout(
    State(state): State<Arc<AppState>>,
    headers: HeaderMap,
    jar: CookieJar,
) -> Result<(CookieJar, Json<MessageResponse>), ApiError> {
    if let Some(token) = session_token(&headers, &state.config.auth.cookie_name) {
        auth::logout(&state.db, &state.config.auth, &token).await?;
    }

    let jar = jar.remove(removal_cookie(&state.config.auth.cookie_name));
    Ok((jar, Json(MessageResponse::new("Logout successful"))))
}
