use axum::{extract::State, Json};
use axum_extra::extract::cookie::CookieJar;
use std::sync::Arc;

use super::auth::{http_only_cookie, removal_cookie};
use super::error::ApiError;
use super::validation::validate_signup;
use crate::db::{MessageResponse, SignupRequest, VerifyOtpRequest};
use crate::signup;
use crate::AppState;

/// POST /auth/signup/request-otp
pub async fn request_otp(
    State(state): State<Arc<AppState>>,
    jar: CookieJar,
    Json(request): Json<SignupRequest>,
) -> Result<(CookieJar, Json<MessageResponse>), ApiError> {
    validate_signup(&request)?;

    let cookie_name = &state.config.signup.challenge_cookie;
    let existing = jar.get(cookie_name).map(|c| c.value().to_string());

    let challenge_id = signup::request_signup(
        &state.db,
        &state.challenges,
        &state.notifier,
        existing.as_deref(),
        request,
    )
    .await?;

    let jar = jar.add(http_only_cookie(&state, cookie_name, challenge_id));
    Ok((jar, Json(MessageResponse::new("OTP sent to your email"))))
}

/// POST /auth/signup/verify-otp
pub async fn verify_otp(
    State(state): State<Arc<AppState>>,
    jar: CookieJar,
    Json(request): Json<VerifyOtpRequest>,
) -> Result<(CookieJar, Json<MessageResponse>), ApiError> {
    let code = request.otp.into_string();
    if code.is_empty() {
        return Err(ApiError::validation_field("otp", "OTP is required"));
    }

    let cookie_name = &state.config.signup.challenge_cookie;
    let challenge_id = jar.get(cookie_name).map(|c| c.value().to_string());

    signup::verify_signup(&state.db, &state.challenges, challenge_id.as_deref(), &code).await?;

    let jar = jar.remove(removal_cookie(cookie_name));
    Ok((jar, Json(MessageResponse::new("Signup successful"))))
}
