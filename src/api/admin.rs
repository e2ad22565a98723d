//! Moderation endpoints. Every route here sits behind `require_admin`.

use axum::{
    body::Bytes,
    extract::{Path, Query, State},
    Json,
};
use std::sync::Arc;

use super::error::ApiError;
use crate::auth::Principal;
use crate::db::{
    ApplicationResponse, ApplicationStatus, ApprovalResponse, CountResponse,
    ListApplicationsQuery, MessageResponse, RejectApplicationRequest,
};
use crate::workflow;
use crate::AppState;

/// `None` means no filter; `all` and an empty value are accepted as such
fn parse_status_filter(raw: Option<&str>) -> Result<Option<ApplicationStatus>, ApiError> {
    match raw.map(str::trim) {
        None | Some("") => Ok(None),
        Some(s) if s.eq_ignore_ascii_case("all") => Ok(None),
        Some(s) => s.parse::<ApplicationStatus>().map(Some).map_err(|_| {
            ApiError::validation_field(
                "status",
                "Status must be one of pending, approved, rejected or all",
            )
        }),
    }
}

/// GET /admin/vendor-applications
pub async fn list_applications(
    State(state): State<Arc<AppState>>,
    Query(query): Query<ListApplicationsQuery>,
) -> Result<Json<Vec<ApplicationResponse>>, ApiError> {
    let status = parse_status_filter(query.status.as_deref())?;
    let rows = workflow::list_applications(&state.db, status).await?;
    Ok(Json(rows.into_iter().map(ApplicationResponse::from).collect()))
}

/// PATCH /admin/vendor-applications/:id/approve
pub async fn approve(
    State(state): State<Arc<AppState>>,
    admin: Principal,
    Path(id): Path<String>,
) -> Result<Json<ApprovalResponse>, ApiError> {
    let outcome = workflow::approve_application(&state.db, &state.notifier, &id).await?;
    tracing::info!(
        application_id = %id,
        admin_id = %admin.id,
        "Admin approved vendor application"
    );
    Ok(Json(ApprovalResponse {
        msg: "Vendor approved and created".to_string(),
        vendor: outcome.vendor.into(),
    }))
}

/// An empty body means no reason; anything else must be valid JSON
fn parse_reject_body(body: &[u8]) -> Result<RejectApplicationRequest, ApiError> {
    if body.iter().all(u8::is_ascii_whitespace) {
        return Ok(RejectApplicationRequest::default());
    }
    serde_json::from_slice(body)
        .map_err(|e| ApiError::bad_request(format!("Invalid request body: {}", e)))
}

/// PATCH /admin/vendor-applications/:id/reject
pub async fn reject(
    State(state): State<Arc<AppState>>,
    admin: Principal,
    Path(id): Path<String>,
    body: Bytes,
) -> Result<Json<MessageResponse>, ApiError> {
    let request = parse_reject_body(&body)?;
    workflow::reject_application(&state.db, &state.notifier, &id, request.reason.as_deref())
        .await?;
    tracing::info!(
        application_id = %id,
        admin_id = %admin.id,
        "Admin rejected vendor application"
    );
    Ok(Json(MessageResponse::new("Application rejected")))
}

/// GET /admin/users/count
pub async fn count_users(
    State(state): State<Arc<AppState>>,
) -> Result<Json<CountResponse>, ApiError> {
    let count = workflow::count_users(&state.db).await?;
    Ok(Json(CountResponse { count }))
}

/// GET /admin/vendors/count
pub async fn count_vendors(
    State(state): State<Arc<AppState>>,
) -> Result<Json<CountResponse>, ApiError> {
    let count = workflow::count_vendors(&state.db).await?;
    Ok(Json(CountResponse { count }))
}

/// GET /admin/vendors/pending/count
pub async fn count_pending(
    State(state): State<Arc<AppState>>,
) -> Result<Json<CountResponse>, ApiError> {
    let count = workflow::count_pending_applications(&state.db).await?;
    Ok(Json(CountResponse { count }))
}
