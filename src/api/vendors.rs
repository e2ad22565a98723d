use axum::{
    extract::{multipart::MultipartError, Multipart, Path, Query, State},
    http::StatusCode,
    Json,
};
use std::sync::Arc;

use super::error::ApiError;
use super::validation::{validate_application, validate_banner, ApplicationForm};
use crate::auth::Principal;
use crate::db::{
    ApplicationResponse, PaginationQuery, SubmitApplicationResponse, VendorResponse,
};
use crate::directory::{self, Page};
use crate::storage::BannerUpload;
use crate::workflow;
use crate::AppState;

fn multipart_error(err: MultipartError) -> ApiError {
    if err.status() == StatusCode::PAYLOAD_TOO_LARGE {
        ApiError::payload_too_large("Upload is too large")
    } else {
        ApiError::bad_request(err.body_text())
    }
}

/// Collect the text fields and the banner from the form
async fn read_application_form(
    multipart: &mut Multipart,
) -> Result<(ApplicationForm, Option<BannerUpload>), ApiError> {
    let mut form = ApplicationForm::default();
    let mut banner = None;

    while let Some(field) = multipart.next_field().await.map_err(multipart_error)? {
        let name = field.name().unwrap_or_default().to_string();
        if name == "banner" {
            let file_name = field.file_name().map(str::to_string);
            let bytes = field.bytes().await.map_err(multipart_error)?;
            banner = Some(BannerUpload { file_name, bytes });
            continue;
        }

        let slot = match name.as_str() {
            "name" => &mut form.name,
            "mobile" => &mut form.mobile,
            "categories" => &mut form.categories,
            "address" => &mut form.address,
            "latitude" => &mut form.latitude,
            "longitude" => &mut form.longitude,
            other => {
                tracing::debug!(field = %other, "Ignoring unknown form field");
                continue;
            }
        };
        *slot = Some(field.text().await.map_err(multipart_error)?);
    }

    Ok((form, banner))
}

/// POST /vendors/apply
pub async fn apply(
    State(state): State<Arc<AppState>>,
    principal: Principal,
    mut multipart: Multipart,
) -> Result<(StatusCode, Json<SubmitApplicationResponse>), ApiError> {
    let (form, banner) = read_application_form(&mut multipart).await?;

    let fields = validate_application(&form)?;
    let banner = banner
        .filter(|b| !b.bytes.is_empty())
        .ok_or_else(|| ApiError::validation_field("banner", "Banner image is required"))?;
    let format = validate_banner(&banner.bytes, state.config.server.max_upload_bytes)
        .map_err(|e| ApiError::validation_field("banner", e))?;
    tracing::debug!(user_id = %principal.id, format = format.mime_type(), "Banner accepted");

    let application = workflow::submit_application(
        &state.db,
        state.blobs.as_ref(),
        &principal.id,
        fields,
        banner,
    )
    .await?;

    Ok((
        StatusCode::CREATED,
        Json(SubmitApplicationResponse {
            msg: "Application submitted".to_string(),
            application: application.into(),
        }),
    ))
}

/// GET /vendors/vendor-applications
pub async fn list_approved(
    State(state): State<Arc<AppState>>,
    Query(query): Query<PaginationQuery>,
) -> Result<Json<Vec<ApplicationResponse>>, ApiError> {
    let page = Page::from_query(query.skip.as_deref(), query.limit.as_deref());
    let rows = directory::list_approved(&state.db, page).await?;
    Ok(Json(rows.into_iter().map(ApplicationResponse::from).collect()))
}

/// GET /vendors/by-category/:category
pub async fn by_category(
    State(state): State<Arc<AppState>>,
    Path(category): Path<String>,
) -> Result<Json<Vec<ApplicationResponse>>, ApiError> {
    if category.trim().is_empty() {
        return Err(ApiError::validation_field("category", "Category is required"));
    }
    let rows = directory::find_by_category(&state.db, &category).await?;
    Ok(Json(rows.into_iter().map(ApplicationResponse::from).collect()))
}

/// GET /vendors
pub async fn list_vendors(
    State(state): State<Arc<AppState>>,
) -> Result<Json<Vec<VendorResponse>>, ApiError> {
    let vendors = directory::list_vendors(&state.db).await?;
    Ok(Json(vendors.into_iter().map(VendorResponse::from).collect()))
}
