mod admin;
pub mod auth;
pub mod error;
pub mod rate_limit;
mod signup;
pub mod validation;
mod vendors;

use axum::{
    extract::DefaultBodyLimit,
    http::{header, HeaderValue, Method},
    middleware,
    routing::{get, patch, post},
    Router,
};
use std::sync::Arc;
use std::time::Duration;
use tower_http::{
    cors::CorsLayer, services::ServeDir, set_header::SetResponseHeaderLayer, trace::TraceLayer,
};

use crate::AppState;

/// Room for the text fields that travel with the banner
const FORM_OVERHEAD_BYTES: usize = 64 * 1024;

fn cors_layer(origin: &str) -> CorsLayer {
    let cors = CorsLayer::new()
        .allow_methods([Method::GET, Method::POST, Method::PATCH, Method::OPTIONS])
        .allow_headers([header::CONTENT_TYPE, header::AUTHORIZATION])
        .allow_credentials(true)
        .max_age(Duration::from_secs(60 * 60));

    match HeaderValue::from_str(origin) {
        Ok(origin) => cors.allow_origin(origin),
        Err(_) => {
            tracing::warn!(origin = %origin, "Invalid CORS origin, cross-origin requests disabled");
            cors
        }
    }
}

pub fn create_router(state: Arc<AppState>) -> Router {
    let require_auth = || middleware::from_fn_with_state(state.clone(), auth::require_auth);

    // Credential endpoints get the stricter budget
    let credential_routes = Router::new()
        .route("/signup/request-otp", post(signup::request_otp))
        .route("/signup/verify-otp", post(signup::verify_otp))
        .route("/login", post(auth::login))
        .route_layer(middleware::from_fn_with_state(
            state.clone(),
            rate_limit::rate_limit_auth,
        ));

    let auth_routes = Router::new()
        .route("/currentuser", get(auth::current_user))
        .route_layer(require_auth())
        .route("/logout", post(auth::logout))
        .merge(credential_routes);

    let apply_routes = Router::new()
        .route("/apply", post(vendors::apply))
        .route_layer(require_auth())
        .layer(DefaultBodyLimit::max(
            state.config.server.max_upload_bytes + FORM_OVERHEAD_BYTES,
        ));

    let vendor_routes = Router::new()
        .route("/", get(vendors::list_vendors))
        .route("/vendor-applications", get(vendors::list_approved))
        .route("/by-category/:category", get(vendors::by_category))
        .merge(apply_routes);

    let admin_routes = Router::new()
        .route("/vendor-applications", get(admin::list_applications))
        .route("/vendor-applications/:id/approve", patch(admin::approve))
        .route("/vendor-applications/:id/reject", patch(admin::reject))
        .route("/users/count", get(admin::count_users))
        .route("/vendors/count", get(admin::count_vendors))
        .route("/vendors/pending/count", get(admin::count_pending))
        .route_layer(middleware::from_fn_with_state(
            state.clone(),
            auth::require_admin,
        ));

    // Banners are served as the detected image type only
    let uploads: Router<Arc<AppState>> = Router::new()
        .nest_service("/uploads", ServeDir::new(state.config.server.uploads_dir()))
        .layer(SetResponseHeaderLayer::overriding(
            header::X_CONTENT_TYPE_OPTIONS,
            HeaderValue::from_static("nosniff"),
        ));

    Router::new()
        .nest("/auth", auth_routes)
        .nest("/vendors", vendor_routes)
        .nest("/admin", admin_routes)
        .layer(middleware::from_fn_with_state(
            state.clone(),
            rate_limit::rate_limit_api,
        ))
        .route("/health", get(health_check))
        .merge(uploads)
        .layer(cors_layer(&state.config.server.cors_origin))
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}

async fn health_check() -> &'static str {
    "OK"
}
