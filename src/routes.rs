use axum::{
    Router,
    http::{HeaderValue, Method, header},
    routing::{get, post},
};
use tower_http::cors::CorsLayer;

use crate::handlers;
use crate::state::AppState;

/// Router の構築
///
/// CORS は CLIENT_URL のみ許可し、Cookie 送信（credentials）を有効にする
pub fn create_router(state: AppState) -> anyhow::Result<Router> {
    let cors = cors_layer(&state.config.client_url)?;

    let api = Router::new()
        .route("/check-auth", get(handlers::check_auth))
        .route("/signup", post(handlers::signup))
        .route("/login", post(handlers::login))
        .route("/logout", post(handlers::logout))
        .route("/verify-email", post(handlers::verify_email))
        .route("/resend-verification", post(handlers::resend_verification))
        .route("/forgot-password", post(handlers::forgot_password))
        .route("/reset-password/{token}", post(handlers::reset_password));

    Ok(Router::new()
        .route("/api/health", get(handlers::health_check))
        .nest("/api/v1", api)
        .layer(cors)
        .with_state(state))
}

fn cors_layer(client_url: &str) -> anyhow::Result<CorsLayer> {
    let origin = HeaderValue::from_str(client_url.trim_end_matches('/'))
        .map_err(|e| anyhow::anyhow!("invalid CLIENT_URL {}: {}", client_url, e))?;

    Ok(CorsLayer::new()
        .allow_origin(origin)
        .allow_credentials(true)
        .allow_methods([Method::GET, Method::POST])
        .allow_headers([header::CONTENT_TYPE, header::AUTHORIZATION]))
}
