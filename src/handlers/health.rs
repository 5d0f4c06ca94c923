use axum::{Json, extract::State};
use serde::Serialize;

use crate::config::StoreKind;
use crate::state::AppState;

/// ヘルスチェックレスポンス
#[derive(Debug, Serialize)]
pub struct HealthResponse {
    pub status: &'static str,
    pub version: &'static str,
    /// 使用中のユーザーストア
    pub store: &'static str,
}

/// ヘルスチェックハンドラー
///
/// GET /api/health
pub async fn health_check(State(state): State<AppState>) -> Json<HealthResponse> {
    let store = match state.config.store {
        StoreKind::Postgres => "postgres",
        StoreKind::Memory => "memory",
    };

    Json(HealthResponse {
        status: "ok",
        version: env!("CARGO_PKG_VERSION"),
        store,
    })
}
