use axum::{Json, extract::State, http::header, response::IntoResponse};

use crate::models::ApiResponse;
use crate::state::AppState;

/// ログアウトハンドラー
///
/// POST /api/v1/logout
///
/// セッションCookieを削除するのみ。何度呼んでも成功する。
pub async fn logout(State(state): State<AppState>) -> impl IntoResponse {
    let cookie = state.auth.logout();

    (
        [(header::SET_COOKIE, cookie)],
        Json(ApiResponse::ok("ログアウトしました")),
    )
}
