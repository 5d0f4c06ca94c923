use axum::{Json, extract::State};

use crate::error::AppError;
use crate::handlers::SessionCredential;
use crate::models::ApiResponse;
use crate::state::AppState;

/// 認証状態確認ハンドラー
///
/// GET /api/v1/check-auth
///
/// 資格情報なし・無効は 401、ユーザー不在は 400
pub async fn check_auth(
    State(state): State<AppState>,
    SessionCredential(credential): SessionCredential,
) -> Result<Json<ApiResponse>, AppError> {
    let user = state.auth.check_auth(&credential).await?;
    Ok(Json(ApiResponse::with_user(None, user)))
}
