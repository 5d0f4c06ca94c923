use axum::{Json, extract::State, http::header, response::IntoResponse};
use garde::Validate;
use serde::Deserialize;

use crate::error::AppError;
use crate::handlers::ValidatedJson;
use crate::models::ApiResponse;
use crate::state::AppState;

/// ログインリクエスト
#[derive(Debug, Deserialize, Validate)]
pub struct LoginRequest {
    /// ユーザーのメールアドレス
    #[serde(default)]
    #[garde(length(min = 1))]
    pub email: String,
    /// ユーザーのパスワード
    #[serde(default)]
    #[garde(length(min = 1))]
    pub password: String,
}

/// ログインハンドラー
///
/// POST /api/v1/login
///
/// 処理フロー:
/// 1. リクエストバリデーション
/// 2. ユーザー認証（DB照合）と最終ログイン時刻の更新
/// 3. セッションCookieを設定してユーザーを返却
pub async fn login(
    State(state): State<AppState>,
    ValidatedJson(request): ValidatedJson<LoginRequest>,
) -> Result<impl IntoResponse, AppError> {
    let authenticated = state
        .auth
        .login(&request.email, &request.password)
        .await?;

    let cookie = state.auth.sessions().cookie(&authenticated.session_token);

    Ok((
        [(header::SET_COOKIE, cookie)],
        Json(ApiResponse::with_user(
            Some("ログインしました".to_string()),
            authenticated.user,
        )),
    ))
}
