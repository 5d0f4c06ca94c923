use axum::{
    Json,
    extract::State,
    http::{StatusCode, header},
    response::IntoResponse,
};
use garde::Validate;
use serde::Deserialize;

use crate::error::AppError;
use crate::handlers::ValidatedJson;
use crate::models::ApiResponse;
use crate::state::AppState;

#[derive(Debug, Deserialize, Validate)]
pub struct SignupRequest {
    #[serde(default)]
    #[garde(email)]
    pub email: String,
    #[serde(default)]
    #[garde(length(min = 1))]
    pub password: String, // SecretBox不要（Deserialize後すぐハッシュ化）
    #[serde(default)]
    #[garde(length(min = 1))]
    pub name: String,
}

/// ユーザー登録ハンドラー
///
/// POST /api/v1/signup
///
/// 201 とともにセッションCookieを設定する
pub async fn signup(
    State(state): State<AppState>,
    ValidatedJson(request): ValidatedJson<SignupRequest>,
) -> Result<impl IntoResponse, AppError> {
    let authenticated = state
        .auth
        .signup(&request.email, &request.password, &request.name)
        .await?;

    let cookie = state.auth.sessions().cookie(&authenticated.session_token);

    Ok((
        StatusCode::CREATED,
        [(header::SET_COOKIE, cookie)],
        Json(ApiResponse::with_user(
            Some("ユーザーを作成しました".to_string()),
            authenticated.user,
        )),
    ))
}
