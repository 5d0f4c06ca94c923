use axum::{
    Json,
    extract::{Path, State},
};
use garde::Validate;
use serde::Deserialize;

use crate::error::AppError;
use crate::handlers::ValidatedJson;
use crate::models::ApiResponse;
use crate::state::AppState;

// === リセットリクエスト ===

#[derive(Debug, Deserialize, Validate)]
pub struct ForgotPasswordRequest {
    #[serde(default)]
    #[garde(email)]
    pub email: String,
}

/// POST /api/v1/forgot-password
///
/// # Security
/// 常に200を返す（ユーザー存在有無を漏洩しない）
pub async fn forgot_password(
    State(state): State<AppState>,
    ValidatedJson(request): ValidatedJson<ForgotPasswordRequest>,
) -> Result<Json<ApiResponse>, AppError> {
    state.auth.forgot_password(&request.email).await?;

    Ok(Json(ApiResponse::ok(
        "パスワードリセット手順をメールで送信しました",
    )))
}

// === パスワードリセット実行 ===

/// 不一致判定をトークン検証より先に行うため、本文の検証はサービス側に任せる
#[derive(Debug, Deserialize, Validate)]
#[serde(rename_all = "camelCase")]
pub struct ResetPasswordRequest {
    #[serde(default)]
    #[garde(skip)]
    pub password: String,
    #[serde(default)]
    #[garde(skip)]
    pub confirm_password: String,
}

/// POST /api/v1/reset-password/{token}
///
/// # Security
/// - token, password はログに出力しない
pub async fn reset_password(
    State(state): State<AppState>,
    Path(token): Path<String>,
    ValidatedJson(request): ValidatedJson<ResetPasswordRequest>,
) -> Result<Json<ApiResponse>, AppError> {
    state
        .auth
        .reset_password(&token, &request.password, &request.confirm_password)
        .await?;

    Ok(Json(ApiResponse::ok("パスワードが更新されました")))
}
