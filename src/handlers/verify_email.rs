use axum::{Json, extract::State};
use garde::Validate;
use serde::Deserialize;

use crate::error::AppError;
use crate::handlers::ValidatedJson;
use crate::models::ApiResponse;
use crate::state::AppState;

// === メールアドレス検証 ===

#[derive(Debug, Deserialize, Validate)]
pub struct VerifyEmailRequest {
    #[serde(default)]
    #[garde(length(min = 1))]
    pub code: String,
}

/// POST /api/v1/verify-email
pub async fn verify_email(
    State(state): State<AppState>,
    ValidatedJson(request): ValidatedJson<VerifyEmailRequest>,
) -> Result<Json<ApiResponse>, AppError> {
    let user = state.auth.verify_email(&request.code).await?;

    Ok(Json(ApiResponse::with_user(
        Some("メールアドレスを確認しました".to_string()),
        user,
    )))
}

// === 確認コード再送 ===

#[derive(Debug, Deserialize, Validate)]
pub struct ResendVerificationRequest {
    #[serde(default)]
    #[garde(email)]
    pub email: String,
}

/// POST /api/v1/resend-verification
///
/// # Security
/// 常に200を返す（ユーザー存在有無を漏洩しない）
pub async fn resend_verification(
    State(state): State<AppState>,
    ValidatedJson(request): ValidatedJson<ResendVerificationRequest>,
) -> Result<Json<ApiResponse>, AppError> {
    state.auth.resend_verification(&request.email).await?;

    Ok(Json(ApiResponse::ok(
        "確認が必要なアカウントであれば、確認コードを送信しました",
    )))
}
