use axum::{
    Json,
    http::StatusCode,
    response::{IntoResponse, Response},
};

use crate::models::ApiResponse;

#[derive(Debug, thiserror::Error)]
pub enum AppError {
    #[error("バリデーションエラー: {0}")]
    Validation(String),

    #[error("このメールアドレスは既に使用されています")]
    EmailAlreadyExists,

    #[error("ユーザーが見つかりません")]
    NotFound,

    #[error("メールアドレスまたはパスワードが正しくありません")]
    InvalidCredentials,

    #[error("無効または期限切れのトークンです")]
    InvalidToken,

    #[error("パスワードが一致しません")]
    PasswordMismatch,

    #[error("認証が必要です")]
    Unauthenticated,

    #[error("メール送信エラー: {0}")]
    Delivery(String),

    #[error("データベースエラー")]
    Database(#[from] sqlx::Error),

    #[error("内部エラー")]
    Internal(#[from] anyhow::Error),
}

impl AppError {
    /// レスポンスのステータスとメッセージ
    ///
    /// 内部エラーの詳細はクライアントに返さずログにのみ出力する
    fn status_and_message(&self) -> (StatusCode, String) {
        match self {
            Self::Validation(msg) => (StatusCode::BAD_REQUEST, msg.clone()),
            Self::EmailAlreadyExists | Self::NotFound | Self::PasswordMismatch => {
                (StatusCode::BAD_REQUEST, self.to_string())
            }
            Self::InvalidCredentials | Self::InvalidToken => {
                (StatusCode::BAD_REQUEST, self.to_string())
            }
            Self::Unauthenticated => (StatusCode::UNAUTHORIZED, self.to_string()),
            Self::Delivery(detail) => {
                tracing::error!(error = %detail, "メール送信エラー");
                (
                    StatusCode::BAD_REQUEST,
                    "メールの送信に失敗しました".to_string(),
                )
            }
            Self::Database(e) => {
                tracing::error!(error = ?e, "データベースエラー");
                (
                    StatusCode::INTERNAL_SERVER_ERROR,
                    "内部エラーが発生しました".to_string(),
                )
            }
            Self::Internal(e) => {
                tracing::error!(error = ?e, "内部エラー");
                (
                    StatusCode::INTERNAL_SERVER_ERROR,
                    "内部エラーが発生しました".to_string(),
                )
            }
        }
    }
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let (status, message) = self.status_and_message();
        (status, Json(ApiResponse::failure(message))).into_response()
    }
}
