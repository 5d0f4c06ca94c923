use async_trait::async_trait;

use crate::error::AppError;

/// 通知（メール）送信の能力境界
///
/// 状態遷移はこのトレイトにのみ依存し、配送手段には依存しない。
#[async_trait]
pub trait Notifier: Send + Sync {
    /// メール検証コードを送信
    async fn send_verification_code(&self, to: &str, code: &str) -> Result<(), AppError>;

    /// 検証完了後のウェルカムメールを送信
    async fn send_welcome(&self, to: &str, name: &str) -> Result<(), AppError>;

    /// パスワードリセットリンクを送信
    async fn send_password_reset_link(&self, to: &str, reset_url: &str) -> Result<(), AppError>;

    /// パスワードリセット完了通知を送信
    async fn send_password_reset_success(&self, to: &str) -> Result<(), AppError>;
}

/// ログ出力のみの通知（開発環境用）
///
/// # Security
/// コード・リセットURLは trace レベルでのみ出力する（既定のフィルタでは出ない）。
/// 本番で選ばれた場合は起動時に警告する
#[derive(Clone, Default)]
pub struct LogNotifier;

#[async_trait]
impl Notifier for LogNotifier {
    async fn send_verification_code(&self, to: &str, code: &str) -> Result<(), AppError> {
        tracing::info!(to = %to, "検証コードメール送信（開発モード）");
        tracing::trace!("検証コード: {}", code);
        Ok(())
    }

    async fn send_welcome(&self, to: &str, name: &str) -> Result<(), AppError> {
        tracing::info!(to = %to, name = %name, "ウェルカムメール送信（開発モード）");
        Ok(())
    }

    async fn send_password_reset_link(&self, to: &str, reset_url: &str) -> Result<(), AppError> {
        tracing::info!(to = %to, "パスワードリセットメール送信（開発モード）");
        tracing::trace!("リセットURL: {}", reset_url);
        Ok(())
    }

    async fn send_password_reset_success(&self, to: &str) -> Result<(), AppError> {
        tracing::info!(to = %to, "パスワードリセット完了メール送信（開発モード）");
        Ok(())
    }
}

/// 送信された通知の記録（テスト用）
#[cfg(test)]
pub mod testing {
    use std::sync::{Arc, Mutex};

    use super::*;

    #[derive(Debug, Clone, PartialEq, Eq)]
    pub enum Sent {
        VerificationCode { to: String, code: String },
        Welcome { to: String, name: String },
        PasswordResetLink { to: String, reset_url: String },
        PasswordResetSuccess { to: String },
    }

    /// 送信内容を記録し、指定した種類だけ失敗させられるフェイク
    #[derive(Clone, Default)]
    pub struct RecordingNotifier {
        sent: Arc<Mutex<Vec<Sent>>>,
        fail_welcome: bool,
        fail_reset_link: bool,
        fail_verification: bool,
    }

    impl RecordingNotifier {
        pub fn new() -> Self {
            Self::default()
        }

        pub fn failing_welcome() -> Self {
            Self {
                fail_welcome: true,
                ..Self::default()
            }
        }

        pub fn failing_reset_link() -> Self {
            Self {
                fail_reset_link: true,
                ..Self::default()
            }
        }

        pub fn failing_verification() -> Self {
            Self {
                fail_verification: true,
                ..Self::default()
            }
        }

        pub fn sent(&self) -> Vec<Sent> {
            self.sent.lock().unwrap().clone()
        }

        /// 最後に送った検証コード
        pub fn last_code(&self, email: &str) -> Option<String> {
            self.sent().into_iter().rev().find_map(|s| match s {
                Sent::VerificationCode { to, code } if to == email => Some(code),
                _ => None,
            })
        }

        /// 最後に送ったリセットURL末尾のトークン
        pub fn last_reset_token(&self, email: &str) -> Option<String> {
            self.sent().into_iter().rev().find_map(|s| match s {
                Sent::PasswordResetLink { to, reset_url } if to == email => {
                    reset_url.rsplit('/').next().map(str::to_string)
                }
                _ => None,
            })
        }

        fn record(&self, sent: Sent) {
            self.sent.lock().unwrap().push(sent);
        }
    }

    #[async_trait]
    impl Notifier for RecordingNotifier {
        async fn send_verification_code(&self, to: &str, code: &str) -> Result<(), AppError> {
            if self.fail_verification {
                return Err(AppError::Delivery("verification send failed".to_string()));
            }
            self.record(Sent::VerificationCode {
                to: to.to_string(),
                code: code.to_string(),
            });
            Ok(())
        }

        async fn send_welcome(&self, to: &str, name: &str) -> Result<(), AppError> {
            if self.fail_welcome {
                return Err(AppError::Delivery("welcome send failed".to_string()));
            }
            self.record(Sent::Welcome {
                to: to.to_string(),
                name: name.to_string(),
            });
            Ok(())
        }

        async fn send_password_reset_link(
            &self,
            to: &str,
            reset_url: &str,
        ) -> Result<(), AppError> {
            if self.fail_reset_link {
                return Err(AppError::Delivery("reset link send failed".to_string()));
            }
            self.record(Sent::PasswordResetLink {
                to: to.to_string(),
                reset_url: reset_url.to_string(),
            });
            Ok(())
        }

        async fn send_password_reset_success(&self, to: &str) -> Result<(), AppError> {
            self.record(Sent::PasswordResetSuccess { to: to.to_string() });
            Ok(())
        }
    }
}
