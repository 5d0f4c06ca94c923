use async_trait::async_trait;
use time::OffsetDateTime;
use uuid::Uuid;

use crate::error::AppError;
use crate::models::{NewUser, User};

/// 消費対象のトークン種別と、消費によって認可される状態変更
#[derive(Debug, Clone)]
pub enum TokenKind {
    /// メール検証コード。消費すると is_verified = true
    Verification,
    /// パスワードリセットトークン（ハッシュ値で照合）。消費するとパスワードハッシュを差し替える
    PasswordReset { password_hash: String },
}

/// ユーザーレコードの永続化境界
///
/// 状態遷移ロジックはこのトレイトにのみ依存する。
/// 実装は `find_and_consume_token` を単一の不可分操作として提供すること。
#[async_trait]
pub trait UserStore: Send + Sync {
    async fn find_by_id(&self, user_id: Uuid) -> Result<Option<User>, AppError>;

    async fn find_by_email(&self, email: &str) -> Result<Option<User>, AppError>;

    /// 新しいユーザーを作成
    ///
    /// # Errors
    /// メールアドレス重複時: `AppError::EmailAlreadyExists`
    async fn create(&self, new_user: NewUser) -> Result<User, AppError>;

    /// 最終ログイン時刻を更新
    ///
    /// 既存値より古い `at` では巻き戻さない（同時ログインでも単調）
    async fn record_login(&self, user_id: Uuid, at: OffsetDateTime) -> Result<User, AppError>;

    /// 保留中の検証コードを上書き
    async fn set_verification_token(
        &self,
        user_id: Uuid,
        token: &str,
        expires_at: OffsetDateTime,
    ) -> Result<(), AppError>;

    /// 保留中のリセットトークン（ハッシュ）を上書き
    async fn set_reset_token(
        &self,
        user_id: Uuid,
        token_hash: &str,
        expires_at: OffsetDateTime,
    ) -> Result<(), AppError>;

    /// 有効なトークンを持つレコードを探し、認可された変更とトークン削除を同時に適用
    ///
    /// 一致するトークンがない、または `now` 時点で期限切れなら `None`。
    /// 同じトークンで並行に呼ばれても成功するのは一度だけ。
    async fn find_and_consume_token(
        &self,
        kind: TokenKind,
        token: &str,
        now: OffsetDateTime,
    ) -> Result<Option<User>, AppError>;

    /// 期限切れトークンを削除
    ///
    /// # Returns
    /// 更新された行数
    async fn purge_expired_tokens(&self, now: OffsetDateTime) -> Result<u64, AppError>;
}
