use serde::Serialize;
use sqlx::FromRow;
use time::OffsetDateTime;
use uuid::Uuid;

/// ユーザーレコード
///
/// password_hash と保留中トークンは外部に出さない（レスポンスは `UserView` を使う）
#[derive(Debug, Clone, FromRow)]
pub struct User {
    pub id: Uuid,
    pub email: String,
    pub password_hash: String,
    pub name: String,
    pub is_verified: bool,
    pub verification_token: Option<String>,
    pub verification_token_expires_at: Option<OffsetDateTime>,
    /// リセットトークンのSHA256ハッシュ（平文は保存しない）
    pub reset_password_token: Option<String>,
    pub reset_password_expires_at: Option<OffsetDateTime>,
    pub last_login_at: Option<OffsetDateTime>,
    pub created_at: OffsetDateTime,
    pub updated_at: OffsetDateTime,
}

impl User {
    /// 検証コードが `now` 時点で有効か
    pub fn has_pending_verification(&self, now: OffsetDateTime) -> bool {
        self.verification_token.is_some()
            && self.verification_token_expires_at.is_some_and(|exp| now < exp)
    }

    /// リセットトークンが `now` 時点で有効か
    pub fn has_pending_reset(&self, now: OffsetDateTime) -> bool {
        self.reset_password_token.is_some()
            && self.reset_password_expires_at.is_some_and(|exp| now < exp)
    }
}

/// ユーザー作成時の入力
#[derive(Debug, Clone)]
pub struct NewUser {
    pub email: String,
    pub password_hash: String,
    pub name: String,
    pub verification_token: String,
    pub verification_token_expires_at: OffsetDateTime,
}

/// クライアントに返すユーザー表現
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct UserView {
    pub id: Uuid,
    pub email: String,
    pub name: String,
    pub is_verified: bool,
    #[serde(with = "time::serde::rfc3339::option")]
    pub last_login: Option<OffsetDateTime>,
    #[serde(with = "time::serde::rfc3339")]
    pub created_at: OffsetDateTime,
    #[serde(with = "time::serde::rfc3339")]
    pub updated_at: OffsetDateTime,
}

impl From<&User> for UserView {
    fn from(user: &User) -> Self {
        Self {
            id: user.id,
            email: user.email.clone(),
            name: user.name.clone(),
            is_verified: user.is_verified,
            last_login: user.last_login_at,
            created_at: user.created_at,
            updated_at: user.updated_at,
        }
    }
}

impl From<User> for UserView {
    fn from(user: User) -> Self {
        Self::from(&user)
    }
}
