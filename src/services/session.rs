use jsonwebtoken::{Algorithm, DecodingKey, EncodingKey, Header, Validation, decode, encode};
use serde::{Deserialize, Serialize};
use time::{Duration, OffsetDateTime};
use uuid::Uuid;

use crate::error::AppError;

/// セッションCookie名
pub const SESSION_COOKIE: &str = "token";

/// セッショントークンのクレーム
#[derive(Debug, Serialize, Deserialize)]
pub struct SessionClaims {
    pub sub: Uuid,
    pub iat: i64,
    pub exp: i64,
}

/// セッション資格情報（署名付きトークン）の発行と検証
///
/// # Security
/// - 署名シークレットはログに出力しない
/// - サーバー側の失効リストは持たない。ログアウトは Cookie 削除のみで、
///   漏洩したトークンは期限まで有効
#[derive(Clone)]
pub struct SessionIssuer {
    encoding: EncodingKey,
    decoding: DecodingKey,
    ttl: Duration,
    cookie_secure: bool,
}

impl SessionIssuer {
    pub fn new(secret: &str, ttl: Duration, cookie_secure: bool) -> Self {
        Self {
            encoding: EncodingKey::from_secret(secret.as_bytes()),
            decoding: DecodingKey::from_secret(secret.as_bytes()),
            ttl,
            cookie_secure,
        }
    }

    /// 現在時刻でトークンを発行
    pub fn issue(&self, user_id: Uuid) -> Result<String, AppError> {
        self.issue_at(user_id, OffsetDateTime::now_utc())
    }

    /// 指定時刻を発行時刻としてトークンを発行
    pub fn issue_at(&self, user_id: Uuid, issued_at: OffsetDateTime) -> Result<String, AppError> {
        let claims = SessionClaims {
            sub: user_id,
            iat: issued_at.unix_timestamp(),
            exp: (issued_at + self.ttl).unix_timestamp(),
        };
        let token = encode(&Header::new(Algorithm::HS256), &claims, &self.encoding).map_err(|e| {
            tracing::error!(error = ?e, "セッショントークン署名エラー");
            AppError::Internal(anyhow::anyhow!("session token signing error"))
        })?;
        tracing::debug!(user_id = %user_id, "セッショントークン発行");
        Ok(token)
    }

    /// トークンを検証してユーザーIDを返す
    pub fn verify(&self, token: &str) -> Result<Uuid, AppError> {
        self.verify_at(token, OffsetDateTime::now_utc())
    }

    /// `now` 時点でトークンを検証
    ///
    /// 署名不一致・形式不正・期限切れ（`now >= exp`）はすべて `Unauthenticated`
    pub fn verify_at(&self, token: &str, now: OffsetDateTime) -> Result<Uuid, AppError> {
        // 期限判定は自前で行う（境界を含めて拒否するため）
        let mut validation = Validation::new(Algorithm::HS256);
        validation.validate_exp = false;
        validation.required_spec_claims.clear();
        validation.leeway = 0;

        let data = decode::<SessionClaims>(token, &self.decoding, &validation).map_err(|e| {
            tracing::warn!(error = %e, "セッショントークン検証失敗");
            AppError::Unauthenticated
        })?;

        if now.unix_timestamp() >= data.claims.exp {
            tracing::warn!(user_id = %data.claims.sub, "セッショントークン期限切れ");
            return Err(AppError::Unauthenticated);
        }

        Ok(data.claims.sub)
    }

    /// セッションCookie（HttpOnly, SameSite=Strict）
    pub fn cookie(&self, token: &str) -> String {
        let mut cookie = format!(
            "{}={}; Path=/; HttpOnly; SameSite=Strict; Max-Age={}",
            SESSION_COOKIE,
            token,
            self.ttl.whole_seconds()
        );
        if self.cookie_secure {
            cookie.push_str("; Secure");
        }
        cookie
    }

    /// セッションCookieを削除するための Set-Cookie 値
    pub fn clear_cookie(&self) -> String {
        let mut cookie = format!("{}=; Path=/; HttpOnly; SameSite=Strict; Max-Age=0", SESSION_COOKIE);
        if self.cookie_secure {
            cookie.push_str("; Secure");
        }
        cookie
    }
}
