use base64::{Engine as _, engine::general_purpose::URL_SAFE_NO_PAD};
use rand::rngs::OsRng;
use rand::{Rng, RngCore};
use sha2::{Digest, Sha256};
use time::{Duration, OffsetDateTime};

/// リセットトークンのバイト長（256ビット）
const RESET_TOKEN_BYTES: usize = 32;

/// トークンの有効期間
#[derive(Debug, Clone, Copy)]
pub struct TokenPolicy {
    pub verification_ttl: Duration,
    pub reset_ttl: Duration,
}

impl Default for TokenPolicy {
    fn default() -> Self {
        Self {
            verification_ttl: Duration::hours(24),
            reset_ttl: Duration::minutes(15),
        }
    }
}

/// 発行済みトークンと有効期限
#[derive(Debug, Clone)]
pub struct IssuedToken {
    pub token: String,
    pub expires_at: OffsetDateTime,
}

/// 検証コード・リセットトークンの生成
///
/// # Security
/// - 乱数源は OS の CSPRNG
/// - 生成したトークンはログに出力しない
#[derive(Debug, Clone, Default)]
pub struct TokenGenerator {
    policy: TokenPolicy,
}

impl TokenGenerator {
    pub fn new(policy: TokenPolicy) -> Self {
        Self { policy }
    }

    /// 6桁の数字コード（100000〜999999）を生成
    ///
    /// 利用者が手入力するため低エントロピー。メール到達性と有効期限で補う。
    pub fn new_verification_code(&self, now: OffsetDateTime) -> IssuedToken {
        let code: u32 = OsRng.gen_range(100_000..=999_999);
        IssuedToken {
            token: code.to_string(),
            expires_at: now + self.policy.verification_ttl,
        }
    }

    /// 32バイトのランダムトークンを生成（URL-safe Base64）
    pub fn new_reset_token(&self, now: OffsetDateTime) -> IssuedToken {
        let mut bytes = [0u8; RESET_TOKEN_BYTES];
        OsRng.fill_bytes(&mut bytes);
        IssuedToken {
            token: URL_SAFE_NO_PAD.encode(bytes),
            expires_at: now + self.policy.reset_ttl,
        }
    }

    /// トークンをSHA256でハッシュ化
    pub fn hash_token(token: &str) -> String {
        let mut hasher = Sha256::new();
        hasher.update(token.as_bytes());
        format!("{:x}", hasher.finalize())
    }
}
