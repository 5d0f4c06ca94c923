use secrecy::SecretBox;
use serde::Deserialize;
use time::Duration;

/// ユーザーストアの実装種別
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum StoreKind {
    Postgres,
    /// 開発・テスト用（プロセス終了で消える）
    Memory,
}

#[derive(Debug, Deserialize)]
pub struct Config {
    #[serde(default)]
    pub database_url: Option<SecretBox<String>>,
    #[serde(default = "default_store")]
    pub store: StoreKind,
    #[serde(default = "default_host")]
    pub host: String,
    #[serde(default = "default_port")]
    pub port: u16,

    // セッション設定
    /// セッショントークン署名用シークレット
    pub jwt_secret: SecretBox<String>,
    #[serde(default = "default_session_ttl_secs")]
    pub session_ttl_secs: i64,
    /// Cookie に Secure 属性を付与するか（ローカル開発では false）
    #[serde(default = "default_cookie_secure")]
    pub cookie_secure: bool,

    // トークン設定
    #[serde(default = "default_verification_token_ttl_secs")]
    pub verification_token_ttl_secs: i64,
    #[serde(default = "default_reset_token_ttl_secs")]
    pub reset_token_ttl_secs: i64,
    /// 期限切れトークン掃除の間隔（0 で無効）
    #[serde(default = "default_token_sweep_interval_secs")]
    pub token_sweep_interval_secs: u64,

    /// フロントエンドのオリジン（CORS許可 + リセットURLのベース）
    #[serde(default = "default_client_url")]
    pub client_url: String,

    // メール送信者設定
    #[serde(default = "default_email_from_address")]
    pub email_from_address: String,
    #[serde(default = "default_email_from_name")]
    pub email_from_name: String,

    // Mailtrap 送信API（オプション）
    pub mailtrap_api_token: Option<SecretBox<String>>,
    #[serde(default = "default_mailtrap_api_url")]
    pub mailtrap_api_url: String,

    // SMTP設定（オプション - email機能有効時のみ使用）
    #[serde(default)]
    pub smtp_host: Option<String>,
    #[serde(default = "default_smtp_port")]
    pub smtp_port: u16,
    pub smtp_username: Option<SecretBox<String>>,
    pub smtp_password: Option<SecretBox<String>>,
}

const DEFAULT_HOST: &str = "0.0.0.0";
const DEFAULT_PORT: u16 = 5000;
const DEFAULT_SESSION_TTL_SECS: i64 = 7 * 24 * 60 * 60;
const DEFAULT_VERIFICATION_TOKEN_TTL_SECS: i64 = 24 * 60 * 60;
const DEFAULT_RESET_TOKEN_TTL_SECS: i64 = 15 * 60;
const DEFAULT_TOKEN_SWEEP_INTERVAL_SECS: u64 = 3600;
const DEFAULT_CLIENT_URL: &str = "http://localhost:5173";
const DEFAULT_EMAIL_FROM_ADDRESS: &str = "hello@demomailtrap.com";
const DEFAULT_EMAIL_FROM_NAME: &str = "authflow";
const DEFAULT_MAILTRAP_API_URL: &str = "https://send.api.mailtrap.io/api/send";
const DEFAULT_SMTP_PORT: u16 = 587;

fn default_store() -> StoreKind {
    StoreKind::Postgres
}

fn default_host() -> String {
    DEFAULT_HOST.to_string()
}

fn default_port() -> u16 {
    DEFAULT_PORT
}

fn default_session_ttl_secs() -> i64 {
    DEFAULT_SESSION_TTL_SECS
}

fn default_cookie_secure() -> bool {
    true
}

fn default_verification_token_ttl_secs() -> i64 {
    DEFAULT_VERIFICATION_TOKEN_TTL_SECS
}

fn default_reset_token_ttl_secs() -> i64 {
    DEFAULT_RESET_TOKEN_TTL_SECS
}

fn default_token_sweep_interval_secs() -> u64 {
    DEFAULT_TOKEN_SWEEP_INTERVAL_SECS
}

fn default_client_url() -> String {
    DEFAULT_CLIENT_URL.to_string()
}

fn default_email_from_address() -> String {
    DEFAULT_EMAIL_FROM_ADDRESS.to_string()
}

fn default_email_from_name() -> String {
    DEFAULT_EMAIL_FROM_NAME.to_string()
}

fn default_mailtrap_api_url() -> String {
    DEFAULT_MAILTRAP_API_URL.to_string()
}

fn default_smtp_port() -> u16 {
    DEFAULT_SMTP_PORT
}

impl Config {
    pub fn load() -> Result<Self, envy::Error> {
        envy::from_env()
    }

    pub fn session_ttl(&self) -> Duration {
        Duration::seconds(self.session_ttl_secs)
    }

    pub fn verification_token_ttl(&self) -> Duration {
        Duration::seconds(self.verification_token_ttl_secs)
    }

    pub fn reset_token_ttl(&self) -> Duration {
        Duration::seconds(self.reset_token_ttl_secs)
    }

    /// SMTP設定が揃っているか
    pub fn smtp_configured(&self) -> bool {
        self.smtp_host.is_some() && self.smtp_username.is_some() && self.smtp_password.is_some()
    }
}
