use std::future::Future;
use std::sync::{Arc, OnceLock};

use argon2::password_hash::SaltString;
use argon2::password_hash::rand_core::OsRng;
use argon2::{Argon2, PasswordHash, PasswordHasher, PasswordVerifier};
use time::OffsetDateTime;

use crate::error::AppError;
use crate::models::{NewUser, UserView};
use crate::repositories::{TokenKind, UserStore};
use crate::services::{Notifier, SessionIssuer, TokenGenerator};

/// パスワードをargon2idでハッシュ化
pub fn hash_password(password: &str) -> Result<String, AppError> {
    let salt = SaltString::generate(&mut OsRng);
    let argon2 = Argon2::default();
    let hash = argon2
        .hash_password(password.as_bytes(), &salt)
        .map_err(|e| {
            tracing::error!(error = ?e, "パスワードハッシュ生成エラー");
            AppError::Internal(anyhow::anyhow!("password hash error"))
        })?;
    Ok(hash.to_string())
}

/// パスワードを検証（argon2 の比較は定数時間）
pub fn verify_password(password: &str, hash: &str) -> Result<bool, AppError> {
    let parsed_hash = PasswordHash::new(hash).map_err(|e| {
        tracing::error!(error = ?e, "パスワードハッシュのパースエラー");
        AppError::Internal(anyhow::anyhow!("password hash parse error"))
    })?;

    Ok(Argon2::default()
        .verify_password(password.as_bytes(), &parsed_hash)
        .is_ok())
}

/// ユーザー不在時の検証に使うダミーハッシュ
fn dummy_hash() -> Option<&'static str> {
    static DUMMY: OnceLock<Option<String>> = OnceLock::new();
    DUMMY
        .get_or_init(|| hash_password("dummy-password-for-timing").ok())
        .as_deref()
}

/// メールアドレスの正規化（前後空白除去 + 小文字化）
pub fn normalize_email(email: &str) -> String {
    email.trim().to_lowercase()
}

fn require(value: &str, message: &str) -> Result<(), AppError> {
    if value.trim().is_empty() {
        return Err(AppError::Validation(message.to_string()));
    }
    Ok(())
}

/// 認証成功時の結果
#[derive(Debug)]
pub struct Authenticated {
    pub user: UserView,
    /// セッショントークン（Cookie で返す）
    pub session_token: String,
}

/// 認証状態遷移サービス
///
/// 各ユーザーは独立した2軸の状態を持つ:
/// - 未検証 / 検証済み
/// - リセット保留なし / リセット保留中
///
/// トークンを消費する遷移は必ずトークン自体でレコードを特定し、
/// サーバー時刻で期限を判定する。照合と削除はストアの単一操作で行う。
#[derive(Clone)]
pub struct AuthService {
    store: Arc<dyn UserStore>,
    notifier: Arc<dyn Notifier>,
    tokens: TokenGenerator,
    sessions: SessionIssuer,
    client_url: String,
}

impl AuthService {
    pub fn new(
        store: Arc<dyn UserStore>,
        notifier: Arc<dyn Notifier>,
        tokens: TokenGenerator,
        sessions: SessionIssuer,
        client_url: String,
    ) -> Self {
        Self {
            store,
            notifier,
            tokens,
            sessions,
            client_url,
        }
    }

    pub fn sessions(&self) -> &SessionIssuer {
        &self.sessions
    }

    /// ユーザー登録
    ///
    /// # Security
    /// - パスワードはログに出力しない
    /// - パスワードは即座にハッシュ化
    pub async fn signup(
        &self,
        email: &str,
        password: &str,
        name: &str,
    ) -> Result<Authenticated, AppError> {
        require(email, "メールアドレスは必須です")?;
        require(password, "パスワードは必須です")?;
        require(name, "名前は必須です")?;

        let email = normalize_email(email);
        if self.store.find_by_email(&email).await?.is_some() {
            return Err(AppError::EmailAlreadyExists);
        }

        let password_hash = hash_password(password)?;
        let issued = self
            .tokens
            .new_verification_code(OffsetDateTime::now_utc());

        // find_by_email との間に割り込まれた場合もストアが重複を検出する
        let user = self
            .store
            .create(NewUser {
                email: email.clone(),
                password_hash,
                name: name.trim().to_string(),
                verification_token: issued.token.clone(),
                verification_token_expires_at: issued.expires_at,
            })
            .await?;

        let session_token = self.sessions.issue(user.id)?;

        let notifier = self.notifier.clone();
        let code = issued.token;
        spawn_notification("verification_code", async move {
            notifier.send_verification_code(&email, &code).await
        });

        tracing::info!(user_id = %user.id, email = %user.email, "ユーザー登録成功");

        Ok(Authenticated {
            user: UserView::from(user),
            session_token,
        })
    }

    /// メールアドレス検証
    ///
    /// コード照合・is_verified 設定・コード削除は不可分。
    /// ウェルカムメールの送信失敗は操作の失敗として返す。
    pub async fn verify_email(&self, code: &str) -> Result<UserView, AppError> {
        require(code, "確認コードは必須です")?;

        let user = self
            .store
            .find_and_consume_token(TokenKind::Verification, code.trim(), OffsetDateTime::now_utc())
            .await?
            .ok_or_else(|| {
                tracing::warn!("無効または期限切れの確認コード");
                AppError::InvalidToken
            })?;

        tracing::info!(user_id = %user.id, "メールアドレス検証完了");

        self.notifier.send_welcome(&user.email, &user.name).await?;

        Ok(UserView::from(user))
    }

    /// ログイン
    ///
    /// タイミング攻撃対策: ユーザーが存在しない場合もダミーのパスワード検証を実行。
    /// ユーザー不在とパスワード不一致は同じエラーを返す。
    pub async fn login(&self, email: &str, password: &str) -> Result<Authenticated, AppError> {
        require(email, "メールアドレスは必須です")?;
        require(password, "パスワードは必須です")?;

        let email = normalize_email(email);
        let Some(user) = self.store.find_by_email(&email).await? else {
            if let Some(hash) = dummy_hash() {
                let _ = verify_password(password, hash);
            }
            tracing::warn!(email = %email, "ログイン失敗: ユーザー不在");
            return Err(AppError::InvalidCredentials);
        };

        if !verify_password(password, &user.password_hash)? {
            tracing::warn!(user_id = %user.id, "ログイン失敗: パスワード不一致");
            return Err(AppError::InvalidCredentials);
        }

        let user = self
            .store
            .record_login(user.id, OffsetDateTime::now_utc())
            .await?;

        let session_token = self.sessions.issue(user.id)?;

        tracing::info!(user_id = %user.id, "ログイン成功");

        Ok(Authenticated {
            user: UserView::from(user),
            session_token,
        })
    }

    /// ログアウト（Cookie 削除用の Set-Cookie 値を返す）
    ///
    /// サーバー側に失効リストはないため、発行済みトークンは期限まで有効
    pub fn logout(&self) -> String {
        tracing::debug!("ログアウト");
        self.sessions.clear_cookie()
    }

    /// パスワードリセットをリクエスト
    ///
    /// # Security
    /// - ユーザーが存在しない場合も常に成功を返す（情報漏洩防止）
    /// - トークン（平文）は保存もログ出力もしない
    pub async fn forgot_password(&self, email: &str) -> Result<(), AppError> {
        require(email, "メールアドレスは必須です")?;

        let email = normalize_email(email);
        let Some(user) = self.store.find_by_email(&email).await? else {
            tracing::info!(email = %email, "パスワードリセット: ユーザー不在（成功レスポンス返却）");
            return Ok(());
        };

        let issued = self.tokens.new_reset_token(OffsetDateTime::now_utc());
        let token_hash = TokenGenerator::hash_token(&issued.token);

        // 既存の保留中トークンは上書きされる
        self.store
            .set_reset_token(user.id, &token_hash, issued.expires_at)
            .await?;

        let reset_url = self.build_reset_url(&issued.token);
        self.notifier
            .send_password_reset_link(&user.email, &reset_url)
            .await?;

        tracing::info!(user_id = %user.id, "パスワードリセットメール送信完了");

        Ok(())
    }

    /// パスワードをリセット
    ///
    /// 確認用パスワードとの不一致はトークンの有効性に関わらず状態を変えずに拒否する。
    ///
    /// # Security
    /// - トークン・新パスワードはログに出力しない
    pub async fn reset_password(
        &self,
        token: &str,
        password: &str,
        confirm_password: &str,
    ) -> Result<(), AppError> {
        if password != confirm_password {
            return Err(AppError::PasswordMismatch);
        }
        require(token, "リセットトークンは必須です")?;
        require(password, "パスワードは必須です")?;

        let password_hash = hash_password(password)?;
        let token_hash = TokenGenerator::hash_token(token.trim());

        let user = self
            .store
            .find_and_consume_token(
                TokenKind::PasswordReset { password_hash },
                &token_hash,
                OffsetDateTime::now_utc(),
            )
            .await?
            .ok_or_else(|| {
                tracing::warn!("無効または期限切れのリセットトークン");
                AppError::InvalidToken
            })?;

        tracing::info!(user_id = %user.id, "パスワードリセット完了");

        let notifier = self.notifier.clone();
        let email = user.email;
        spawn_notification("password_reset_success", async move {
            notifier.send_password_reset_success(&email).await
        });

        Ok(())
    }

    /// セッショントークンからユーザーを取得
    pub async fn check_auth(&self, credential: &str) -> Result<UserView, AppError> {
        let user_id = self.sessions.verify(credential)?;

        let user = self.store.find_by_id(user_id).await?.ok_or_else(|| {
            tracing::warn!(user_id = %user_id, "セッションのユーザーが存在しない");
            AppError::NotFound
        })?;

        Ok(UserView::from(user))
    }

    /// 確認コードを再発行
    ///
    /// 保留中のコードは新しいコードで置き換えられる。
    /// ユーザー不在・検証済みの場合も成功を返す（情報漏洩防止）。
    pub async fn resend_verification(&self, email: &str) -> Result<(), AppError> {
        require(email, "メールアドレスは必須です")?;

        let email = normalize_email(email);
        let user = match self.store.find_by_email(&email).await? {
            Some(u) if !u.is_verified => u,
            _ => {
                tracing::info!(email = %email, "確認コード再発行: 対象外（成功レスポンス返却）");
                return Ok(());
            }
        };

        let issued = self
            .tokens
            .new_verification_code(OffsetDateTime::now_utc());
        self.store
            .set_verification_token(user.id, &issued.token, issued.expires_at)
            .await?;

        let notifier = self.notifier.clone();
        let code = issued.token;
        spawn_notification("verification_code", async move {
            notifier.send_verification_code(&email, &code).await
        });

        tracing::info!(user_id = %user.id, "確認コード再発行");

        Ok(())
    }

    /// 期限切れトークンを削除
    pub async fn purge_expired_tokens(&self) -> Result<u64, AppError> {
        self.store
            .purge_expired_tokens(OffsetDateTime::now_utc())
            .await
    }

    /// リセットURLを構築
    fn build_reset_url(&self, token: &str) -> String {
        format!(
            "{}/reset-password/{}",
            self.client_url.trim_end_matches('/'),
            token
        )
    }
}

/// ベストエフォートの通知を非同期に送信（失敗はログのみ）
fn spawn_notification<F>(kind: &'static str, send: F)
where
    F: Future<Output = Result<(), AppError>> + Send + 'static,
{
    tokio::spawn(async move {
        if let Err(e) = send.await {
            tracing::warn!(error = %e, kind = kind, "通知送信失敗（ベストエフォート）");
        }
    });
}
