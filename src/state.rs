use std::sync::Arc;

use secrecy::ExposeSecret;

use crate::config::Config;
use crate::repositories::UserStore;
use crate::services::{AuthService, Notifier, SessionIssuer, TokenGenerator, TokenPolicy};

/// アプリケーション共有状態
///
/// axum の State として全ハンドラーで共有される。
/// Clone は必須（axum が内部で clone するため）。
#[derive(Clone)]
pub struct AppState {
    /// アプリケーション設定（Arc で共有）
    pub config: Arc<Config>,
    /// 認証状態遷移サービス
    pub auth: AuthService,
}

impl AppState {
    /// 新しい AppState を作成
    ///
    /// 設定はここで一度だけ読み取り、各コンポーネントへ注入する
    pub fn new(config: Config, store: Arc<dyn UserStore>, notifier: Arc<dyn Notifier>) -> Self {
        let config = Arc::new(config);

        let tokens = TokenGenerator::new(TokenPolicy {
            verification_ttl: config.verification_token_ttl(),
            reset_ttl: config.reset_token_ttl(),
        });
        let sessions = SessionIssuer::new(
            config.jwt_secret.expose_secret(),
            config.session_ttl(),
            config.cookie_secure,
        );

        let auth = AuthService::new(store, notifier, tokens, sessions, config.client_url.clone());

        Self { config, auth }
    }
}
