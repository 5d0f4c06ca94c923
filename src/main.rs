use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;

use secrecy::ExposeSecret;
use sqlx::postgres::PgPoolOptions;
use tokio::net::TcpListener;
use tracing_subscriber::{EnvFilter, layer::SubscriberExt, util::SubscriberInitExt};

use authflow::{
    config::{Config, StoreKind},
    repositories::{InMemoryUserStore, PgUserStore, UserStore},
    routes::create_router,
    services::{AuthService, EmailNotifier, LogNotifier, MailtrapMailer, Notifier},
    state::AppState,
};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // ログ初期化（JSON形式、環境変数でレベル制御）
    init_tracing();

    tracing::info!("authflow 起動中...");

    // 設定読み込み
    let config = Config::load().map_err(|e| {
        tracing::error!(error = ?e, "設定の読み込みに失敗");
        anyhow::anyhow!("Failed to load config: {}", e)
    })?;

    tracing::info!(host = %config.host, port = %config.port, store = ?config.store, "設定読み込み完了");

    // サーバーアドレスを先に構築（config が move される前に）
    let addr: SocketAddr = format!("{}:{}", config.host, config.port)
        .parse()
        .map_err(|e| {
            tracing::error!(error = ?e, "アドレスのパースに失敗");
            anyhow::anyhow!("Failed to parse address: {}", e)
        })?;

    let store = build_store(&config).await?;
    let notifier = build_notifier(&config)?;
    let sweep_interval = config.token_sweep_interval_secs;

    // AppState 構築
    let state = AppState::new(config, store, notifier);

    if sweep_interval > 0 {
        spawn_token_sweeper(state.auth.clone(), Duration::from_secs(sweep_interval));
    }

    // Router 構築
    let app = create_router(state).map_err(|e| {
        tracing::error!(error = ?e, "Router の構築に失敗");
        e
    })?;

    // サーバー起動
    let listener = TcpListener::bind(&addr).await.map_err(|e| {
        tracing::error!(error = ?e, addr = %addr, "ポートのバインドに失敗");
        anyhow::anyhow!("Failed to bind to {}: {}", addr, e)
    })?;

    tracing::info!(addr = %addr, "サーバー起動");

    // Graceful shutdown 対応
    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await
        .map_err(|e| {
            tracing::error!(error = ?e, "サーバーエラー");
            anyhow::anyhow!("Server error: {}", e)
        })?;

    tracing::info!("サーバー終了");

    Ok(())
}

/// tracing の初期化（JSON形式）
fn init_tracing() {
    let env_filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new("info,authflow=debug"));

    tracing_subscriber::registry()
        .with(env_filter)
        .with(tracing_subscriber::fmt::layer().json())
        .init();
}

/// ユーザーストアの構築
///
/// Postgres の場合は接続とマイグレーションを行う。失敗は起動時のみ致命的。
async fn build_store(config: &Config) -> anyhow::Result<Arc<dyn UserStore>> {
    match config.store {
        StoreKind::Memory => {
            tracing::warn!("インメモリストアを使用（再起動でデータは消える）");
            Ok(Arc::new(InMemoryUserStore::new()))
        }
        StoreKind::Postgres => {
            let database_url = config
                .database_url
                .as_ref()
                .ok_or_else(|| anyhow::anyhow!("DATABASE_URL is required for postgres store"))?;

            // データベース接続プール作成
            let db_pool = PgPoolOptions::new()
                .max_connections(5)
                .connect(database_url.expose_secret())
                .await
                .map_err(|e| {
                    tracing::error!(error = ?e, "データベース接続に失敗");
                    anyhow::anyhow!("Failed to connect to database: {}", e)
                })?;

            sqlx::migrate!("./migrations")
                .run(&db_pool)
                .await
                .map_err(|e| {
                    tracing::error!(error = ?e, "マイグレーションに失敗");
                    anyhow::anyhow!("Failed to run migrations: {}", e)
                })?;

            tracing::info!("データベース接続完了");

            Ok(Arc::new(PgUserStore::new(db_pool)))
        }
    }
}

/// 通知手段の選択: SMTP（email機能有効時）> Mailtrap API > ログ出力
fn build_notifier(config: &Config) -> anyhow::Result<Arc<dyn Notifier>> {
    #[cfg(feature = "email")]
    {
        if let (Some(host), Some(username), Some(password)) = (
            &config.smtp_host,
            &config.smtp_username,
            &config.smtp_password,
        ) {
            tracing::info!(smtp_host = %host, "SMTP 通知を使用");
            let mailer = authflow::services::SmtpMailer::new(
                host,
                config.smtp_port,
                username,
                password,
                &config.email_from_address,
                &config.email_from_name,
            )?;
            return Ok(Arc::new(EmailNotifier::new(mailer)));
        }
    }

    #[cfg(not(feature = "email"))]
    {
        if config.smtp_configured() {
            tracing::warn!("SMTP 設定がありますが email 機能が無効です（スキップ）");
        }
    }

    if let Some(token) = &config.mailtrap_api_token {
        tracing::info!(api_url = %config.mailtrap_api_url, "Mailtrap 通知を使用");
        let mailer = MailtrapMailer::new(
            config.mailtrap_api_url.clone(),
            token,
            config.email_from_address.clone(),
            config.email_from_name.clone(),
        );
        return Ok(Arc::new(EmailNotifier::new(mailer)));
    }

    if config.store == StoreKind::Postgres {
        tracing::warn!(
            "メール送信未設定: 検証コード・リセットリンクは利用者に届きません（LogNotifier）。本番では MAILTRAP_API_TOKEN または SMTP_* を設定してください"
        );
    } else {
        tracing::warn!("メール送信未設定（ログ出力のみ、コードは trace レベル）");
    }
    Ok(Arc::new(LogNotifier))
}

/// 期限切れトークンを定期的に削除
fn spawn_token_sweeper(auth: AuthService, every: Duration) {
    tokio::spawn(async move {
        let mut interval = tokio::time::interval(every);
        // 初回の即時実行は起動直後なので飛ばす
        interval.tick().await;
        loop {
            interval.tick().await;
            match auth.purge_expired_tokens().await {
                Ok(count) => tracing::info!(count, "期限切れトークンを削除"),
                Err(e) => tracing::error!(error = ?e, "期限切れトークンの削除に失敗"),
            }
        }
    });
}

/// Graceful shutdown シグナル待機
async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = tokio::signal::ctrl_c().await {
            tracing::error!(error = ?e, "Ctrl+C ハンドラーのインストールに失敗");
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate()) {
            Ok(mut signal) => {
                signal.recv().await;
            }
            Err(e) => {
                tracing::error!(error = ?e, "SIGTERM ハンドラーのインストールに失敗");
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {
            tracing::info!("Ctrl+C received, starting graceful shutdown");
        }
        _ = terminate => {
            tracing::info!("SIGTERM received, starting graceful shutdown");
        }
    }
}
