use async_trait::async_trait;
use secrecy::{ExposeSecret, SecretBox};
use serde::Serialize;

use crate::error::AppError;
use crate::services::Notifier;

/// 送信するメールの内容
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EmailContent {
    pub subject: String,
    pub text: String,
    /// 送信API側の分類ラベル
    pub category: &'static str,
}

impl EmailContent {
    pub fn verification_code(code: &str) -> Self {
        Self {
            subject: "メールアドレスの確認".to_string(),
            text: format!(
                "確認コード: {}\n\nこのコードは24時間有効です。心当たりがない場合は破棄してください。",
                code
            ),
            category: "Email Verification",
        }
    }

    pub fn welcome(name: &str) -> Self {
        Self {
            subject: "ようこそ".to_string(),
            text: format!("{} さん、メールアドレスの確認が完了しました。", name),
            category: "Welcome Email",
        }
    }

    pub fn password_reset_link(reset_url: &str) -> Self {
        Self {
            subject: "パスワードの再設定".to_string(),
            text: format!(
                "以下のリンクからパスワードを再設定してください（15分間有効）。\n{}",
                reset_url
            ),
            category: "Password Reset",
        }
    }

    pub fn password_reset_success() -> Self {
        Self {
            subject: "パスワードが再設定されました".to_string(),
            text: "パスワードの再設定が完了しました。心当たりがない場合はすぐにご連絡ください。"
                .to_string(),
            category: "Password Reset",
        }
    }
}

/// メールの配送手段
#[async_trait]
pub trait Mailer: Send + Sync {
    async fn deliver(&self, to: &str, content: EmailContent) -> Result<(), AppError>;
}

/// 配送手段を使ってメールで通知する `Notifier`
#[derive(Clone)]
pub struct EmailNotifier<M> {
    mailer: M,
}

impl<M: Mailer> EmailNotifier<M> {
    pub fn new(mailer: M) -> Self {
        Self { mailer }
    }
}

#[async_trait]
impl<M: Mailer> Notifier for EmailNotifier<M> {
    async fn send_verification_code(&self, to: &str, code: &str) -> Result<(), AppError> {
        self.mailer
            .deliver(to, EmailContent::verification_code(code))
            .await
    }

    async fn send_welcome(&self, to: &str, name: &str) -> Result<(), AppError> {
        self.mailer.deliver(to, EmailContent::welcome(name)).await
    }

    async fn send_password_reset_link(&self, to: &str, reset_url: &str) -> Result<(), AppError> {
        self.mailer
            .deliver(to, EmailContent::password_reset_link(reset_url))
            .await
    }

    async fn send_password_reset_success(&self, to: &str) -> Result<(), AppError> {
        self.mailer
            .deliver(to, EmailContent::password_reset_success())
            .await
    }
}

#[derive(Serialize)]
struct MailtrapAddress<'a> {
    email: &'a str,
    #[serde(skip_serializing_if = "Option::is_none")]
    name: Option<&'a str>,
}

#[derive(Serialize)]
struct MailtrapSendRequest<'a> {
    from: MailtrapAddress<'a>,
    to: Vec<MailtrapAddress<'a>>,
    subject: &'a str,
    text: &'a str,
    category: &'a str,
}

/// Mailtrap 送信API経由の配送
///
/// # Security
/// APIトークンはログに出力しない
pub struct MailtrapMailer {
    api_url: String,
    api_token: SecretBox<String>,
    from_address: String,
    from_name: String,
    http_client: reqwest::Client,
}

impl MailtrapMailer {
    pub fn new(
        api_url: String,
        api_token: &SecretBox<String>,
        from_address: String,
        from_name: String,
    ) -> Self {
        Self {
            api_url,
            api_token: SecretBox::new(Box::new(api_token.expose_secret().clone())),
            from_address,
            from_name,
            http_client: reqwest::Client::new(),
        }
    }
}

#[async_trait]
impl Mailer for MailtrapMailer {
    async fn deliver(&self, to: &str, content: EmailContent) -> Result<(), AppError> {
        let body = MailtrapSendRequest {
            from: MailtrapAddress {
                email: &self.from_address,
                name: Some(&self.from_name),
            },
            to: vec![MailtrapAddress {
                email: to,
                name: None,
            }],
            subject: &content.subject,
            text: &content.text,
            category: content.category,
        };

        self.http_client
            .post(&self.api_url)
            .bearer_auth(self.api_token.expose_secret())
            .json(&body)
            .send()
            .await
            .and_then(|res| res.error_for_status())
            .map_err(|e| AppError::Delivery(format!("mailtrap: {}", e)))?;

        tracing::info!(to = %to, category = content.category, "メール送信完了");
        Ok(())
    }
}

#[cfg(feature = "email")]
pub use smtp::SmtpMailer;

#[cfg(feature = "email")]
mod smtp {
    use lettre::message::{Mailbox, header::ContentType};
    use lettre::transport::smtp::authentication::Credentials;
    use lettre::{AsyncSmtpTransport, AsyncTransport, Message, Tokio1Executor};

    use super::*;

    /// SMTP経由の配送
    pub struct SmtpMailer {
        transport: AsyncSmtpTransport<Tokio1Executor>,
        from: Mailbox,
    }

    impl SmtpMailer {
        pub fn new(
            host: &str,
            port: u16,
            username: &SecretBox<String>,
            password: &SecretBox<String>,
            from_address: &str,
            from_name: &str,
        ) -> Result<Self, AppError> {
            let credentials = Credentials::new(
                username.expose_secret().clone(),
                password.expose_secret().clone(),
            );
            let transport = AsyncSmtpTransport::<Tokio1Executor>::starttls_relay(host)
                .map_err(|e| {
                    tracing::error!(error = ?e, "SMTPトランスポートの初期化エラー");
                    AppError::Internal(anyhow::anyhow!("smtp transport error"))
                })?
                .port(port)
                .credentials(credentials)
                .build();

            let from = format!("{} <{}>", from_name, from_address)
                .parse()
                .map_err(|e| {
                    tracing::error!(error = ?e, "送信元アドレスが不正");
                    AppError::Internal(anyhow::anyhow!("invalid from address"))
                })?;

            Ok(Self { transport, from })
        }
    }

    #[async_trait]
    impl Mailer for SmtpMailer {
        async fn deliver(&self, to: &str, content: EmailContent) -> Result<(), AppError> {
            let to_mailbox: Mailbox = to
                .parse()
                .map_err(|e| AppError::Delivery(format!("invalid recipient: {}", e)))?;

            let message = Message::builder()
                .from(self.from.clone())
                .to(to_mailbox)
                .subject(content.subject)
                .header(ContentType::TEXT_PLAIN)
                .body(content.text)
                .map_err(|e| AppError::Delivery(format!("build message: {}", e)))?;

            self.transport
                .send(message)
                .await
                .map_err(|e| AppError::Delivery(format!("smtp: {}", e)))?;

            tracing::info!(to = %to, category = content.category, "メール送信完了");
            Ok(())
        }
    }
}
