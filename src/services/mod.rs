pub mod auth;
pub mod email;
pub mod notifier;
pub mod session;
pub mod token;

pub use auth::{AuthService, Authenticated};
pub use email::{EmailNotifier, MailtrapMailer};
#[cfg(feature = "email")]
pub use email::SmtpMailer;
pub use notifier::{LogNotifier, Notifier};
pub use session::SessionIssuer;
pub use token::{TokenGenerator, TokenPolicy};
