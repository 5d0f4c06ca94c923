pub mod check_auth;
pub mod extract;
pub mod health;
pub mod login;
pub mod logout;
pub mod password_reset;
pub mod signup;
pub mod verify_email;

pub use check_auth::check_auth;
pub use extract::{SessionCredential, ValidatedJson};
pub use health::health_check;
pub use login::login;
pub use logout::logout;
pub use password_reset::{forgot_password, reset_password};
pub use signup::signup;
pub use verify_email::{resend_verification, verify_email};
