pub mod memory;
pub mod store;
pub mod user;

pub use memory::InMemoryUserStore;
pub use store::{TokenKind, UserStore};
pub use user::PgUserStore;
