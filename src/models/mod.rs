pub mod response;
pub mod user;

pub use response::ApiResponse;
pub use user::{NewUser, User, UserView};
