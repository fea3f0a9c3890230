mod health_check;
mod refresh;

pub use health_check::health_check;
pub use refresh::{refresh_token, TokenRefreshRequest};
