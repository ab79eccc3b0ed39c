mod auth;
mod error_handler;
mod rate_limit;

pub use auth::{auth_middleware, require_admin};
pub use error_handler::log_requests;
pub use rate_limit::rate_limit;
