mod auth;
mod error_handler;
mod rate_limit;

pub use auth::{AuthScheme, CurrentUser, session_middleware};
pub use error_handler::log_responses;
pub use rate_limit::{client_ip, rate_limit};
