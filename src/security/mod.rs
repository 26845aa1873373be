pub mod auth;
pub mod password;
pub mod rate_limiter;
pub mod users;

pub use auth::{AuthService, AuthenticatedUser, Claims};
pub use rate_limiter::RateLimiter;
pub use users::{AuthUser, UserStore};
