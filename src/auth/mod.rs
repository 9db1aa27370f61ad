//! Authentication: credential verification, register, login.

mod handlers;
mod jwt;
mod service;

pub use handlers::{login, register};
pub use jwt::{Claims, JwtSecret, VerifiedToken};
pub use service::AuthAppService;
