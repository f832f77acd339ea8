//! Authentication for Huddle
//!
//! Tokens are issued elsewhere; this module only verifies them.

pub mod jwt;
pub mod middleware;

pub use jwt::{Claims, JwtError, JwtManager};
pub use middleware::{require_auth, AuthState, AuthUser};
