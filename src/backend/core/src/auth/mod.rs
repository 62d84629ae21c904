//! Stateless credentials with server-side invalidation.
//!
//! Credentials are HS256-signed claim sets. A credential stays valid until it
//! expires, its jti is revoked, or the user's session version moves past the
//! version it carries.

pub mod claims;
pub mod middleware;
pub mod principal;
pub mod store;
pub mod token;

pub use claims::{Claims, ROLE_PREFIX};
pub use middleware::{extract_bearer, AuthLayer, AuthService, Authenticator, CurrentPrincipal};
pub use principal::Principal;
pub use store::{InMemorySessionStore, RedisSessionStore, SessionStore};
pub use token::{Rejection, TokenConfig, TokenConfigBuilder, TokenPair, TokenService, NEVER_EXPIRES};
