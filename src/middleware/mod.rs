pub mod auth;
pub mod cors;

pub use auth::{auth_middleware, AuthSubject};
pub use cors::{cors_layer, preflight_no_content};
