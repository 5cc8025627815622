pub mod auth;

pub use auth::{auth_middleware, internal_authorization, AuthUser, Principal};
