//! HTTP API.
//!
//! Public routes cover health, login and the provider redirects; everything
//! else sits behind [`auth::require_auth`].

mod auth;
mod billing;
mod clickup;
mod documents;
mod materialize;
mod routes;
pub mod types;

pub use auth::AuthUser;
pub use routes::{router, serve, AppState};
