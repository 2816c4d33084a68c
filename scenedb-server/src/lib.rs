//! SceneDB Server Library - REST API over fingerprint consensus and scene queries
//!
//! This library exposes the server components for use in integration tests.
//! The main binary uses these same components.

pub mod auth;
pub mod config;
pub mod error;
pub mod handlers;
pub mod routes;
pub mod state;
pub mod store;

pub use auth::{Actor, Claims, JwtKeys, Role};
pub use config::Config;
pub use error::ApiError;
pub use routes::{create_router, create_router_with_config};
pub use state::AppState;
pub use store::{Catalog, PostgresCatalog};
