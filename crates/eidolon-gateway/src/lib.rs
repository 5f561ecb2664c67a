//! Eidolon Gateway - the one session and the read-only surface.

pub mod auth;
pub mod server;
pub mod ws;

pub use auth::ResolvedAuth;
pub use server::{start_gateway, AppState};
