//! powermason-server: axum REST surface over [`powermason_core::ProjectService`].

pub mod config;
pub mod error;
pub mod handlers;
pub mod middleware;
pub mod router;
