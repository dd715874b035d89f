//! Service layer for the song battle engine
//!
//! This module contains the application state shared by the CLI and the
//! HTTP server, health checks, and the axum router.

pub mod app;
pub mod health;
pub mod http;

pub use app::{AppState, ServiceError, ServiceStats};
pub use health::{ComponentCheck, HealthCheck, HealthStatus};
pub use http::{router, HttpServer};
