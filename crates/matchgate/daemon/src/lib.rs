//! Matchgate daemon library
//!
//! This crate wires the credential authority, rating engine, and ledgers into
//! the session service and serves it over HTTP:
//! - Session service (signup, login, info, cancel, submit)
//! - REST API handlers
//! - Configuration and server lifecycle

pub mod api;
pub mod config;
pub mod error;
pub mod locks;
pub mod server;
pub mod service;

pub use api::create_router;
pub use config::DaemonConfig;
pub use error::{ApiError, DaemonError, ServiceError};
pub use server::Server;
pub use service::{PlayerInfo, ServiceSettings, SessionService};
