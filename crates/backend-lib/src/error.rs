// ============================
// crates/backend-lib/src/error.rs
// ============================

//! Error types for the project tree and the execution bridge.
//!
//! Protocol-level problems (stale room references, conflicting file
//! operations) are tolerated where they occur and never surface as
//! connection errors, so the error surface here is small: what can go
//! wrong while mutating a project tree, while talking to the execution
//! engine, and while booting the application.

use thiserror::Error;

/// Failure of a structural operation on a room's project tree.
#[derive(Error, Debug, PartialEq, Eq)]
pub enum VfsError {
    #[error("file already exists: {0}")]
    AlreadyExists(String),

    #[error("file not found: {0}")]
    NotFound(String),
}

/// Failure while running code through an execution engine.
#[derive(Error, Debug)]
pub enum EngineError {
    /// The HTTP request itself failed: connection refused, timeout,
    /// or an unreadable reply body.
    #[error(transparent)]
    Http(#[from] reqwest::Error),

    /// The engine answered with a non-success status code.
    #[error("execution engine returned status {0}")]
    Status(u16),
}

/// Top-level error for wiring the application together.
#[derive(Error, Debug)]
pub enum AppError {
    #[error("configuration error: {0}")]
    Config(#[from] figment::Error),

    #[error("execution engine setup failed: {0}")]
    Engine(#[from] EngineError),
}
