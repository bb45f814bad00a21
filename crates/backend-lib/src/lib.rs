// ============================
// crates/backend-lib/src/lib.rs
// ============================

//! Core library for the CodeSync collaborative session server.
//!
//! Rooms live in a process-wide registry; every WebSocket connection
//! runs a session controller that applies protocol events to its bound
//! room and fans resulting events out to the room's members. Code
//! execution is delegated to a pluggable engine, and two background
//! mechanisms reclaim abandoned rooms.

pub mod config;
pub mod error;
pub mod execute;
pub mod metrics;
pub mod reaper;
pub mod room;
pub mod session;
pub mod validation;
pub mod vfs;
pub mod ws_router;

use std::sync::Arc;

use crate::config::Settings;
use crate::error::AppError;
use crate::execute::{ExecutionEngine, PistonEngine};
use crate::reaper::CleanupScheduler;
use crate::room::RoomRegistry;

/// Shared application state. Cloning is cheap; every clone observes the
/// same rooms and the same scheduler.
#[derive(Clone)]
pub struct AppState {
    /// All live rooms.
    pub registry: RoomRegistry,
    /// Engine that `compileCode` requests run through.
    pub engine: Arc<dyn ExecutionEngine>,
    /// Delayed empty-room checks.
    pub cleanup: CleanupScheduler,
    /// Resolved runtime configuration.
    pub settings: Arc<Settings>,
}

impl AppState {
    /// State backed by the configured Piston-style endpoint.
    pub fn new(settings: Settings) -> Result<Self, AppError> {
        let engine = Arc::new(PistonEngine::new(&settings)?);
        Ok(Self::with_engine(settings, engine))
    }

    /// State with a caller-supplied engine. Tests inject mocks here.
    pub fn with_engine(settings: Settings, engine: Arc<dyn ExecutionEngine>) -> Self {
        let registry = RoomRegistry::default();
        let cleanup = CleanupScheduler::new(registry.clone(), settings.cleanup_grace());
        Self {
            registry,
            engine,
            cleanup,
            settings: Arc::new(settings),
        }
    }
}
