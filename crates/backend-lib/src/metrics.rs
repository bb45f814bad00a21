// ================
// crates/backend-lib/src/metrics.rs
// ================

//! Central place for metric key names.

pub const WS_CONNECTION: &str = "ws.connection";
pub const WS_ACTIVE: &str = "ws.active";

pub const ROOM_CREATED: &str = "room.created";
pub const ROOM_DELETED: &str = "room.deleted";
pub const ROOM_ACTIVE: &str = "room.active";

pub const EVENT_DROPPED: &str = "event.dropped";

pub const EXECUTION_COMPLETED: &str = "execution.completed";
pub const EXECUTION_FAILED: &str = "execution.failed";
