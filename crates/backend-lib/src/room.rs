// ============================
// crates/backend-lib/src/room.rs
// ============================

//! Room state and the process-wide room registry.
//!
//! A room is membership plus a shared project tree plus an activity
//! timestamp. The registry serializes access per room: callers pass a
//! closure that runs while the room's shard guard is held, so a room
//! only ever sees one mutation at a time. Closures must not suspend;
//! anything that awaits happens after the guard is dropped.

use std::collections::HashMap;
use std::sync::Arc;

use chrono::{DateTime, SecondsFormat, Utc};
use dashmap::DashMap;
use metrics::{counter, gauge};
use tokio::sync::mpsc;
use tracing::info;
use uuid::Uuid;

use codesync_common::{RoomStats, ServerEvent, StatsResponse};

use crate::metrics::{ROOM_ACTIVE, ROOM_CREATED, ROOM_DELETED};
use crate::vfs::VirtualFs;

/// Identifies one WebSocket connection for the lifetime of the process.
pub type SessionId = Uuid;

/// One connection's presence in a room.
#[derive(Debug, Clone)]
pub struct RoomMember {
    /// Display name the connection joined under.
    pub name: String,
    /// Outbound queue of the member's connection.
    pub sender: mpsc::Sender<ServerEvent>,
}

/// A collaborative session: who is here, what files exist, when the
/// room last saw a meaningful change.
#[derive(Debug)]
pub struct Room {
    pub members: HashMap<SessionId, RoomMember>,
    pub files: VirtualFs,
    /// Which path each member last edited or reported typing in.
    pub active_files: HashMap<SessionId, String>,
    pub last_activity: DateTime<Utc>,
}

impl Room {
    pub fn new() -> Self {
        Self {
            members: HashMap::new(),
            files: VirtualFs::seeded(),
            active_files: HashMap::new(),
            last_activity: Utc::now(),
        }
    }

    /// Records that something happened in the room just now.
    pub fn touch(&mut self) {
        self.last_activity = Utc::now();
    }

    pub fn is_empty(&self) -> bool {
        self.members.is_empty()
    }

    /// Sorted display names of the current members. Two connections may
    /// share a name, in which case it appears twice.
    pub fn member_names(&self) -> Vec<String> {
        let mut names: Vec<String> = self.members.values().map(|m| m.name.clone()).collect();
        names.sort();
        names
    }

    /// Outbound queues of every member, optionally skipping one session.
    pub fn targets(&self, exclude: Option<SessionId>) -> Vec<(SessionId, mpsc::Sender<ServerEvent>)> {
        self.members
            .iter()
            .filter(|(id, _)| Some(**id) != exclude)
            .map(|(id, member)| (*id, member.sender.clone()))
            .collect()
    }

    /// Active-file tracking keyed by display name for the wire. Sessions
    /// that are no longer members are skipped.
    pub fn active_files_by_name(&self) -> HashMap<String, String> {
        self.active_files
            .iter()
            .filter_map(|(id, path)| {
                self.members
                    .get(id)
                    .map(|member| (member.name.clone(), path.clone()))
            })
            .collect()
    }
}

impl Default for Room {
    fn default() -> Self {
        Self::new()
    }
}

/// Process-wide map of room id to room. Cheap to clone; all clones see
/// the same rooms.
#[derive(Clone, Default)]
pub struct RoomRegistry {
    rooms: Arc<DashMap<String, Room>>,
}

impl RoomRegistry {
    /// Runs `f` against an existing room. Returns `None` when the room
    /// does not exist.
    pub fn with_room<R>(&self, room_id: &str, f: impl FnOnce(&mut Room) -> R) -> Option<R> {
        self.rooms.get_mut(room_id).map(|mut room| f(room.value_mut()))
    }

    /// Runs `f` against a room, creating it with the starter project
    /// first if needed.
    pub fn with_room_or_create<R>(&self, room_id: &str, f: impl FnOnce(&mut Room) -> R) -> R {
        let mut room = self.rooms.entry(room_id.to_string()).or_insert_with(|| {
            counter!(ROOM_CREATED).increment(1);
            info!(room = room_id, "created room with starter project");
            Room::new()
        });
        let out = f(room.value_mut());
        drop(room);
        gauge!(ROOM_ACTIVE).set(self.rooms.len() as f64);
        out
    }

    /// Runs `f` against a shared reference to an existing room.
    pub fn read_room<R>(&self, room_id: &str, f: impl FnOnce(&Room) -> R) -> Option<R> {
        self.rooms.get(room_id).map(|room| f(room.value()))
    }

    /// Removes a room only if it has no members. Returns whether a room
    /// was removed.
    pub fn remove_if_empty(&self, room_id: &str) -> bool {
        let removed = self
            .rooms
            .remove_if(room_id, |_, room| room.is_empty())
            .is_some();
        if removed {
            counter!(ROOM_DELETED).increment(1);
            gauge!(ROOM_ACTIVE).set(self.rooms.len() as f64);
            info!(room = room_id, "removed empty room");
        }
        removed
    }

    /// Drops every room that is empty and idle for longer than
    /// `idle_after`. Returns how many rooms went away.
    pub fn reap_idle(&self, idle_after: chrono::Duration) -> usize {
        let now = Utc::now();
        let before = self.rooms.len();
        self.rooms
            .retain(|_, room| !(room.is_empty() && now - room.last_activity > idle_after));
        let removed = before.saturating_sub(self.rooms.len());
        if removed > 0 {
            counter!(ROOM_DELETED).increment(removed as u64);
            gauge!(ROOM_ACTIVE).set(self.rooms.len() as f64);
        }
        removed
    }

    /// Point-in-time summary of every room, sorted by room id.
    pub fn stats_snapshot(&self) -> StatsResponse {
        let mut rooms: Vec<RoomStats> = self
            .rooms
            .iter()
            .map(|entry| RoomStats {
                room_id: entry.key().clone(),
                user_count: entry.value().members.len(),
                file_count: entry.value().files.len(),
                last_activity: entry
                    .value()
                    .last_activity
                    .to_rfc3339_opts(SecondsFormat::Millis, true),
            })
            .collect();
        rooms.sort_by(|a, b| a.room_id.cmp(&b.room_id));
        StatsResponse {
            total_rooms: rooms.len(),
            total_users: rooms.iter().map(|r| r.user_count).sum(),
            rooms,
        }
    }

    pub fn contains(&self, room_id: &str) -> bool {
        self.rooms.contains_key(room_id)
    }

    pub fn len(&self) -> usize {
        self.rooms.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rooms.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn make_sender() -> mpsc::Sender<ServerEvent> {
        mpsc::channel(8).0
    }

    fn add_member(room: &mut Room, name: &str) -> SessionId {
        let id = Uuid::new_v4();
        room.members.insert(
            id,
            RoomMember {
                name: name.to_string(),
                sender: make_sender(),
            },
        );
        id
    }

    #[test]
    fn new_rooms_start_with_the_starter_project() {
        let registry = RoomRegistry::default();
        let file_count = registry.with_room_or_create("r1", |room| room.files.len());
        assert_eq!(file_count, 3);
        assert!(registry.contains("r1"));
        // second access reuses the room instead of reseeding it
        registry.with_room("r1", |room| {
            room.files.create_inferred("extra.js").unwrap();
        });
        let file_count = registry.with_room_or_create("r1", |room| room.files.len());
        assert_eq!(file_count, 4);
    }

    #[test]
    fn with_room_misses_unknown_rooms() {
        let registry = RoomRegistry::default();
        assert!(registry.with_room("ghost", |_| ()).is_none());
        assert!(registry.read_room("ghost", |_| ()).is_none());
    }

    #[test]
    fn member_names_are_sorted_and_keep_duplicates() {
        let mut room = Room::new();
        add_member(&mut room, "zoe");
        add_member(&mut room, "alice");
        add_member(&mut room, "alice");
        assert_eq!(room.member_names(), ["alice", "alice", "zoe"]);
    }

    #[test]
    fn targets_can_exclude_one_session() {
        let mut room = Room::new();
        let a = add_member(&mut room, "alice");
        add_member(&mut room, "bob");
        assert_eq!(room.targets(None).len(), 2);
        let others = room.targets(Some(a));
        assert_eq!(others.len(), 1);
        assert!(others.iter().all(|(id, _)| *id != a));
    }

    #[test]
    fn active_files_by_name_skips_departed_sessions() {
        let mut room = Room::new();
        let a = add_member(&mut room, "alice");
        let b = add_member(&mut room, "bob");
        room.active_files.insert(a, "src/App.js".to_string());
        room.active_files.insert(b, "README.md".to_string());
        room.members.remove(&b);

        let by_name = room.active_files_by_name();
        assert_eq!(by_name.len(), 1);
        assert_eq!(by_name["alice"], "src/App.js");
    }

    #[test]
    fn remove_if_empty_leaves_occupied_rooms_alone() {
        let registry = RoomRegistry::default();
        registry.with_room_or_create("busy", |room| {
            add_member(room, "alice");
        });
        registry.with_room_or_create("idle", |_| ());

        assert!(!registry.remove_if_empty("busy"));
        assert!(registry.remove_if_empty("idle"));
        assert!(registry.contains("busy"));
        assert!(!registry.contains("idle"));
        assert!(!registry.remove_if_empty("idle"));
    }

    #[test]
    fn reap_idle_only_touches_empty_stale_rooms() {
        let registry = RoomRegistry::default();
        registry.with_room_or_create("stale-empty", |room| {
            room.last_activity = Utc::now() - chrono::Duration::hours(48);
        });
        registry.with_room_or_create("stale-occupied", |room| {
            add_member(room, "alice");
            room.last_activity = Utc::now() - chrono::Duration::hours(48);
        });
        registry.with_room_or_create("fresh-empty", |_| ());

        let removed = registry.reap_idle(chrono::Duration::hours(24));
        assert_eq!(removed, 1);
        assert!(!registry.contains("stale-empty"));
        assert!(registry.contains("stale-occupied"));
        assert!(registry.contains("fresh-empty"));
    }

    #[test]
    fn stats_snapshot_totals_and_sorts() {
        let registry = RoomRegistry::default();
        registry.with_room_or_create("beta", |room| {
            add_member(room, "alice");
            add_member(room, "bob");
        });
        registry.with_room_or_create("alpha", |room| {
            add_member(room, "carol");
            room.files.create_inferred("extra.py").unwrap();
        });

        let stats = registry.stats_snapshot();
        assert_eq!(stats.total_rooms, 2);
        assert_eq!(stats.total_users, 3);
        assert_eq!(stats.rooms[0].room_id, "alpha");
        assert_eq!(stats.rooms[0].file_count, 4);
        assert_eq!(stats.rooms[1].room_id, "beta");
        assert_eq!(stats.rooms[1].user_count, 2);
        // RFC 3339 with trailing Z, millisecond precision
        assert!(stats.rooms[0].last_activity.ends_with('Z'));
    }

    #[test]
    fn touch_moves_last_activity_forward() {
        let mut room = Room::new();
        room.last_activity = Utc::now() - chrono::Duration::minutes(5);
        let before = room.last_activity;
        room.touch();
        assert!(room.last_activity > before);
    }
}
