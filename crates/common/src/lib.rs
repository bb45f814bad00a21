// ================
// crates/common/src/lib.rs
// ================

//! Wire types shared between the session server and its clients.
//!
//! Every frame on the socket is a JSON object tagged with an `event`
//! field; the remaining keys are camelCase. [`ClientEvent`] covers the
//! client-to-server direction, [`ServerEvent`] the server-to-client
//! direction. The HTTP stats endpoint reuses [`StatsResponse`].

use std::collections::HashMap;

use serde::{Deserialize, Serialize};

/// One entry in a room's shared project tree.
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq, Eq)]
pub struct FileRecord {
    /// Full text of the file.
    pub content: String,
    /// Editor language tag, e.g. `"javascript"` or `"plaintext"`.
    pub language: String,
}

impl FileRecord {
    pub fn new(content: impl Into<String>, language: impl Into<String>) -> Self {
        Self {
            content: content.into(),
            language: language.into(),
        }
    }
}

/// Structural operation requested through a `fileSystemUpdate` event.
#[derive(Serialize, Deserialize, Debug, Clone, Copy, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum FsAction {
    Create,
    Delete,
    Rename,
    BulkUpdate,
}

fn default_language() -> String {
    "plaintext".to_string()
}

/// Messages a client may send to the server.
#[derive(Serialize, Deserialize, Debug, Clone)]
#[serde(tag = "event", rename_all = "camelCase", rename_all_fields = "camelCase")]
pub enum ClientEvent {
    /// Enter a room under a display name, creating the room on first use.
    Join { room_id: String, user_name: String },
    /// Replace the full content of one file.
    CodeChange {
        room_id: String,
        code: String,
        file_name: String,
    },
    /// Structural change to the project tree. Which optional fields are
    /// required depends on `action`; missing ones make the action a no-op
    /// while the sync broadcast still goes out.
    FileSystemUpdate {
        room_id: String,
        action: FsAction,
        #[serde(default)]
        file_name: Option<String>,
        #[serde(default)]
        new_file_name: Option<String>,
        #[serde(default)]
        files: Option<HashMap<String, FileRecord>>,
    },
    /// Create a file with explicit content and language.
    CreateFile {
        room_id: String,
        file_name: String,
        #[serde(default)]
        content: String,
        #[serde(default = "default_language")]
        language: String,
    },
    /// Remove a file from the project tree.
    DeleteFile { room_id: String, file_name: String },
    /// Leave the current room without closing the connection.
    LeaveRoom,
    /// Ephemeral typing notification; never stored.
    Typing {
        room_id: String,
        user_name: String,
        file_name: String,
    },
    /// Change the language tag of one file.
    LanguageChange {
        room_id: String,
        language: String,
        file_name: String,
    },
    /// Run a snippet through the execution engine and share the result
    /// with the whole room.
    CompileCode {
        room_id: String,
        language: String,
        #[serde(default)]
        version: Option<String>,
        #[serde(default)]
        file_name: Option<String>,
        code: String,
    },
    /// Ask for a point-in-time summary of a room.
    GetRoomInfo { room_id: String },
}

/// Messages the server may push to a client.
#[derive(Serialize, Deserialize, Debug, Clone)]
#[serde(tag = "event", rename_all = "camelCase", rename_all_fields = "camelCase")]
pub enum ServerEvent {
    /// Current member list of the room, sent whenever membership changes.
    UserJoined { users: Vec<String> },
    /// Full snapshot of the room's project tree.
    FileSystemSync { files: HashMap<String, FileRecord> },
    /// One file's content changed; sent to everyone except the editor.
    CodeUpdate {
        file_name: String,
        content: String,
        user: String,
    },
    /// A file was created through `createFile`.
    FileCreated {
        file_name: String,
        content: String,
        language: String,
        user: String,
    },
    /// A file was removed through `deleteFile`.
    FileDeleted { file_name: String, user: String },
    /// Someone is typing; sent to everyone except the typist.
    UserTyping { user: String, file_name: String },
    /// A file's language tag changed.
    LanguageUpdate { language: String, file_name: String },
    /// Outcome of a `compileCode` run, shared with the whole room.
    CodeResponse {
        #[serde(flatten)]
        result: ExecutionResult,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        file_name: Option<String>,
        executed_by: String,
    },
    /// Reply to `getRoomInfo`, sent only to the asking connection.
    RoomInfo {
        user_count: usize,
        users: Vec<String>,
        file_count: usize,
        /// Display name to the path that user last touched.
        active_files: HashMap<String, String>,
        /// Milliseconds since the Unix epoch.
        last_activity: i64,
    },
}

/// Result of one execution run as reported by the engine.
///
/// Engines attach fields we do not model (`language`, `version`,
/// `compile`, ...); those ride along in `extra` so clients see the
/// engine's reply unfiltered.
#[derive(Serialize, Deserialize, Debug, Clone, Default, PartialEq)]
pub struct ExecutionResult {
    pub run: RunOutput,
    #[serde(flatten)]
    pub extra: serde_json::Map<String, serde_json::Value>,
}

impl ExecutionResult {
    /// Builds a result that carries nothing but console output. Used when
    /// the engine itself failed and the failure text stands in for the
    /// program's output.
    pub fn from_output(output: impl Into<String>) -> Self {
        Self {
            run: RunOutput {
                output: output.into(),
                extra: serde_json::Map::new(),
            },
            extra: serde_json::Map::new(),
        }
    }
}

/// Console output section of an execution result.
#[derive(Serialize, Deserialize, Debug, Clone, Default, PartialEq)]
pub struct RunOutput {
    /// Combined stdout/stderr text.
    #[serde(default)]
    pub output: String,
    #[serde(flatten)]
    pub extra: serde_json::Map<String, serde_json::Value>,
}

/// Body of the `/api/stats` endpoint.
#[derive(Serialize, Deserialize, Debug, Clone)]
#[serde(rename_all = "camelCase")]
pub struct StatsResponse {
    pub total_rooms: usize,
    pub total_users: usize,
    pub rooms: Vec<RoomStats>,
}

/// Per-room block inside [`StatsResponse`].
#[derive(Serialize, Deserialize, Debug, Clone)]
#[serde(rename_all = "camelCase")]
pub struct RoomStats {
    pub room_id: String,
    pub user_count: usize,
    pub file_count: usize,
    /// RFC 3339 timestamp of the last recorded activity.
    pub last_activity: String,
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn join_event_wire_shape() {
        let event = ClientEvent::Join {
            room_id: "rust-room-1".to_string(),
            user_name: "alice".to_string(),
        };
        let value = serde_json::to_value(&event).unwrap();
        assert_eq!(
            value,
            json!({"event": "join", "roomId": "rust-room-1", "userName": "alice"})
        );
    }

    #[test]
    fn code_change_parses_from_raw_json() {
        let raw = r#"{"event":"codeChange","roomId":"r1","code":"fn main() {}","fileName":"src/App.js"}"#;
        let event: ClientEvent = serde_json::from_str(raw).unwrap();
        match event {
            ClientEvent::CodeChange {
                room_id,
                code,
                file_name,
            } => {
                assert_eq!(room_id, "r1");
                assert_eq!(code, "fn main() {}");
                assert_eq!(file_name, "src/App.js");
            }
            other => panic!("parsed the wrong variant: {other:?}"),
        }
    }

    #[test]
    fn leave_room_has_no_payload() {
        let event: ClientEvent = serde_json::from_str(r#"{"event":"leaveRoom"}"#).unwrap();
        assert!(matches!(event, ClientEvent::LeaveRoom));
        let value = serde_json::to_value(&ClientEvent::LeaveRoom).unwrap();
        assert_eq!(value, json!({"event": "leaveRoom"}));
    }

    #[test]
    fn create_file_fills_defaults() {
        let raw = r#"{"event":"createFile","roomId":"r1","fileName":"notes.md"}"#;
        let event: ClientEvent = serde_json::from_str(raw).unwrap();
        match event {
            ClientEvent::CreateFile {
                content, language, ..
            } => {
                assert_eq!(content, "");
                assert_eq!(language, "plaintext");
            }
            other => panic!("parsed the wrong variant: {other:?}"),
        }
    }

    #[test]
    fn file_system_update_accepts_minimal_bulk_payload() {
        let raw = r#"{
            "event": "fileSystemUpdate",
            "roomId": "r1",
            "action": "bulk_update",
            "files": {"a.js": {"content": "1", "language": "javascript"}}
        }"#;
        let event: ClientEvent = serde_json::from_str(raw).unwrap();
        match event {
            ClientEvent::FileSystemUpdate {
                action,
                file_name,
                new_file_name,
                files,
                ..
            } => {
                assert_eq!(action, FsAction::BulkUpdate);
                assert!(file_name.is_none());
                assert!(new_file_name.is_none());
                let files = files.unwrap();
                assert_eq!(files["a.js"], FileRecord::new("1", "javascript"));
            }
            other => panic!("parsed the wrong variant: {other:?}"),
        }
    }

    #[test]
    fn unknown_fs_action_is_rejected() {
        let raw = r#"{"event":"fileSystemUpdate","roomId":"r1","action":"truncate"}"#;
        assert!(serde_json::from_str::<ClientEvent>(raw).is_err());
    }

    #[test]
    fn server_events_keep_original_field_names() {
        let value = serde_json::to_value(ServerEvent::CodeUpdate {
            file_name: "src/App.js".to_string(),
            content: "x".to_string(),
            user: "bob".to_string(),
        })
        .unwrap();
        assert_eq!(
            value,
            json!({"event": "codeUpdate", "fileName": "src/App.js", "content": "x", "user": "bob"})
        );

        let value = serde_json::to_value(ServerEvent::UserJoined {
            users: vec!["alice".to_string(), "bob".to_string()],
        })
        .unwrap();
        assert_eq!(value, json!({"event": "userJoined", "users": ["alice", "bob"]}));
    }

    #[test]
    fn code_response_flattens_engine_fields() {
        let raw = r#"{
            "language": "python",
            "version": "3.12.0",
            "run": {"stdout": "hi\n", "stderr": "", "code": 0, "output": "hi\n"}
        }"#;
        let result: ExecutionResult = serde_json::from_str(raw).unwrap();
        assert_eq!(result.run.output, "hi\n");
        assert_eq!(result.extra["language"], "python");
        assert_eq!(result.run.extra["code"], 0);

        let value = serde_json::to_value(ServerEvent::CodeResponse {
            result,
            file_name: Some("main.py".to_string()),
            executed_by: "alice".to_string(),
        })
        .unwrap();
        assert_eq!(value["event"], "codeResponse");
        assert_eq!(value["language"], "python");
        assert_eq!(value["run"]["output"], "hi\n");
        assert_eq!(value["fileName"], "main.py");
        assert_eq!(value["executedBy"], "alice");
    }

    #[test]
    fn code_response_omits_missing_file_name() {
        let value = serde_json::to_value(ServerEvent::CodeResponse {
            result: ExecutionResult::from_output("Execution Error: engine unreachable"),
            file_name: None,
            executed_by: "alice".to_string(),
        })
        .unwrap();
        assert!(value.get("fileName").is_none());
        assert_eq!(value["run"]["output"], "Execution Error: engine unreachable");
    }

    #[test]
    fn stats_response_wire_shape() {
        let stats = StatsResponse {
            total_rooms: 1,
            total_users: 2,
            rooms: vec![RoomStats {
                room_id: "r1".to_string(),
                user_count: 2,
                file_count: 3,
                last_activity: "2024-01-01T00:00:00.000Z".to_string(),
            }],
        };
        let value = serde_json::to_value(&stats).unwrap();
        assert_eq!(value["totalRooms"], 1);
        assert_eq!(value["totalUsers"], 2);
        assert_eq!(value["rooms"][0]["roomId"], "r1");
        assert_eq!(value["rooms"][0]["fileCount"], 3);
        assert_eq!(value["rooms"][0]["lastActivity"], "2024-01-01T00:00:00.000Z");
    }
}
