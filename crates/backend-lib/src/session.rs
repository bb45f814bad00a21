// ============================
// crates/backend-lib/src/session.rs
// ============================

//! Per-connection protocol handling.
//!
//! Each WebSocket connection owns one [`SessionController`]. The
//! controller remembers which room the connection is bound to, applies
//! inbound events to that room through the registry, and fans the
//! resulting events out to the room's members. All room state changes
//! happen inside registry closures; sends happen after the room guard
//! is released. Broadcast sends never wait: a member whose outbound
//! queue is full misses that event but keeps their seat in the room.

use std::collections::HashMap;

use metrics::counter;
use tokio::sync::mpsc;
use tracing::{debug, info};
use uuid::Uuid;

use codesync_common::{ClientEvent, FileRecord, FsAction, ServerEvent};

use crate::execute::{self, ExecutionRequest};
use crate::metrics::EVENT_DROPPED;
use crate::room::{RoomMember, SessionId};
use crate::AppState;

/// Which room and display name a connection is currently attached to.
#[derive(Debug, Clone)]
struct Binding {
    room_id: String,
    user_name: String,
}

/// Protocol state machine for one connection.
pub struct SessionController {
    state: AppState,
    session_id: SessionId,
    outbound: mpsc::Sender<ServerEvent>,
    binding: Option<Binding>,
}

impl SessionController {
    pub fn new(state: AppState, outbound: mpsc::Sender<ServerEvent>) -> Self {
        Self {
            state,
            session_id: Uuid::new_v4(),
            outbound,
            binding: None,
        }
    }

    pub fn session_id(&self) -> SessionId {
        self.session_id
    }

    /// Applies one inbound event.
    pub async fn dispatch(&mut self, event: ClientEvent) {
        match event {
            ClientEvent::Join { room_id, user_name } => self.on_join(room_id, user_name).await,
            ClientEvent::CodeChange {
                room_id,
                code,
                file_name,
            } => self.on_code_change(room_id, code, file_name),
            ClientEvent::FileSystemUpdate {
                room_id,
                action,
                file_name,
                new_file_name,
                files,
            } => self.on_file_system_update(room_id, action, file_name, new_file_name, files),
            ClientEvent::CreateFile {
                room_id,
                file_name,
                content,
                language,
            } => self.on_create_file(room_id, file_name, content, language),
            ClientEvent::DeleteFile { room_id, file_name } => {
                self.on_delete_file(room_id, file_name);
            }
            ClientEvent::LeaveRoom => self.leave_current_room(),
            ClientEvent::Typing {
                room_id,
                user_name,
                file_name,
            } => self.on_typing(room_id, user_name, file_name),
            ClientEvent::LanguageChange {
                room_id,
                language,
                file_name,
            } => self.on_language_change(room_id, language, file_name),
            ClientEvent::CompileCode {
                room_id,
                language,
                version,
                file_name,
                code,
            } => {
                self.on_compile_code(room_id, language, version, file_name, code)
                    .await;
            }
            ClientEvent::GetRoomInfo { room_id } => self.on_get_room_info(room_id).await,
        }
    }

    /// Runs the leave semantics when the connection goes away. Safe to
    /// call after an explicit `leaveRoom`; the second run does nothing.
    pub fn disconnect(&mut self) {
        self.leave_current_room();
    }

    async fn on_join(&mut self, room_id: String, user_name: String) {
        if self.binding.as_ref().is_some_and(|b| b.room_id != room_id) {
            self.leave_current_room();
        }
        let (names, targets, snapshot) = self.state.registry.with_room_or_create(&room_id, |room| {
            room.members.insert(
                self.session_id,
                RoomMember {
                    name: user_name.clone(),
                    sender: self.outbound.clone(),
                },
            );
            room.touch();
            (room.member_names(), room.targets(None), room.files.snapshot())
        });
        info!(room = %room_id, user = %user_name, "user joined room");
        self.binding = Some(Binding {
            room_id: room_id.clone(),
            user_name,
        });
        broadcast(&room_id, targets, &ServerEvent::UserJoined { users: names });
        // second half of the join handshake: a private tree snapshot
        self.reply(ServerEvent::FileSystemSync { files: snapshot }).await;
    }

    fn leave_current_room(&mut self) {
        let Some(binding) = self.binding.take() else {
            return;
        };
        let outcome = self.state.registry.with_room(&binding.room_id, |room| {
            room.members.remove(&self.session_id);
            room.active_files.remove(&self.session_id);
            (room.member_names(), room.targets(None), room.is_empty())
        });
        let Some((names, targets, now_empty)) = outcome else {
            return;
        };
        info!(room = %binding.room_id, user = %binding.user_name, "user left room");
        broadcast(
            &binding.room_id,
            targets,
            &ServerEvent::UserJoined { users: names },
        );
        if now_empty {
            self.state.cleanup.schedule(&binding.room_id);
        }
    }

    fn on_code_change(&self, room_id: String, code: String, file_name: String) {
        let Some(user) = self.bound_user(&room_id) else {
            return;
        };
        let outcome = self.state.registry.with_room(&room_id, |room| {
            if !room.files.set_content(&file_name, code.clone()) {
                return None;
            }
            room.active_files.insert(self.session_id, file_name.clone());
            room.touch();
            Some(room.targets(Some(self.session_id)))
        });
        match outcome.flatten() {
            Some(targets) => broadcast(
                &room_id,
                targets,
                &ServerEvent::CodeUpdate {
                    file_name,
                    content: code,
                    user,
                },
            ),
            None => debug!(room = %room_id, file = %file_name, "ignored edit of unknown file"),
        }
    }

    fn on_file_system_update(
        &self,
        room_id: String,
        action: FsAction,
        file_name: Option<String>,
        new_file_name: Option<String>,
        files: Option<HashMap<String, FileRecord>>,
    ) {
        if self.bound_user(&room_id).is_none() {
            return;
        }
        let outcome = self.state.registry.with_room(&room_id, |room| {
            match action {
                FsAction::Create => {
                    if let Some(path) = file_name.as_deref().filter(|p| !p.is_empty()) {
                        match room.files.create_inferred(path) {
                            Ok(()) => info!(room = %room_id, file = path, "created file"),
                            Err(err) => debug!(room = %room_id, %err, "create skipped"),
                        }
                    }
                }
                FsAction::Delete => {
                    if let Some(path) = file_name.as_deref() {
                        match room.files.remove(path) {
                            Ok(_) => info!(room = %room_id, file = path, "deleted file"),
                            Err(err) => debug!(room = %room_id, %err, "delete skipped"),
                        }
                    }
                }
                FsAction::Rename => {
                    if let (Some(from), Some(to)) = (file_name.as_deref(), new_file_name.as_deref())
                    {
                        if !from.is_empty() && !to.is_empty() {
                            match room.files.rename(from, to) {
                                Ok(()) => info!(room = %room_id, from, to, "renamed file"),
                                Err(err) => debug!(room = %room_id, %err, "rename skipped"),
                            }
                        }
                    }
                }
                FsAction::BulkUpdate => {
                    if let Some(entries) = files {
                        room.files.bulk_merge(entries);
                    }
                }
            }
            room.touch();
            (room.files.snapshot(), room.targets(None))
        });
        // every member, the sender included, gets the authoritative tree
        let Some((snapshot, targets)) = outcome else {
            return;
        };
        broadcast(
            &room_id,
            targets,
            &ServerEvent::FileSystemSync { files: snapshot },
        );
    }

    fn on_create_file(&self, room_id: String, file_name: String, content: String, language: String) {
        let Some(user) = self.bound_user(&room_id) else {
            return;
        };
        let outcome = self.state.registry.with_room(&room_id, |room| {
            match room.files.create(&file_name, content.clone(), language.clone()) {
                Ok(()) => {
                    room.touch();
                    Some(room.targets(None))
                }
                Err(err) => {
                    debug!(room = %room_id, %err, "create skipped");
                    None
                }
            }
        });
        if let Some(targets) = outcome.flatten() {
            info!(room = %room_id, file = %file_name, user = %user, "created file");
            broadcast(
                &room_id,
                targets,
                &ServerEvent::FileCreated {
                    file_name,
                    content,
                    language,
                    user,
                },
            );
        }
    }

    fn on_delete_file(&self, room_id: String, file_name: String) {
        let Some(user) = self.bound_user(&room_id) else {
            return;
        };
        let outcome = self.state.registry.with_room(&room_id, |room| {
            match room.files.remove(&file_name) {
                Ok(_) => {
                    room.touch();
                    Some(room.targets(None))
                }
                Err(err) => {
                    debug!(room = %room_id, %err, "delete skipped");
                    None
                }
            }
        });
        if let Some(targets) = outcome.flatten() {
            info!(room = %room_id, file = %file_name, user = %user, "deleted file");
            broadcast(
                &room_id,
                targets,
                &ServerEvent::FileDeleted { file_name, user },
            );
        }
    }

    // Typing is presence, not activity: it updates which file the member
    // sits in but never moves last_activity, so idle rooms with a
    // twitchy cursor still age out.
    fn on_typing(&self, room_id: String, user_name: String, file_name: String) {
        if self.bound_user(&room_id).is_none() {
            return;
        }
        let targets = self.state.registry.with_room(&room_id, |room| {
            room.active_files.insert(self.session_id, file_name.clone());
            room.targets(Some(self.session_id))
        });
        if let Some(targets) = targets {
            broadcast(
                &room_id,
                targets,
                &ServerEvent::UserTyping {
                    user: user_name,
                    file_name,
                },
            );
        }
    }

    fn on_language_change(&self, room_id: String, language: String, file_name: String) {
        if self.bound_user(&room_id).is_none() {
            return;
        }
        // announced to the whole room even when the server has no such
        // file; only a known file records the change
        let targets = self.state.registry.with_room(&room_id, |room| {
            if room.files.set_language(&file_name, language.clone()) {
                room.touch();
            }
            room.targets(None)
        });
        if let Some(targets) = targets {
            broadcast(
                &room_id,
                targets,
                &ServerEvent::LanguageUpdate { language, file_name },
            );
        }
    }

    async fn on_compile_code(
        &self,
        room_id: String,
        language: String,
        version: Option<String>,
        file_name: Option<String>,
        code: String,
    ) {
        let Some(executed_by) = self.bound_user(&room_id) else {
            return;
        };
        let request = ExecutionRequest {
            language,
            version,
            file_name: file_name.clone(),
            code,
        };
        let result = execute::run(self.state.engine.as_ref(), request).await;
        // membership may have changed while the engine ran; fan out to
        // whoever is in the room now
        let Some(targets) = self
            .state
            .registry
            .with_room(&room_id, |room| room.targets(None))
        else {
            return;
        };
        broadcast(
            &room_id,
            targets,
            &ServerEvent::CodeResponse {
                result,
                file_name,
                executed_by,
            },
        );
    }

    async fn on_get_room_info(&self, room_id: String) {
        let info = self.state.registry.read_room(&room_id, |room| ServerEvent::RoomInfo {
            user_count: room.members.len(),
            users: room.member_names(),
            file_count: room.files.len(),
            active_files: room.active_files_by_name(),
            last_activity: room.last_activity.timestamp_millis(),
        });
        match info {
            Some(info) => self.reply(info).await,
            None => debug!(room = %room_id, "room info requested for unknown room"),
        }
    }

    /// The connection's display name, provided it is bound to exactly
    /// the room the event names. Anything else is a stale reference from
    /// a client that has already moved on, and the event is dropped.
    fn bound_user(&self, room_id: &str) -> Option<String> {
        match &self.binding {
            Some(binding) if binding.room_id == room_id => Some(binding.user_name.clone()),
            Some(binding) => {
                debug!(
                    requested = room_id,
                    bound = %binding.room_id,
                    "dropping event aimed at another room"
                );
                None
            }
            None => {
                debug!(room = room_id, "dropping event from an unbound connection");
                None
            }
        }
    }

    /// Waits for space on this connection's own queue. Replies addressed
    /// to the caller are delayed rather than dropped.
    async fn reply(&self, event: ServerEvent) {
        if self.outbound.send(event).await.is_err() {
            debug!(session = %self.session_id, "reply after connection closed");
        }
    }
}

/// Queues an event on every target without waiting. A full or closed
/// queue means that member misses this event.
fn broadcast(
    room_id: &str,
    targets: Vec<(SessionId, mpsc::Sender<ServerEvent>)>,
    event: &ServerEvent,
) {
    for (session_id, sender) in targets {
        if let Err(err) = sender.try_send(event.clone()) {
            counter!(EVENT_DROPPED).increment(1);
            debug!(
                room = room_id,
                session = %session_id,
                %err,
                "skipping broadcast to slow client"
            );
        }
    }
}
