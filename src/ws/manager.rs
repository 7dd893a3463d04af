//! Defines `SocketManager`, the process-local registry of live connections
//! and their room memberships.
//!
//! Each worker owns its managers outright, with no cross-worker state, and
//! within a worker a manager belongs to a single route. The manager is
//! the exclusive owner of its connections; connections refer back to it only
//! weakly.
//!
//! Fan-out operations iterate a snapshot of the registry taken at call time.
//! A peer that disconnects mid-iteration simply fails its individual send,
//! which is logged and dropped.

use std::collections::HashSet;
use std::sync::{Arc, Mutex};

use log::{debug, trace};
use tokio_tungstenite::tungstenite::Message;

use crate::relation::RelationalMap;
use crate::ws::connection::{envelope, WsConnection};

/// Registry of live connections plus the connection ↔ room relation.
pub struct SocketManager {
    sockets: Mutex<Vec<Arc<WsConnection>>>,
    rooms: Mutex<RelationalMap<u64, String>>,
}

impl SocketManager {
    /// Creates an empty manager.
    pub fn new() -> SocketManager {
        SocketManager {
            sockets: Mutex::new(Vec::new()),
            rooms: Mutex::new(RelationalMap::new()),
        }
    }

    /// Registers a connection on upgrade.
    pub(crate) fn add(&self, conn: Arc<WsConnection>) {
        self.lock_sockets().push(conn);
    }

    /// Removes a connection and drops all of its room memberships.
    /// Idempotent: removing an unknown connection is a no-op.
    pub fn on_disconnect(&self, conn: &WsConnection) {
        self.lock_sockets().retain(|c| c.id() != conn.id());
        self.lock_rooms().drop_key(&conn.id());
    }

    /// Adds `id` to `room`; returns `true` iff the membership is new.
    pub fn join(&self, id: u64, room: &str) -> bool {
        let mut rooms = self.lock_rooms();
        let room_existed = rooms.has_value(&room.to_owned());
        let newly_added = rooms.relate(id, room.to_owned());

        if newly_added && !room_existed {
            debug!(target: "nanoserve::ws", " room `{}` created", room);
        }

        newly_added
    }

    /// Removes `id` from `room`; returns `true` iff the membership existed.
    pub fn leave(&self, id: u64, room: &str) -> bool {
        self.lock_rooms().unrelate(&id, &room.to_owned())
    }

    /// Finds a live connection by id. A linear scan, which is fine at the
    /// scale of one worker's registry.
    pub fn by_id(&self, id: u64) -> Option<Arc<WsConnection>> {
        self.lock_sockets().iter().find(|c| c.id() == id).cloned()
    }

    /// Number of live connections.
    pub fn count(&self) -> usize {
        self.lock_sockets().len()
    }

    /// Snapshot of the rooms `id` belongs to.
    pub fn rooms_of(&self, id: u64) -> HashSet<String> {
        self.lock_rooms().values_of(&id)
    }

    /// Snapshot of the member ids of `room`.
    pub fn members_of(&self, room: &str) -> HashSet<u64> {
        self.lock_rooms().keys_of(&room.to_owned())
    }

    /// Sends a raw frame to every live connection.
    pub async fn send_to_all(&self, message: Message) {
        for conn in self.snapshot() {
            deliver(&conn, message.clone()).await;
        }
    }

    /// Sends a typed event to every live connection.
    pub async fn emit_to_all(&self, event: &str, data: serde_json::Value) {
        self.send_to_all(envelope(event, data)).await;
    }

    /// Sends a raw frame to every live connection except `sender`.
    pub async fn broadcast(&self, sender: u64, message: Message) {
        for conn in self.snapshot() {
            if conn.id() != sender {
                deliver(&conn, message.clone()).await;
            }
        }
    }

    /// Sends a raw frame to every member of `room`, whether or not the caller
    /// belongs to it.
    pub async fn send_to_room(&self, room: &str, message: Message) {
        let members = self.members_of(room);
        for conn in self.snapshot() {
            if members.contains(&conn.id()) {
                deliver(&conn, message.clone()).await;
            }
        }
    }

    /// Sends a typed event to every member of `room`.
    pub async fn emit_to_room(&self, event: &str, room: &str, data: serde_json::Value) {
        self.send_to_room(room, envelope(event, data)).await;
    }

    /// Sends a raw frame to every member of `room` except `sender`.
    pub async fn broadcast_to_room(&self, room: &str, sender: u64, message: Message) {
        let members = self.members_of(room);
        for conn in self.snapshot() {
            if conn.id() != sender && members.contains(&conn.id()) {
                deliver(&conn, message.clone()).await;
            }
        }
    }

    fn snapshot(&self) -> Vec<Arc<WsConnection>> {
        self.lock_sockets().clone()
    }

    fn lock_sockets(&self) -> std::sync::MutexGuard<'_, Vec<Arc<WsConnection>>> {
        self.sockets.lock().expect("socket registry mutex poisoned")
    }

    fn lock_rooms(&self) -> std::sync::MutexGuard<'_, RelationalMap<u64, String>> {
        self.rooms.lock().expect("room relation mutex poisoned")
    }
}

impl Default for SocketManager {
    fn default() -> Self {
        SocketManager::new()
    }
}

/// One fan-out delivery. Failures are dropped: the peer may have gone away
/// between the snapshot and the write.
async fn deliver(conn: &Arc<WsConnection>, message: Message) {
    if let Err(err) = conn.send(message).await {
        trace!(
            target: "nanoserve::ws",
            " dropping frame for socket {}: {}",
            conn.id(),
            err
        );
    }
}
