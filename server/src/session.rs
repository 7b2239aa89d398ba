//! Connection sessions and their room bindings
//!
//! This module tracks every open connection on the server side:
//! - Connection lifecycle (accept, disconnect, idle timeout)
//! - The outbound channel used to reach the connection's writer task
//! - The optional `(room, player)` binding created when the connection joins
//!
//! Bindings are keyed by connection id rather than player id, because a
//! connection exists before it has a player identity.

use log::{debug, info};
use shared::ServerMessage;
use std::collections::HashMap;
use std::time::Duration;
use tokio::sync::mpsc;
use tokio::time::Instant;
use uuid::Uuid;

pub type ConnectionId = u64;

/// Sending half of a connection's outbound queue.
pub type Outbound = mpsc::UnboundedSender<ServerMessage>;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RoomBinding {
    pub room_id: String,
    pub player_id: Uuid,
}

/// A connected socket and its association to a room, if any
#[derive(Debug)]
pub struct Session {
    /// Unique connection identifier assigned by the transport
    pub id: ConnectionId,
    /// Queue drained by the connection's writer task
    pub sender: Outbound,
    /// Last time we received any frame from this connection
    pub last_seen: Instant,
    /// Room and player this connection currently plays as
    pub binding: Option<RoomBinding>,
}

impl Session {
    pub fn new(id: ConnectionId, sender: Outbound) -> Self {
        Self {
            id,
            sender,
            last_seen: Instant::now(),
            binding: None,
        }
    }

    pub fn touch(&mut self) {
        self.last_seen = Instant::now();
    }

    /// Checks if the connection has been silent for longer than `timeout`
    pub fn is_timed_out(&self, timeout: Duration) -> bool {
        self.last_seen.elapsed() > timeout
    }

    /// Best-effort send. A closed queue means the socket is going away and
    /// its disconnect event is already on the way.
    pub fn send(&self, message: ServerMessage) -> bool {
        match self.sender.send(message) {
            Ok(()) => true,
            Err(_) => {
                debug!("Dropping message for closed connection {}", self.id);
                false
            }
        }
    }
}

/// All open connections, with a capacity limit
pub struct SessionTable {
    sessions: HashMap<ConnectionId, Session>,
    max_connections: usize,
}

impl SessionTable {
    pub fn new(max_connections: usize) -> Self {
        Self {
            sessions: HashMap::new(),
            max_connections,
        }
    }

    /// Registers a new connection. Returns false when the server is at
    /// capacity, in which case the connection is not tracked.
    pub fn add_session(&mut self, id: ConnectionId, sender: Outbound) -> bool {
        if self.sessions.len() >= self.max_connections {
            return false;
        }

        info!("Connection {} opened", id);
        self.sessions.insert(id, Session::new(id, sender));
        true
    }

    pub fn remove_session(&mut self, id: ConnectionId) -> Option<Session> {
        let session = self.sessions.remove(&id)?;
        info!("Connection {} closed", id);
        Some(session)
    }

    pub fn get(&self, id: ConnectionId) -> Option<&Session> {
        self.sessions.get(&id)
    }

    pub fn touch(&mut self, id: ConnectionId) {
        if let Some(session) = self.sessions.get_mut(&id) {
            session.touch();
        }
    }

    pub fn bind(&mut self, id: ConnectionId, binding: RoomBinding) -> bool {
        match self.sessions.get_mut(&id) {
            Some(session) => {
                session.binding = Some(binding);
                true
            }
            None => false,
        }
    }

    pub fn unbind(&mut self, id: ConnectionId) -> Option<RoomBinding> {
        self.sessions.get_mut(&id)?.binding.take()
    }

    pub fn binding(&self, id: ConnectionId) -> Option<&RoomBinding> {
        self.sessions.get(&id)?.binding.as_ref()
    }

    pub fn send_to(&self, id: ConnectionId, message: ServerMessage) -> bool {
        self.sessions
            .get(&id)
            .is_some_and(|session| session.send(message))
    }

    /// Sends `message` to every connection bound to `room_id`. A failed send
    /// to one connection does not affect the others.
    pub fn broadcast_to_room(&self, room_id: &str, message: &ServerMessage) -> usize {
        self.sessions
            .values()
            .filter(|s| s.binding.as_ref().is_some_and(|b| b.room_id == room_id))
            .filter(|s| s.send(message.clone()))
            .count()
    }

    /// Connections that have been silent for longer than `timeout`. They are
    /// left in place so the caller can run the normal disconnect path.
    pub fn check_timeouts(&self, timeout: Duration) -> Vec<ConnectionId> {
        self.sessions
            .values()
            .filter(|s| s.is_timed_out(timeout))
            .map(|s| s.id)
            .collect()
    }

    pub fn len(&self) -> usize {
        self.sessions.len()
    }

    pub fn is_empty(&self) -> bool {
        self.sessions.is_empty()
    }
}
