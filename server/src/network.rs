//! Server event loop and message routing.
//!
//! Every state change in the server happens on the single task running
//! [`Server::run`]. Connection tasks, timers and the health endpoint talk to
//! it only through [`ServerEvent`]s on one channel, so each event is handled
//! to completion before the next one is looked at and rooms need no locks.

use crate::config::{ServerConfig, IDLE_SWEEP_INTERVAL};
use crate::registry::RoomRegistry;
use crate::room::{GameError, MatchOutcome, TickOutcome};
use crate::session::{ConnectionId, Outbound, RoomBinding, SessionTable};
use crate::timer::{ScheduledTask, Scheduler, TaskKind};
use log::{debug, info, warn};
use serde::Serialize;
use shared::{ClientMessage, GridSize, Player, RoomStatus, ServerMessage, PROTOCOL_VERSION};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use tokio::sync::{mpsc, oneshot};
use tokio::time::interval;
use uuid::Uuid;

const MAX_NAME_CHARS: usize = 20;
const MAX_AVATAR_CHARS: usize = 16;
const DEFAULT_NAME: &str = "Player";
const DEFAULT_AVATAR: &str = "🙂";

/// Messages sent into the main server loop
#[derive(Debug)]
pub enum ServerEvent {
    Connected {
        conn_id: ConnectionId,
        sender: Outbound,
    },
    Message {
        conn_id: ConnectionId,
        message: ClientMessage,
    },
    /// Inbound traffic that carries no command but proves liveness.
    Heartbeat {
        conn_id: ConnectionId,
    },
    Disconnected {
        conn_id: ConnectionId,
    },
    Scheduled(ScheduledTask),
    SweepIdle,
    Stats {
        reply: oneshot::Sender<ServerStats>,
    },
    Shutdown,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct ServerStats {
    pub rooms: usize,
    pub connections: usize,
}

/// Cloneable entry point into a running [`Server`].
#[derive(Clone)]
pub struct ServerHandle {
    events: mpsc::UnboundedSender<ServerEvent>,
    next_conn_id: Arc<AtomicU64>,
}

impl ServerHandle {
    /// Registers a new connection and returns its id together with the
    /// queue of messages to write to it.
    pub fn open_connection(&self) -> (ConnectionId, mpsc::UnboundedReceiver<ServerMessage>) {
        let conn_id = self.next_conn_id.fetch_add(1, Ordering::Relaxed);
        let (sender, receiver) = mpsc::unbounded_channel();
        self.post(ServerEvent::Connected { conn_id, sender });
        (conn_id, receiver)
    }

    pub fn message(&self, conn_id: ConnectionId, message: ClientMessage) {
        self.post(ServerEvent::Message { conn_id, message });
    }

    pub fn heartbeat(&self, conn_id: ConnectionId) {
        self.post(ServerEvent::Heartbeat { conn_id });
    }

    pub fn close_connection(&self, conn_id: ConnectionId) {
        self.post(ServerEvent::Disconnected { conn_id });
    }

    /// Room and connection counts, or `None` if the server loop is gone.
    pub async fn stats(&self) -> Option<ServerStats> {
        let (reply, response) = oneshot::channel();
        if self.events.send(ServerEvent::Stats { reply }).is_err() {
            return None;
        }
        response.await.ok()
    }

    pub fn shutdown(&self) {
        self.post(ServerEvent::Shutdown);
    }

    fn post(&self, event: ServerEvent) {
        if self.events.send(event).is_err() {
            debug!("Server loop is gone, dropping event");
        }
    }
}

/// Authoritative room server state
pub struct Server {
    config: ServerConfig,
    registry: RoomRegistry,
    sessions: SessionTable,
    scheduler: Scheduler,
    events_tx: mpsc::UnboundedSender<ServerEvent>,
    events_rx: mpsc::UnboundedReceiver<ServerEvent>,
    next_conn_id: Arc<AtomicU64>,
}

impl Server {
    pub fn new(config: ServerConfig) -> Self {
        let (events_tx, events_rx) = mpsc::unbounded_channel();

        Server {
            registry: RoomRegistry::new(config.turn_time_limit),
            sessions: SessionTable::new(config.max_connections),
            scheduler: Scheduler::new(events_tx.clone()),
            config,
            events_tx,
            events_rx,
            next_conn_id: Arc::new(AtomicU64::new(1)),
        }
    }

    pub fn handle(&self) -> ServerHandle {
        ServerHandle {
            events: self.events_tx.clone(),
            next_conn_id: Arc::clone(&self.next_conn_id),
        }
    }

    pub fn stats(&self) -> ServerStats {
        ServerStats {
            rooms: self.registry.len(),
            connections: self.sessions.len(),
        }
    }

    /// Spawns task that periodically asks the loop to drop silent sessions
    fn spawn_idle_sweeper(&self) {
        let events = self.events_tx.clone();

        tokio::spawn(async move {
            let mut ticker = interval(IDLE_SWEEP_INTERVAL);
            ticker.tick().await;

            loop {
                ticker.tick().await;
                if events.send(ServerEvent::SweepIdle).is_err() {
                    break;
                }
            }
        });
    }

    /// Main server loop; returns after [`ServerHandle::shutdown`].
    pub async fn run(mut self) {
        if self.config.idle_timeout.is_some() {
            self.spawn_idle_sweeper();
        }

        info!("Server loop started");
        while self.step().await {}
        info!("Server loop stopped");
    }

    /// Waits for and handles a single event. Returns false on shutdown.
    pub async fn step(&mut self) -> bool {
        match self.events_rx.recv().await {
            Some(ServerEvent::Shutdown) | None => false,
            Some(event) => {
                self.handle_event(event);
                true
            }
        }
    }

    pub fn handle_event(&mut self, event: ServerEvent) {
        match event {
            ServerEvent::Connected { conn_id, sender } => {
                if self.sessions.add_session(conn_id, sender.clone()) {
                    self.sessions.send_to(
                        conn_id,
                        ServerMessage::Connected {
                            version: PROTOCOL_VERSION.to_string(),
                        },
                    );
                } else {
                    warn!("Rejecting connection {}: server full", conn_id);
                    let _ = sender.send(ServerMessage::error("Server full"));
                }
            }
            ServerEvent::Message { conn_id, message } => {
                self.sessions.touch(conn_id);
                self.route(conn_id, message);
            }
            ServerEvent::Heartbeat { conn_id } => self.sessions.touch(conn_id),
            ServerEvent::Disconnected { conn_id } => self.disconnect(conn_id),
            ServerEvent::Scheduled(task) => self.run_scheduled(task),
            ServerEvent::SweepIdle => self.sweep_idle(),
            ServerEvent::Stats { reply } => {
                let _ = reply.send(self.stats());
            }
            ServerEvent::Shutdown => {}
        }
    }

    /// Dispatches a decoded client message. Rejections are answered with an
    /// `ERROR` to the sender only.
    fn route(&mut self, conn_id: ConnectionId, message: ClientMessage) {
        if self.sessions.get(conn_id).is_none() {
            debug!("Ignoring {} from unknown connection {}", message.kind(), conn_id);
            return;
        }

        debug!("Connection {} sent {}", conn_id, message.kind());
        let kind = message.kind();
        let result = match message {
            ClientMessage::JoinGame {
                player_name,
                avatar,
                grid_size,
            } => self.join_game(conn_id, &player_name, &avatar, grid_size),
            ClientMessage::FlipCard { card_index } => self.flip_card(conn_id, card_index),
            ClientMessage::LeaveRoom => self.leave_room(conn_id),
            ClientMessage::Rematch => self.rematch(conn_id),
            ClientMessage::Ping => {
                self.sessions.send_to(conn_id, ServerMessage::Pong);
                Ok(())
            }
        };

        if let Err(err) = result {
            warn!("Rejected {} from connection {}: {}", kind, conn_id, err);
            self.sessions
                .send_to(conn_id, ServerMessage::error(err.to_string()));
        }
    }

    fn join_game(
        &mut self,
        conn_id: ConnectionId,
        player_name: &str,
        avatar: &str,
        grid_size: GridSize,
    ) -> Result<(), GameError> {
        if let Some(previous) = self.sessions.unbind(conn_id) {
            self.remove_player(&previous);
        }

        let player = Player::new(
            Uuid::new_v4(),
            sanitize(player_name, MAX_NAME_CHARS, DEFAULT_NAME),
            sanitize(avatar, MAX_AVATAR_CHARS, DEFAULT_AVATAR),
        );
        let player_id = player.id;

        let room_id = self.registry.find_or_create(grid_size);
        let room = self
            .registry
            .get_mut(&room_id)
            .ok_or(GameError::NotInRoom)?;
        let player_index = room.join(player.clone())?;
        let room_state = room.public_state();
        let ready_to_start = room.is_full() && room.status() == RoomStatus::Waiting;
        let epoch = room.epoch();

        self.sessions.bind(
            conn_id,
            RoomBinding {
                room_id: room_id.clone(),
                player_id,
            },
        );
        self.sessions.send_to(
            conn_id,
            ServerMessage::JoinedRoom {
                player_id,
                room_id: room_id.clone(),
                player_index,
                room_state: room_state.clone(),
            },
        );
        self.sessions.broadcast_to_room(
            &room_id,
            &ServerMessage::PlayerJoined {
                player,
                room_state,
            },
        );

        if ready_to_start {
            self.scheduler.schedule(
                &room_id,
                epoch,
                TaskKind::AutoStart,
                self.config.auto_start_delay,
            );
        }
        Ok(())
    }

    /// Resolves the connection's binding, clearing it if the room or player
    /// no longer exists.
    fn bound_player(&mut self, conn_id: ConnectionId) -> Result<RoomBinding, GameError> {
        let binding = self
            .sessions
            .binding(conn_id)
            .cloned()
            .ok_or(GameError::NotInRoom)?;

        let consistent = self
            .registry
            .get(&binding.room_id)
            .is_some_and(|room| room.has_player(binding.player_id));
        if !consistent {
            warn!("Connection {} had a stale room binding", conn_id);
            self.sessions.unbind(conn_id);
            return Err(GameError::NotInRoom);
        }
        Ok(binding)
    }

    fn flip_card(&mut self, conn_id: ConnectionId, card_index: usize) -> Result<(), GameError> {
        let binding = self.bound_player(conn_id)?;
        let room = self
            .registry
            .get_mut(&binding.room_id)
            .ok_or(GameError::NotInRoom)?;

        let outcome = room.flip(binding.player_id, card_index)?;
        let epoch = room.epoch();

        self.sessions.broadcast_to_room(
            &binding.room_id,
            &ServerMessage::CardFlipped {
                card_index: outcome.card_index,
                card: outcome.card,
                player_id: binding.player_id,
            },
        );

        if outcome.pair_complete {
            self.scheduler.schedule(
                &binding.room_id,
                epoch,
                TaskKind::ResolveMatch,
                self.config.match_resolve_delay,
            );
        }
        Ok(())
    }

    fn rematch(&mut self, conn_id: ConnectionId) -> Result<(), GameError> {
        let binding = self.bound_player(conn_id)?;
        let room = self
            .registry
            .get_mut(&binding.room_id)
            .ok_or(GameError::NotInRoom)?;

        room.rematch(binding.player_id)?;
        self.game_started(&binding.room_id);
        Ok(())
    }

    fn leave_room(&mut self, conn_id: ConnectionId) -> Result<(), GameError> {
        let binding = self.sessions.unbind(conn_id).ok_or(GameError::NotInRoom)?;
        self.remove_player(&binding);
        self.sessions.send_to(conn_id, ServerMessage::LeftRoom);
        Ok(())
    }

    /// Shared cleanup for explicit leaves, re-joins, disconnects and idle
    /// timeouts.
    fn remove_player(&mut self, binding: &RoomBinding) {
        let Some(room) = self.registry.get_mut(&binding.room_id) else {
            return;
        };
        if room.leave(binding.player_id).is_err() {
            return;
        }

        self.scheduler.cancel_room(&binding.room_id);
        if room.is_empty() {
            self.registry.remove(&binding.room_id);
            return;
        }

        let room_state = room.public_state();
        self.sessions.broadcast_to_room(
            &binding.room_id,
            &ServerMessage::PlayerLeft {
                player_id: binding.player_id,
                room_state,
            },
        );
    }

    fn disconnect(&mut self, conn_id: ConnectionId) {
        if let Some(binding) = self.sessions.unbind(conn_id) {
            self.remove_player(&binding);
        }
        self.sessions.remove_session(conn_id);
    }

    fn sweep_idle(&mut self) {
        let Some(timeout) = self.config.idle_timeout else {
            return;
        };

        for conn_id in self.sessions.check_timeouts(timeout) {
            warn!("Connection {} idle for over {:?}, dropping", conn_id, timeout);
            self.disconnect(conn_id);
        }
    }

    fn game_started(&mut self, room_id: &str) {
        let Some(room) = self.registry.get(room_id) else {
            return;
        };

        let epoch = room.epoch();
        self.sessions.broadcast_to_room(
            room_id,
            &ServerMessage::GameStarted {
                room_state: room.public_state(),
            },
        );
        self.scheduler.restart_turn_timer(room_id, epoch);
    }

    /// Applies a due task if it still refers to the room's current epoch.
    fn run_scheduled(&mut self, task: ScheduledTask) {
        let Some(room) = self.registry.get_mut(&task.room_id) else {
            debug!("Dropping {:?} for destroyed room {}", task.kind, task.room_id);
            return;
        };
        if room.epoch() != task.epoch {
            debug!(
                "Dropping stale {:?} for room {} (epoch {} != {})",
                task.kind,
                task.room_id,
                task.epoch,
                room.epoch()
            );
            return;
        }

        match task.kind {
            TaskKind::AutoStart => {
                if room.status() == RoomStatus::Waiting && room.start().is_ok() {
                    self.game_started(&task.room_id);
                }
            }
            TaskKind::ResolveMatch => {
                if let Some(outcome) = room.resolve_match() {
                    self.announce_match(&task.room_id, outcome);
                }
            }
            TaskKind::TurnTick => match room.tick() {
                TickOutcome::Idle => {}
                TickOutcome::Countdown {
                    time_left,
                    is_warning,
                } => {
                    debug!("Room {} turn clock at {}s", task.room_id, time_left);
                    if is_warning {
                        self.sessions.broadcast_to_room(
                            &task.room_id,
                            &ServerMessage::TurnTimeUpdate {
                                time_left,
                                is_warning,
                            },
                        );
                    }
                }
                TickOutcome::TimedOut {
                    current_player_index,
                } => {
                    info!("Turn timed out in room {}", task.room_id);
                    let epoch = room.epoch();
                    let room_state = room.public_state();
                    self.sessions.broadcast_to_room(
                        &task.room_id,
                        &ServerMessage::TurnTimeout {
                            current_player_index,
                            room_state,
                        },
                    );
                    self.scheduler.restart_turn_timer(&task.room_id, epoch);
                }
            },
        }
    }

    fn announce_match(&mut self, room_id: &str, outcome: MatchOutcome) {
        let Some(room) = self.registry.get(room_id) else {
            return;
        };
        let epoch = room.epoch();

        match outcome {
            MatchOutcome::Matched {
                card_indices,
                player_id,
                player_score,
                matched_pairs,
                total_pairs,
                game_over,
            } => {
                self.sessions.broadcast_to_room(
                    room_id,
                    &ServerMessage::MatchResult {
                        is_match: true,
                        card_indices,
                        player_id: Some(player_id),
                        player_score: Some(player_score),
                        matched_pairs: Some(matched_pairs),
                        total_pairs: Some(total_pairs),
                    },
                );

                match game_over {
                    Some(result) => {
                        self.sessions.broadcast_to_room(
                            room_id,
                            &ServerMessage::GameEnded {
                                winner_id: result.winner_id,
                                is_draw: result.is_draw,
                                final_scores: result.final_scores,
                                room_state: room.public_state(),
                            },
                        );
                        self.scheduler.stop_turn_timer(room_id);
                    }
                    None => self.scheduler.restart_turn_timer(room_id, epoch),
                }
            }
            MatchOutcome::Mismatched {
                card_indices,
                current_player_index,
            } => {
                self.sessions.broadcast_to_room(
                    room_id,
                    &ServerMessage::MatchResult {
                        is_match: false,
                        card_indices,
                        player_id: None,
                        player_score: None,
                        matched_pairs: None,
                        total_pairs: None,
                    },
                );
                self.sessions.broadcast_to_room(
                    room_id,
                    &ServerMessage::TurnChanged {
                        current_player_index,
                        room_state: room.public_state(),
                    },
                );
                self.scheduler.restart_turn_timer(room_id, epoch);
            }
        }
    }
}

fn sanitize(value: &str, max_chars: usize, fallback: &str) -> String {
    let trimmed: String = value.trim().chars().take(max_chars).collect();
    if trimmed.is_empty() {
        fallback.to_string()
    } else {
        trimmed
    }
}
