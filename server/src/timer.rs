//! Per-room scheduled work: the one-second turn countdown and the delayed
//! auto-start and pair-resolution steps.
//!
//! Tasks never touch room state themselves. When due they post a
//! [`ServerEvent::Scheduled`] back into the server loop, which checks the
//! captured epoch against the room before acting.

use crate::config::TURN_TICK;
use crate::network::ServerEvent;
use log::debug;
use std::collections::HashMap;
use std::time::Duration;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tokio::time::{interval_at, sleep, Instant, MissedTickBehavior};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TaskKind {
    AutoStart,
    ResolveMatch,
    TurnTick,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ScheduledTask {
    pub room_id: String,
    pub epoch: u64,
    pub kind: TaskKind,
}

#[derive(Default)]
struct RoomTasks {
    turn_timer: Option<JoinHandle<()>>,
    delayed: Vec<JoinHandle<()>>,
}

impl RoomTasks {
    fn stop_turn_timer(&mut self) {
        if let Some(handle) = self.turn_timer.take() {
            handle.abort();
        }
    }
}

impl Drop for RoomTasks {
    fn drop(&mut self) {
        self.stop_turn_timer();
        for handle in self.delayed.drain(..) {
            handle.abort();
        }
    }
}

pub struct Scheduler {
    events: mpsc::UnboundedSender<ServerEvent>,
    rooms: HashMap<String, RoomTasks>,
}

impl Scheduler {
    pub fn new(events: mpsc::UnboundedSender<ServerEvent>) -> Self {
        Self {
            events,
            rooms: HashMap::new(),
        }
    }

    /// Fires `kind` once after `delay`.
    pub fn schedule(&mut self, room_id: &str, epoch: u64, kind: TaskKind, delay: Duration) {
        let events = self.events.clone();
        let task = ScheduledTask {
            room_id: room_id.to_string(),
            epoch,
            kind,
        };

        debug!("Scheduling {:?} for room {} in {:?}", kind, room_id, delay);
        let handle = tokio::spawn(async move {
            sleep(delay).await;
            let _ = events.send(ServerEvent::Scheduled(task));
        });

        let tasks = self.rooms.entry(room_id.to_string()).or_default();
        tasks.delayed.retain(|h| !h.is_finished());
        tasks.delayed.push(handle);
    }

    /// Replaces the room's countdown with a fresh one. The first tick lands a
    /// full period from now, so a restarted turn always gets its whole budget.
    pub fn restart_turn_timer(&mut self, room_id: &str, epoch: u64) {
        let events = self.events.clone();
        let task = ScheduledTask {
            room_id: room_id.to_string(),
            epoch,
            kind: TaskKind::TurnTick,
        };

        let handle = tokio::spawn(async move {
            let mut ticker = interval_at(Instant::now() + TURN_TICK, TURN_TICK);
            ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
            loop {
                ticker.tick().await;
                if events.send(ServerEvent::Scheduled(task.clone())).is_err() {
                    break;
                }
            }
        });

        let tasks = self.rooms.entry(room_id.to_string()).or_default();
        tasks.stop_turn_timer();
        tasks.turn_timer = Some(handle);
    }

    pub fn stop_turn_timer(&mut self, room_id: &str) {
        if let Some(tasks) = self.rooms.get_mut(room_id) {
            tasks.stop_turn_timer();
        }
    }

    /// Aborts everything pending for the room.
    pub fn cancel_room(&mut self, room_id: &str) {
        if self.rooms.remove(room_id).is_some() {
            debug!("Cancelled scheduled work for room {}", room_id);
        }
    }

    pub fn has_turn_timer(&self, room_id: &str) -> bool {
        self.rooms
            .get(room_id)
            .is_some_and(|tasks| tasks.turn_timer.is_some())
    }
}
