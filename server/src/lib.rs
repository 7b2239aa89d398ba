//! # Memory Match Server Library
//!
//! Authoritative server for two-player online memory matching games. Players
//! connect over WebSocket, are paired into rooms by board size, and take turns
//! flipping cards against a per-turn clock. The server owns every deck and
//! reveals a card's symbol only once it has been flipped.
//!
//! ## Architecture
//!
//! ### Single Event Loop
//! All game state lives in one [`network::Server`] task. Socket tasks, timers
//! and the health endpoint send it [`network::ServerEvent`]s over a channel,
//! and each event is processed to completion before the next. Rooms therefore
//! need no locking, and two players racing for the last seat are simply
//! handled one after the other.
//!
//! ### Scheduled Work
//! The auto-start grace delay, the pause before a flipped pair is resolved
//! and the one-second turn countdown are tokio tasks owned by
//! [`timer::Scheduler`]. When due they post back into the loop, carrying the
//! room epoch they were scheduled under so stale work is recognised and
//! dropped.
//!
//! ## Module Organization
//!
//! - `config`: tunable delays, timeouts and limits
//! - `deck`: shuffled card layouts
//! - `room`: per-match state and the turn state machine
//! - `registry`: room table and matchmaking
//! - `session`: open connections and their room bindings
//! - `timer`: per-room scheduled tasks
//! - `network`: the event loop and message routing
//! - `transport`: axum WebSocket and health endpoints
//!
//! ## Usage Example
//!
//! ```rust,no_run
//! use server::config::ServerConfig;
//! use server::network::Server;
//! use tokio::net::TcpListener;
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let server = Server::new(ServerConfig::default());
//!     let handle = server.handle();
//!     tokio::spawn(server.run());
//!
//!     let listener = TcpListener::bind("127.0.0.1:8080").await?;
//!     server::transport::serve(listener, handle).await?;
//!     Ok(())
//! }
//! ```

pub mod config;
pub mod deck;
pub mod network;
pub mod registry;
pub mod room;
pub mod session;
pub mod timer;
pub mod transport;
