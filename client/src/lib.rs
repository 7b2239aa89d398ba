//! # Memory Match Client Library
//!
//! Client side of the memory match protocol.
//!
//! ## Module Organization
//!
//! ### State Module (`state`)
//! [`state::ConnectionState`] folds the server's event stream into a local
//! view of the connection and the room. It answers the questions a player
//! interface asks before sending anything: is it our turn, may this card be
//! flipped, who is the opponent.
//!
//! ### Bot Module (`bot`)
//! Card choice for the headless client, driven by the symbols it has seen
//! revealed during the game.
//!
//! ### Network Module (`network`)
//! Drives one WebSocket connection: sends the join request once greeted,
//! keeps the connection alive with a periodic `PING`, and plays turns until
//! the requested number of games has finished.
//!
//! ## Usage Example
//!
//! ```rust,no_run
//! use client::network::{Client, ClientOptions};
//! use shared::GridSize;
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let mut client = Client::connect(ClientOptions {
//!         server_url: "ws://127.0.0.1:8080/ws".to_string(),
//!         player_name: "Ada".to_string(),
//!         avatar: "🦊".to_string(),
//!         grid_size: GridSize::FourByFour,
//!         games: 1,
//!     })
//!     .await?;
//!
//!     client.run().await?;
//!     Ok(())
//! }
//! ```

pub mod bot;
pub mod network;
pub mod state;
