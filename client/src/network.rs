use crate::bot::CardMemory;
use crate::state::ConnectionState;
use futures_util::stream::{SplitSink, SplitStream};
use futures_util::{SinkExt, StreamExt};
use log::{debug, info, warn};
use shared::{ClientMessage, GridSize, ServerMessage, PING_INTERVAL_SECS};
use std::time::Duration;
use tokio::net::TcpStream;
use tokio::time::{interval_at, Instant};
use tokio_tungstenite::tungstenite::Message;
use tokio_tungstenite::{connect_async, MaybeTlsStream, WebSocketStream};

type Socket = WebSocketStream<MaybeTlsStream<TcpStream>>;

#[derive(Debug, thiserror::Error)]
pub enum ClientError {
    #[error("websocket error: {0}")]
    WebSocket(#[from] tokio_tungstenite::tungstenite::Error),
    #[error("failed to encode message: {0}")]
    Encode(#[from] serde_json::Error),
    #[error("server closed the connection")]
    Closed,
}

#[derive(Debug, Clone)]
pub struct ClientOptions {
    pub server_url: String,
    pub player_name: String,
    pub avatar: String,
    pub grid_size: GridSize,
    /// Number of games to finish before leaving.
    pub games: u32,
}

/// Headless client that joins a room and plays its turns from memory.
pub struct Client {
    options: ClientOptions,
    sink: SplitSink<Socket, Message>,
    stream: SplitStream<Socket>,
    state: ConnectionState,
    memory: CardMemory,
    /// Card we asked for and have not yet seen flipped or rejected.
    awaiting_flip: Option<usize>,
    games_finished: u32,
}

impl Client {
    pub async fn connect(options: ClientOptions) -> Result<Self, ClientError> {
        info!("Connecting to {}", options.server_url);
        let (socket, _response) = connect_async(options.server_url.as_str()).await?;
        let (sink, stream) = socket.split();

        Ok(Client {
            options,
            sink,
            stream,
            state: ConnectionState::new(),
            memory: CardMemory::new(),
            awaiting_flip: None,
            games_finished: 0,
        })
    }

    pub fn state(&self) -> &ConnectionState {
        &self.state
    }

    pub fn games_finished(&self) -> u32 {
        self.games_finished
    }

    async fn send(&mut self, message: &ClientMessage) -> Result<(), ClientError> {
        debug!("Sending {}", message.kind());
        self.sink.send(Message::Text(message.to_json()?)).await?;
        Ok(())
    }

    async fn join(&mut self) -> Result<(), ClientError> {
        let join = ClientMessage::JoinGame {
            player_name: self.options.player_name.clone(),
            avatar: self.options.avatar.clone(),
            grid_size: self.options.grid_size,
        };
        self.send(&join).await
    }

    /// Plays until the requested number of games has finished, then leaves
    /// the room and closes the socket.
    pub async fn run(&mut self) -> Result<(), ClientError> {
        let period = Duration::from_secs(PING_INTERVAL_SECS);
        let mut ping_interval = interval_at(Instant::now() + period, period);

        loop {
            tokio::select! {
                frame = self.stream.next() => {
                    let text = match frame {
                        Some(Ok(Message::Text(text))) => text,
                        Some(Ok(Message::Close(_))) | None => return Err(ClientError::Closed),
                        Some(Ok(_)) => continue,
                        Some(Err(e)) => return Err(e.into()),
                    };

                    match ServerMessage::from_json(&text) {
                        Ok(message) => {
                            if !self.handle_message(message).await? {
                                break;
                            }
                        }
                        Err(e) => warn!("Ignoring undecodable server message: {}", e),
                    }
                }

                _ = ping_interval.tick() => {
                    self.send(&ClientMessage::Ping).await?;
                }
            }
        }

        let _ = self.sink.close().await;
        Ok(())
    }

    /// Returns false once the client is done and should disconnect.
    async fn handle_message(&mut self, message: ServerMessage) -> Result<bool, ClientError> {
        self.state.apply(&message);

        match &message {
            ServerMessage::Connected { version } => {
                info!("Connected, server protocol {}", version);
                self.join().await?;
            }
            ServerMessage::JoinedRoom {
                room_id,
                player_index,
                ..
            } => {
                info!("Joined room {} as player {}", room_id, player_index + 1);
            }
            ServerMessage::PlayerJoined { player, .. } => {
                info!("{} {} is in the room", player.avatar, player.name);
            }
            ServerMessage::PlayerLeft { .. } => {
                info!("Opponent left, waiting for another player");
                self.awaiting_flip = None;
            }
            ServerMessage::GameStarted { .. } => {
                info!("Game started");
                self.memory.forget_all();
                self.awaiting_flip = None;
            }
            ServerMessage::CardFlipped {
                card_index, card, ..
            } => {
                if let Some(symbol_id) = card.symbol_id {
                    self.memory.remember(*card_index, symbol_id);
                }
                if self.awaiting_flip == Some(*card_index) {
                    self.awaiting_flip = None;
                }
            }
            ServerMessage::TurnTimeUpdate { time_left, .. } => {
                if self.state.is_my_turn() {
                    debug!("{}s left on our turn", time_left);
                }
            }
            ServerMessage::TurnTimeout { .. } => {
                warn!("Turn timed out");
                self.awaiting_flip = None;
            }
            ServerMessage::GameEnded {
                is_draw,
                final_scores,
                ..
            } => {
                self.games_finished += 1;
                let scores: Vec<String> = final_scores
                    .iter()
                    .map(|s| format!("{} {}", s.name, s.score))
                    .collect();
                match (is_draw, self.state.did_win()) {
                    (true, _) => info!("Draw: {}", scores.join(", ")),
                    (false, Some(true)) => info!("We won: {}", scores.join(", ")),
                    _ => info!("We lost: {}", scores.join(", ")),
                }

                if self.games_finished >= self.options.games {
                    self.send(&ClientMessage::LeaveRoom).await?;
                } else {
                    self.send(&ClientMessage::Rematch).await?;
                }
            }
            ServerMessage::LeftRoom => {
                info!("Left room after {} game(s)", self.games_finished);
                return Ok(false);
            }
            ServerMessage::Error { message } => {
                warn!("Server rejected request: {}", message);
                self.awaiting_flip = None;
            }
            ServerMessage::MatchResult { .. } | ServerMessage::TurnChanged { .. } => {}
            ServerMessage::Pong => debug!("Pong"),
        }

        self.take_turn().await?;
        Ok(true)
    }

    async fn take_turn(&mut self) -> Result<(), ClientError> {
        if self.awaiting_flip.is_some() {
            return Ok(());
        }
        if let Some(card_index) = self.memory.choose(&self.state) {
            self.awaiting_flip = Some(card_index);
            self.send(&ClientMessage::FlipCard { card_index }).await?;
        }
        Ok(())
    }
}
