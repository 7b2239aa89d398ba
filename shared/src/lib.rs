use serde::{Deserialize, Serialize};
use std::fmt;
use uuid::Uuid;

pub const PROTOCOL_VERSION: &str = "1.0.0";
pub const MAX_PLAYERS: usize = 2;
pub const ROOM_ID_LEN: usize = 8;
pub const TURN_TIME_LIMIT_SECS: u32 = 30;
pub const TIME_WARNING_THRESHOLD_SECS: u32 = 10;
pub const PING_INTERVAL_SECS: u64 = 30;

pub const SYMBOLS: [&str; 18] = [
    "🐶", "🐱", "🐭", "🐹", "🐰", "🦊", "🐻", "🐼", "🐨", "🐯", "🦁", "🐮", "🐷", "🐸", "🐵", "🐔",
    "🐧", "🐦",
];

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
pub enum GridSize {
    #[default]
    #[serde(rename = "4x4")]
    FourByFour,
    #[serde(rename = "4x6")]
    FourBySix,
    #[serde(rename = "6x6")]
    SixBySix,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct GridConfig {
    pub rows: usize,
    pub cols: usize,
    pub total_cards: usize,
    pub total_pairs: usize,
}

impl GridSize {
    pub const ALL: [GridSize; 3] = [GridSize::FourByFour, GridSize::FourBySix, GridSize::SixBySix];

    pub fn config(self) -> GridConfig {
        let (rows, cols) = match self {
            GridSize::FourByFour => (4, 4),
            GridSize::FourBySix => (4, 6),
            GridSize::SixBySix => (6, 6),
        };
        GridConfig {
            rows,
            cols,
            total_cards: rows * cols,
            total_pairs: rows * cols / 2,
        }
    }

    pub fn total_pairs(self) -> usize {
        self.config().total_pairs
    }

    pub fn as_str(self) -> &'static str {
        match self {
            GridSize::FourByFour => "4x4",
            GridSize::FourBySix => "4x6",
            GridSize::SixBySix => "6x6",
        }
    }
}

impl fmt::Display for GridSize {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl std::str::FromStr for GridSize {
    type Err = String;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        GridSize::ALL
            .into_iter()
            .find(|size| size.as_str() == value)
            .ok_or_else(|| format!("unknown grid size '{value}', expected 4x4, 4x6 or 6x6"))
    }
}

/// Authoritative card. Never sent to clients directly, see [`PublicCard`].
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Card {
    pub id: usize,
    pub symbol_id: usize,
    pub symbol: String,
    pub is_flipped: bool,
    pub is_matched: bool,
}

impl Card {
    pub fn new(id: usize, symbol_id: usize) -> Self {
        Self {
            id,
            symbol_id,
            symbol: SYMBOLS[symbol_id % SYMBOLS.len()].to_string(),
            is_flipped: false,
            is_matched: false,
        }
    }

    pub fn is_concealed(&self) -> bool {
        !self.is_flipped && !self.is_matched
    }
}

/// Card as seen by clients: identity is hidden while the card is face down.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PublicCard {
    pub id: usize,
    pub symbol_id: Option<usize>,
    pub symbol: Option<String>,
    pub is_flipped: bool,
    pub is_matched: bool,
}

impl From<&Card> for PublicCard {
    fn from(card: &Card) -> Self {
        let revealed = !card.is_concealed();
        Self {
            id: card.id,
            symbol_id: revealed.then_some(card.symbol_id),
            symbol: revealed.then(|| card.symbol.clone()),
            is_flipped: card.is_flipped,
            is_matched: card.is_matched,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Player {
    pub id: Uuid,
    pub name: String,
    pub avatar: String,
    pub score: u32,
    pub is_ready: bool,
}

impl Player {
    pub fn new(id: Uuid, name: impl Into<String>, avatar: impl Into<String>) -> Self {
        Self {
            id,
            name: name.into(),
            avatar: avatar.into(),
            score: 0,
            is_ready: true,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum RoomStatus {
    Waiting,
    Playing,
    Finished,
}

/// Redacted projection of a room, the only room view that goes on the wire.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RoomState {
    pub id: String,
    pub grid_size: GridSize,
    pub players: Vec<Player>,
    pub cards: Vec<PublicCard>,
    pub current_player_index: usize,
    pub flipped_indices: Vec<usize>,
    pub matched_pairs: usize,
    pub total_pairs: usize,
    pub status: RoomStatus,
    pub turn_time_left: u32,
}

impl RoomState {
    pub fn player_index(&self, player_id: Uuid) -> Option<usize> {
        self.players.iter().position(|p| p.id == player_id)
    }

    pub fn current_player(&self) -> Option<&Player> {
        self.players.get(self.current_player_index)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct FinalScore {
    pub player_id: Uuid,
    pub name: String,
    pub score: u32,
}

#[derive(Debug, thiserror::Error)]
pub enum ProtocolError {
    #[error("malformed message: {0}")]
    Malformed(#[source] serde_json::Error),
    #[error("unknown message type '{0}'")]
    UnknownType(String),
    #[error("invalid payload for {kind}: {source}")]
    InvalidPayload {
        kind: &'static str,
        #[source]
        source: serde_json::Error,
    },
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(
    tag = "type",
    content = "payload",
    rename_all = "SCREAMING_SNAKE_CASE",
    rename_all_fields = "camelCase"
)]
pub enum ClientMessage {
    JoinGame {
        player_name: String,
        avatar: String,
        grid_size: GridSize,
    },
    FlipCard {
        card_index: usize,
    },
    LeaveRoom,
    Rematch,
    Ping,
}

#[derive(Deserialize)]
struct Envelope {
    #[serde(rename = "type")]
    kind: String,
    #[serde(default)]
    payload: serde_json::Value,
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct JoinPayload {
    #[serde(default)]
    player_name: String,
    #[serde(default)]
    avatar: String,
    #[serde(default)]
    grid_size: GridSize,
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct FlipPayload {
    card_index: usize,
}

impl ClientMessage {
    pub fn from_json(text: &str) -> Result<Self, ProtocolError> {
        let envelope: Envelope = serde_json::from_str(text).map_err(ProtocolError::Malformed)?;

        match envelope.kind.as_str() {
            "JOIN_GAME" => {
                let payload: JoinPayload = serde_json::from_value(envelope.payload)
                    .map_err(|source| ProtocolError::InvalidPayload {
                        kind: "JOIN_GAME",
                        source,
                    })?;
                Ok(ClientMessage::JoinGame {
                    player_name: payload.player_name,
                    avatar: payload.avatar,
                    grid_size: payload.grid_size,
                })
            }
            "FLIP_CARD" => {
                let payload: FlipPayload = serde_json::from_value(envelope.payload)
                    .map_err(|source| ProtocolError::InvalidPayload {
                        kind: "FLIP_CARD",
                        source,
                    })?;
                Ok(ClientMessage::FlipCard {
                    card_index: payload.card_index,
                })
            }
            "LEAVE_ROOM" => Ok(ClientMessage::LeaveRoom),
            "REMATCH" => Ok(ClientMessage::Rematch),
            "PING" => Ok(ClientMessage::Ping),
            _ => Err(ProtocolError::UnknownType(envelope.kind)),
        }
    }

    pub fn to_json(&self) -> Result<String, serde_json::Error> {
        serde_json::to_string(self)
    }

    pub fn kind(&self) -> &'static str {
        match self {
            ClientMessage::JoinGame { .. } => "JOIN_GAME",
            ClientMessage::FlipCard { .. } => "FLIP_CARD",
            ClientMessage::LeaveRoom => "LEAVE_ROOM",
            ClientMessage::Rematch => "REMATCH",
            ClientMessage::Ping => "PING",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(
    tag = "type",
    rename_all = "SCREAMING_SNAKE_CASE",
    rename_all_fields = "camelCase"
)]
pub enum ServerMessage {
    Connected {
        version: String,
    },
    JoinedRoom {
        player_id: Uuid,
        room_id: String,
        player_index: usize,
        room_state: RoomState,
    },
    PlayerJoined {
        player: Player,
        room_state: RoomState,
    },
    PlayerLeft {
        player_id: Uuid,
        room_state: RoomState,
    },
    GameStarted {
        room_state: RoomState,
    },
    CardFlipped {
        card_index: usize,
        card: PublicCard,
        player_id: Uuid,
    },
    MatchResult {
        is_match: bool,
        card_indices: Vec<usize>,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        player_id: Option<Uuid>,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        player_score: Option<u32>,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        matched_pairs: Option<usize>,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        total_pairs: Option<usize>,
    },
    TurnChanged {
        current_player_index: usize,
        room_state: RoomState,
    },
    TurnTimeUpdate {
        time_left: u32,
        is_warning: bool,
    },
    TurnTimeout {
        current_player_index: usize,
        room_state: RoomState,
    },
    GameEnded {
        winner_id: Option<Uuid>,
        is_draw: bool,
        final_scores: Vec<FinalScore>,
        room_state: RoomState,
    },
    LeftRoom,
    Error {
        message: String,
    },
    Pong,
}

impl ServerMessage {
    pub fn error(message: impl Into<String>) -> Self {
        ServerMessage::Error {
            message: message.into(),
        }
    }

    pub fn to_json(&self) -> Result<String, serde_json::Error> {
        serde_json::to_string(self)
    }

    pub fn from_json(text: &str) -> Result<Self, serde_json::Error> {
        serde_json::from_str(text)
    }

    /// Room snapshot carried by this message, if any.
    pub fn room_state(&self) -> Option<&RoomState> {
        match self {
            ServerMessage::JoinedRoom { room_state, .. }
            | ServerMessage::PlayerJoined { room_state, .. }
            | ServerMessage::PlayerLeft { room_state, .. }
            | ServerMessage::GameStarted { room_state }
            | ServerMessage::TurnChanged { room_state, .. }
            | ServerMessage::TurnTimeout { room_state, .. }
            | ServerMessage::GameEnded { room_state, .. } => Some(room_state),
            _ => None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::{json, Value};

    fn sample_state(cards: Vec<Card>) -> RoomState {
        RoomState {
            id: "ABCD1234".to_string(),
            grid_size: GridSize::FourByFour,
            players: vec![Player::new(Uuid::new_v4(), "Ada", "🦊")],
            cards: cards.iter().map(PublicCard::from).collect(),
            current_player_index: 0,
            flipped_indices: vec![],
            matched_pairs: 0,
            total_pairs: 8,
            status: RoomStatus::Waiting,
            turn_time_left: TURN_TIME_LIMIT_SECS,
        }
    }

    #[test]
    fn test_grid_configs() {
        assert_eq!(
            GridSize::FourByFour.config(),
            GridConfig {
                rows: 4,
                cols: 4,
                total_cards: 16,
                total_pairs: 8
            }
        );
        assert_eq!(GridSize::FourBySix.total_pairs(), 12);
        assert_eq!(GridSize::SixBySix.total_pairs(), 18);
        assert!(GridSize::SixBySix.total_pairs() <= SYMBOLS.len());
    }

    #[test]
    fn test_grid_size_parsing() {
        assert_eq!("4x6".parse::<GridSize>(), Ok(GridSize::FourBySix));
        assert!("5x5".parse::<GridSize>().is_err());
        assert_eq!(serde_json::to_value(GridSize::SixBySix).unwrap(), json!("6x6"));
    }

    #[test]
    fn test_symbols_are_unique() {
        let mut symbols = SYMBOLS.to_vec();
        symbols.sort_unstable();
        symbols.dedup();
        assert_eq!(symbols.len(), SYMBOLS.len());
    }

    #[test]
    fn test_public_card_redacts_concealed() {
        let card = Card::new(3, 7);
        let public = PublicCard::from(&card);
        assert_eq!(public.symbol_id, None);
        assert_eq!(public.symbol, None);

        let value = serde_json::to_value(&public).unwrap();
        assert_eq!(value["symbolId"], Value::Null);
        assert_eq!(value["symbol"], Value::Null);
    }

    #[test]
    fn test_public_card_reveals_flipped_and_matched() {
        let mut flipped = Card::new(0, 2);
        flipped.is_flipped = true;
        let public = PublicCard::from(&flipped);
        assert_eq!(public.symbol_id, Some(2));
        assert_eq!(public.symbol.as_deref(), Some(SYMBOLS[2]));

        let mut matched = Card::new(1, 4);
        matched.is_matched = true;
        assert_eq!(PublicCard::from(&matched).symbol_id, Some(4));
    }

    #[test]
    fn test_decode_join_game() {
        let text = r#"{"type":"JOIN_GAME","payload":{"playerName":"Ada","avatar":"🦊","gridSize":"4x6"}}"#;
        let msg = ClientMessage::from_json(text).unwrap();
        assert_eq!(
            msg,
            ClientMessage::JoinGame {
                player_name: "Ada".to_string(),
                avatar: "🦊".to_string(),
                grid_size: GridSize::FourBySix,
            }
        );
    }

    #[test]
    fn test_decode_unit_messages_with_or_without_payload() {
        assert_eq!(
            ClientMessage::from_json(r#"{"type":"PING"}"#).unwrap(),
            ClientMessage::Ping
        );
        assert_eq!(
            ClientMessage::from_json(r#"{"type":"LEAVE_ROOM","payload":{}}"#).unwrap(),
            ClientMessage::LeaveRoom
        );
        assert_eq!(
            ClientMessage::from_json(r#"{"type":"REMATCH","payload":null}"#).unwrap(),
            ClientMessage::Rematch
        );
    }

    #[test]
    fn test_decode_rejects_unknown_and_malformed() {
        assert!(matches!(
            ClientMessage::from_json(r#"{"type":"CHEAT","payload":{}}"#),
            Err(ProtocolError::UnknownType(kind)) if kind == "CHEAT"
        ));
        assert!(matches!(
            ClientMessage::from_json("not json"),
            Err(ProtocolError::Malformed(_))
        ));
        assert!(matches!(
            ClientMessage::from_json(r#"{"payload":{}}"#),
            Err(ProtocolError::Malformed(_))
        ));
        assert!(matches!(
            ClientMessage::from_json(r#"{"type":"FLIP_CARD","payload":{"cardIndex":-1}}"#),
            Err(ProtocolError::InvalidPayload { kind: "FLIP_CARD", .. })
        ));
        assert!(matches!(
            ClientMessage::from_json(r#"{"type":"JOIN_GAME","payload":{"gridSize":"9x9"}}"#),
            Err(ProtocolError::InvalidPayload { kind: "JOIN_GAME", .. })
        ));
    }

    #[test]
    fn test_client_message_encoding_matches_decoder() {
        let msg = ClientMessage::FlipCard { card_index: 5 };
        let text = msg.to_json().unwrap();
        assert_eq!(
            serde_json::from_str::<Value>(&text).unwrap(),
            json!({"type": "FLIP_CARD", "payload": {"cardIndex": 5}})
        );
        assert_eq!(ClientMessage::from_json(&text).unwrap(), msg);

        let ping: Value = serde_json::from_str(&ClientMessage::Ping.to_json().unwrap()).unwrap();
        assert_eq!(ping["type"], "PING");
    }

    #[test]
    fn test_server_message_wire_shape() {
        let state = sample_state(vec![Card::new(0, 1), Card::new(1, 1)]);
        let msg = ServerMessage::GameStarted {
            room_state: state.clone(),
        };
        let value: Value = serde_json::from_str(&msg.to_json().unwrap()).unwrap();
        assert_eq!(value["type"], "GAME_STARTED");
        assert_eq!(value["roomState"]["gridSize"], "4x4");
        assert_eq!(value["roomState"]["status"], "waiting");
        assert_eq!(value["roomState"]["turnTimeLeft"], 30);
        assert_eq!(value["roomState"]["cards"][0]["symbol"], Value::Null);

        let left: Value = serde_json::from_str(&ServerMessage::LeftRoom.to_json().unwrap()).unwrap();
        assert_eq!(left, json!({"type": "LEFT_ROOM"}));
    }

    #[test]
    fn test_match_result_omits_absent_fields() {
        let msg = ServerMessage::MatchResult {
            is_match: false,
            card_indices: vec![1, 2],
            player_id: None,
            player_score: None,
            matched_pairs: None,
            total_pairs: None,
        };
        let value: Value = serde_json::from_str(&msg.to_json().unwrap()).unwrap();
        assert_eq!(
            value,
            json!({"type": "MATCH_RESULT", "isMatch": false, "cardIndices": [1, 2]})
        );
        assert_eq!(ServerMessage::from_json(&msg.to_json().unwrap()).unwrap(), msg);
    }

    #[test]
    fn test_room_state_helpers() {
        let state = sample_state(vec![]);
        let id = state.players[0].id;
        assert_eq!(state.player_index(id), Some(0));
        assert_eq!(state.player_index(Uuid::new_v4()), None);
        assert_eq!(state.current_player().map(|p| p.name.as_str()), Some("Ada"));
    }
}
