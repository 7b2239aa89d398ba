//! Client-side view of a connection.
//!
//! [`ConnectionState`] folds every [`ServerMessage`] into what a player's UI
//! needs to know: who we are, which room we are in, the latest redacted room
//! snapshot and the turn clock. The server remains authoritative; incremental
//! events only patch the cached snapshot until the next full `roomState`
//! replaces it.

use shared::{FinalScore, Player, PublicCard, RoomState, RoomStatus, ServerMessage};
use uuid::Uuid;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Phase {
    /// Socket open but no `CONNECTED` greeting yet.
    #[default]
    Connecting,
    /// Greeted by the server, not in a room.
    Lobby,
    InRoom,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct GameOver {
    pub winner_id: Option<Uuid>,
    pub is_draw: bool,
    pub final_scores: Vec<FinalScore>,
}

#[derive(Debug, Clone, Default)]
pub struct ConnectionState {
    pub phase: Phase,
    pub server_version: Option<String>,
    pub player_id: Option<Uuid>,
    pub player_index: Option<usize>,
    pub room_id: Option<String>,
    pub room: Option<RoomState>,
    pub time_left: u32,
    pub is_warning: bool,
    /// Seconds a fresh turn starts with, as of the last `GAME_STARTED`.
    pub turn_budget: u32,
    pub last_error: Option<String>,
    pub result: Option<GameOver>,
}

impl ConnectionState {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn apply(&mut self, message: &ServerMessage) {
        match message {
            ServerMessage::Connected { version } => {
                self.phase = Phase::Lobby;
                self.server_version = Some(version.clone());
            }
            ServerMessage::JoinedRoom {
                player_id,
                room_id,
                room_state,
                ..
            } => {
                self.phase = Phase::InRoom;
                self.player_id = Some(*player_id);
                self.room_id = Some(room_id.clone());
                self.result = None;
                self.last_error = None;
                self.replace_room(room_state);
            }
            ServerMessage::PlayerJoined { room_state, .. }
            | ServerMessage::PlayerLeft { room_state, .. }
            | ServerMessage::TurnChanged { room_state, .. }
            | ServerMessage::TurnTimeout { room_state, .. } => self.replace_room(room_state),
            ServerMessage::GameStarted { room_state } => {
                self.result = None;
                self.turn_budget = room_state.turn_time_left;
                self.replace_room(room_state);
            }
            ServerMessage::CardFlipped {
                card_index, card, ..
            } => self.patch_flip(*card_index, card),
            ServerMessage::MatchResult {
                is_match,
                card_indices,
                player_id,
                player_score,
                matched_pairs,
                ..
            } => {
                let Some(room) = self.room.as_mut() else {
                    return;
                };
                for &index in card_indices {
                    if let Some(card) = room.cards.get_mut(index) {
                        if *is_match {
                            card.is_matched = true;
                        } else {
                            card.is_flipped = false;
                            card.symbol_id = None;
                            card.symbol = None;
                        }
                    }
                }
                room.flipped_indices.clear();
                // A miss passes the turn; TURN_CHANGED follows with the full state.
                if !*is_match && !room.players.is_empty() {
                    room.current_player_index = (room.current_player_index + 1) % room.players.len();
                }
                if let Some(pairs) = matched_pairs {
                    room.matched_pairs = *pairs;
                }
                if let (Some(id), Some(score)) = (player_id, player_score) {
                    if let Some(player) = room.players.iter_mut().find(|p| p.id == *id) {
                        player.score = *score;
                    }
                }
                // Every resolved pair starts a fresh turn unless it ended the game.
                if room.matched_pairs < room.total_pairs {
                    room.turn_time_left = self.turn_budget;
                    self.time_left = self.turn_budget;
                    self.is_warning = false;
                }
            }
            ServerMessage::TurnTimeUpdate {
                time_left,
                is_warning,
            } => {
                self.time_left = *time_left;
                self.is_warning = *is_warning;
            }
            ServerMessage::GameEnded {
                winner_id,
                is_draw,
                final_scores,
                room_state,
            } => {
                self.replace_room(room_state);
                self.result = Some(GameOver {
                    winner_id: *winner_id,
                    is_draw: *is_draw,
                    final_scores: final_scores.clone(),
                });
            }
            ServerMessage::LeftRoom => {
                self.phase = Phase::Lobby;
                self.player_id = None;
                self.player_index = None;
                self.room_id = None;
                self.room = None;
                self.result = None;
                self.is_warning = false;
            }
            ServerMessage::Error { message } => self.last_error = Some(message.clone()),
            ServerMessage::Pong => {}
        }
    }

    fn replace_room(&mut self, room_state: &RoomState) {
        self.player_index = self.player_id.and_then(|id| room_state.player_index(id));
        self.time_left = room_state.turn_time_left;
        self.is_warning = false;
        self.room = Some(room_state.clone());
    }

    fn patch_flip(&mut self, card_index: usize, card: &PublicCard) {
        let Some(room) = self.room.as_mut() else {
            return;
        };
        if let Some(slot) = room.cards.get_mut(card_index) {
            *slot = card.clone();
        }
        if !room.flipped_indices.contains(&card_index) {
            room.flipped_indices.push(card_index);
        }
    }

    pub fn status(&self) -> Option<RoomStatus> {
        self.room.as_ref().map(|room| room.status)
    }

    pub fn is_my_turn(&self) -> bool {
        match (&self.room, self.player_index) {
            (Some(room), Some(index)) => {
                room.status == RoomStatus::Playing && room.current_player_index == index
            }
            _ => false,
        }
    }

    /// Whether flipping `card_index` now would be accepted by the server.
    pub fn can_flip(&self, card_index: usize) -> bool {
        let Some(room) = self.room.as_ref() else {
            return false;
        };
        self.is_my_turn()
            && room.flipped_indices.len() < 2
            && room
                .cards
                .get(card_index)
                .is_some_and(|card| !card.is_flipped && !card.is_matched)
    }

    pub fn opponent(&self) -> Option<&Player> {
        let me = self.player_id?;
        self.room.as_ref()?.players.iter().find(|p| p.id != me)
    }

    pub fn me(&self) -> Option<&Player> {
        let me = self.player_id?;
        self.room.as_ref()?.players.iter().find(|p| p.id == me)
    }

    pub fn did_win(&self) -> Option<bool> {
        let result = self.result.as_ref()?;
        Some(result.winner_id.is_some() && result.winner_id == self.player_id)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use shared::GridSize;

    fn concealed(id: usize) -> PublicCard {
        PublicCard {
            id,
            symbol_id: None,
            symbol: None,
            is_flipped: false,
            is_matched: false,
        }
    }

    fn revealed(id: usize, symbol_id: usize) -> PublicCard {
        PublicCard {
            id,
            symbol_id: Some(symbol_id),
            symbol: Some(shared::SYMBOLS[symbol_id].to_string()),
            is_flipped: true,
            is_matched: false,
        }
    }

    fn room_state(players: &[Player], status: RoomStatus, current: usize) -> RoomState {
        RoomState {
            id: "ROOM0001".to_string(),
            grid_size: GridSize::FourByFour,
            players: players.to_vec(),
            cards: (0..16).map(concealed).collect(),
            current_player_index: current,
            flipped_indices: Vec::new(),
            matched_pairs: 0,
            total_pairs: 8,
            status,
            turn_time_left: 30,
        }
    }

    fn joined_pair() -> (ConnectionState, Player, Player) {
        let me = Player::new(Uuid::new_v4(), "Me", "🦊");
        let them = Player::new(Uuid::new_v4(), "Them", "🐼");
        let mut state = ConnectionState::new();
        state.apply(&ServerMessage::Connected {
            version: shared::PROTOCOL_VERSION.to_string(),
        });
        state.apply(&ServerMessage::JoinedRoom {
            player_id: me.id,
            room_id: "ROOM0001".to_string(),
            player_index: 0,
            room_state: room_state(&[me.clone()], RoomStatus::Waiting, 0),
        });
        state.apply(&ServerMessage::PlayerJoined {
            player: them.clone(),
            room_state: room_state(&[me.clone(), them.clone()], RoomStatus::Waiting, 0),
        });
        (state, me, them)
    }

    fn started() -> (ConnectionState, Player, Player) {
        let (mut state, me, them) = joined_pair();
        state.apply(&ServerMessage::GameStarted {
            room_state: room_state(&[me.clone(), them.clone()], RoomStatus::Playing, 0),
        });
        (state, me, them)
    }

    #[test]
    fn test_connect_and_join() {
        let mut state = ConnectionState::new();
        assert_eq!(state.phase, Phase::Connecting);

        let (state_after, me, them) = joined_pair();
        state = state_after;
        assert_eq!(state.phase, Phase::InRoom);
        assert_eq!(state.server_version.as_deref(), Some("1.0.0"));
        assert_eq!(state.player_id, Some(me.id));
        assert_eq!(state.player_index, Some(0));
        assert_eq!(state.room_id.as_deref(), Some("ROOM0001"));
        assert_eq!(state.opponent().map(|p| p.id), Some(them.id));
        assert_eq!(state.status(), Some(RoomStatus::Waiting));
        assert!(!state.is_my_turn());
    }

    #[test]
    fn test_turn_ownership() {
        let (mut state, me, them) = started();
        assert!(state.is_my_turn());
        assert!(state.can_flip(0));
        assert!(!state.can_flip(16));

        state.apply(&ServerMessage::TurnChanged {
            current_player_index: 1,
            room_state: room_state(&[me, them], RoomStatus::Playing, 1),
        });
        assert!(!state.is_my_turn());
        assert!(!state.can_flip(0));
    }

    #[test]
    fn test_card_flipped_patches_single_card() {
        let (mut state, me, _) = started();
        state.apply(&ServerMessage::CardFlipped {
            card_index: 4,
            card: revealed(4, 2),
            player_id: me.id,
        });

        let room = state.room.as_ref().unwrap();
        assert_eq!(room.cards[4].symbol_id, Some(2));
        assert_eq!(room.flipped_indices, vec![4]);
        assert!(room.cards[3].symbol_id.is_none());
        assert!(!state.can_flip(4));
        assert!(state.can_flip(0));
    }

    #[test]
    fn test_no_third_flip_while_pair_pending() {
        let (mut state, me, _) = started();
        for (index, symbol) in [(0, 3), (1, 0)] {
            state.apply(&ServerMessage::CardFlipped {
                card_index: index,
                card: revealed(index, symbol),
                player_id: me.id,
            });
        }
        assert!(!state.can_flip(2));
    }

    #[test]
    fn test_match_result_patches_scores_and_cards() {
        let (mut state, me, _) = started();
        for index in [0, 5] {
            state.apply(&ServerMessage::CardFlipped {
                card_index: index,
                card: revealed(index, 3),
                player_id: me.id,
            });
        }
        state.apply(&ServerMessage::MatchResult {
            is_match: true,
            card_indices: vec![0, 5],
            player_id: Some(me.id),
            player_score: Some(1),
            matched_pairs: Some(1),
            total_pairs: Some(8),
        });

        let room = state.room.as_ref().unwrap();
        assert!(room.cards[0].is_matched && room.cards[5].is_matched);
        assert!(room.flipped_indices.is_empty());
        assert_eq!(room.matched_pairs, 1);
        assert_eq!(state.me().unwrap().score, 1);
        assert!(state.is_my_turn());
        assert!(!state.can_flip(0));
        assert!(state.can_flip(1));
    }

    #[test]
    fn test_mismatch_conceals_cards_again() {
        let (mut state, me, _) = started();
        state.apply(&ServerMessage::CardFlipped {
            card_index: 1,
            card: revealed(1, 0),
            player_id: me.id,
        });
        state.apply(&ServerMessage::CardFlipped {
            card_index: 2,
            card: revealed(2, 5),
            player_id: me.id,
        });
        state.apply(&ServerMessage::MatchResult {
            is_match: false,
            card_indices: vec![1, 2],
            player_id: None,
            player_score: None,
            matched_pairs: None,
            total_pairs: None,
        });

        let room = state.room.as_ref().unwrap();
        assert!(room.cards[1].symbol_id.is_none());
        assert!(!room.cards[2].is_flipped);
        assert!(room.flipped_indices.is_empty());
        assert_eq!(room.current_player_index, 1);
        assert!(!state.is_my_turn());
    }

    #[test]
    fn test_timer_updates_and_reset() {
        let (mut state, me, them) = started();
        state.apply(&ServerMessage::TurnTimeUpdate {
            time_left: 7,
            is_warning: true,
        });
        assert_eq!(state.time_left, 7);
        assert!(state.is_warning);

        state.apply(&ServerMessage::TurnTimeout {
            current_player_index: 1,
            room_state: room_state(&[me, them], RoomStatus::Playing, 1),
        });
        assert_eq!(state.time_left, 30);
        assert!(!state.is_warning);
        assert!(!state.is_my_turn());
    }

    #[test]
    fn test_match_restores_full_turn_clock() {
        let (mut state, me, _) = started();
        assert_eq!(state.turn_budget, 30);
        state.apply(&ServerMessage::TurnTimeUpdate {
            time_left: 3,
            is_warning: true,
        });
        for index in [0, 5] {
            state.apply(&ServerMessage::CardFlipped {
                card_index: index,
                card: revealed(index, 3),
                player_id: me.id,
            });
        }
        state.apply(&ServerMessage::MatchResult {
            is_match: true,
            card_indices: vec![0, 5],
            player_id: Some(me.id),
            player_score: Some(1),
            matched_pairs: Some(1),
            total_pairs: Some(8),
        });

        assert_eq!(state.time_left, 30);
        assert!(!state.is_warning);
        assert_eq!(state.room.as_ref().unwrap().turn_time_left, 30);
        assert!(state.is_my_turn());
    }

    #[test]
    fn test_final_match_leaves_clock_alone() {
        let (mut state, me, _) = started();
        state.room.as_mut().unwrap().matched_pairs = 7;
        state.apply(&ServerMessage::TurnTimeUpdate {
            time_left: 4,
            is_warning: true,
        });
        state.apply(&ServerMessage::MatchResult {
            is_match: true,
            card_indices: vec![14, 15],
            player_id: Some(me.id),
            player_score: Some(8),
            matched_pairs: Some(8),
            total_pairs: Some(8),
        });
        assert_eq!(state.time_left, 4);
    }

    #[test]
    fn test_game_end_and_leave() {
        let (mut state, me, them) = started();
        state.apply(&ServerMessage::GameEnded {
            winner_id: Some(me.id),
            is_draw: false,
            final_scores: vec![
                FinalScore {
                    player_id: me.id,
                    name: me.name.clone(),
                    score: 5,
                },
                FinalScore {
                    player_id: them.id,
                    name: them.name.clone(),
                    score: 3,
                },
            ],
            room_state: room_state(&[me.clone(), them.clone()], RoomStatus::Finished, 0),
        });
        assert_eq!(state.did_win(), Some(true));
        assert_eq!(state.status(), Some(RoomStatus::Finished));
        assert!(!state.is_my_turn());

        state.apply(&ServerMessage::GameStarted {
            room_state: room_state(&[me, them], RoomStatus::Playing, 0),
        });
        assert!(state.result.is_none());

        state.apply(&ServerMessage::LeftRoom);
        assert_eq!(state.phase, Phase::Lobby);
        assert!(state.room.is_none());
        assert!(state.player_id.is_none());
    }

    #[test]
    fn test_seat_index_follows_roster() {
        let (mut state, me, them) = joined_pair();
        state.apply(&ServerMessage::PlayerJoined {
            player: me.clone(),
            room_state: room_state(&[them.clone(), me.clone()], RoomStatus::Waiting, 0),
        });
        assert_eq!(state.player_index, Some(1));

        state.apply(&ServerMessage::PlayerLeft {
            player_id: them.id,
            room_state: room_state(&[me.clone()], RoomStatus::Waiting, 0),
        });
        assert_eq!(state.player_index, Some(0));
        assert!(state.opponent().is_none());
    }

    #[test]
    fn test_error_is_recorded() {
        let (mut state, _, _) = started();
        state.apply(&ServerMessage::error("Not your turn"));
        assert_eq!(state.last_error.as_deref(), Some("Not your turn"));
        assert!(state.is_my_turn());
    }
}
