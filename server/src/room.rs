//! Authoritative per-match state and its turn state machine.
//!
//! A [`Room`] moves through `waiting -> playing -> finished`, and back to
//! `playing` on rematch. It performs no I/O: every operation mutates the
//! room and returns an outcome describing what happened, which the server
//! loop turns into broadcasts and timer changes.
//!
//! ## Epochs
//! Delayed work (auto-start, pair resolution, turn ticks) is scheduled
//! outside the room and applied later. Each such task captures
//! [`Room::epoch`] when it is scheduled. The epoch advances on every turn
//! boundary, game (re)start and departure, so a task whose epoch no longer
//! matches refers to a turn or game that has since ended and must be dropped.

use crate::deck::generate_deck;
use log::info;
use shared::{
    Card, FinalScore, GridSize, Player, PublicCard, RoomState, RoomStatus, MAX_PLAYERS,
    TIME_WARNING_THRESHOLD_SECS,
};
use uuid::Uuid;

/// Rejections of player actions. The display text is sent back verbatim in
/// an `ERROR` reply; none of these mutate the room.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum GameError {
    #[error("Game is not in progress")]
    NotPlaying,
    #[error("Not your turn")]
    NotYourTurn,
    #[error("Invalid card index {0}")]
    InvalidCardIndex(usize),
    #[error("Card {0} is already flipped or matched")]
    CardUnavailable(usize),
    #[error("Two cards are already awaiting resolution")]
    PairPending,
    #[error("Room is full")]
    RoomFull,
    #[error("Two players are required to start")]
    NotEnoughPlayers,
    #[error("Rematch is only available after the game has finished")]
    NotFinished,
    #[error("Player is not in this room")]
    PlayerNotFound,
    #[error("Not in a room")]
    NotInRoom,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FlipOutcome {
    pub card_index: usize,
    pub card: PublicCard,
    /// True when this flip completed a pair that now awaits resolution.
    pub pair_complete: bool,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct GameResult {
    pub winner_id: Option<Uuid>,
    pub is_draw: bool,
    pub final_scores: Vec<FinalScore>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum MatchOutcome {
    Matched {
        card_indices: Vec<usize>,
        player_id: Uuid,
        player_score: u32,
        matched_pairs: usize,
        total_pairs: usize,
        /// Present when this pair was the last one on the board.
        game_over: Option<GameResult>,
    },
    Mismatched {
        card_indices: Vec<usize>,
        current_player_index: usize,
    },
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TickOutcome {
    /// Not playing, or a pair is awaiting resolution; the clock is held.
    Idle,
    Countdown { time_left: u32, is_warning: bool },
    TimedOut { current_player_index: usize },
}

#[derive(Debug)]
pub struct Room {
    id: String,
    grid_size: GridSize,
    players: Vec<Player>,
    cards: Vec<Card>,
    current_player_index: usize,
    flipped_indices: Vec<usize>,
    matched_pairs: usize,
    status: RoomStatus,
    turn_time_left: u32,
    turn_time_limit: u32,
    epoch: u64,
}

impl Room {
    /// Creates a waiting room with a placeholder board.
    pub fn new(id: impl Into<String>, grid_size: GridSize, turn_time_limit: u32) -> Self {
        Self {
            id: id.into(),
            grid_size,
            players: Vec::with_capacity(MAX_PLAYERS),
            cards: generate_deck(grid_size),
            current_player_index: 0,
            flipped_indices: Vec::with_capacity(2),
            matched_pairs: 0,
            status: RoomStatus::Waiting,
            turn_time_left: turn_time_limit,
            turn_time_limit,
            epoch: 0,
        }
    }

    pub fn id(&self) -> &str {
        &self.id
    }

    pub fn grid_size(&self) -> GridSize {
        self.grid_size
    }

    pub fn players(&self) -> &[Player] {
        &self.players
    }

    pub fn cards(&self) -> &[Card] {
        &self.cards
    }

    pub fn status(&self) -> RoomStatus {
        self.status
    }

    pub fn current_player_index(&self) -> usize {
        self.current_player_index
    }

    pub fn flipped_indices(&self) -> &[usize] {
        &self.flipped_indices
    }

    pub fn matched_pairs(&self) -> usize {
        self.matched_pairs
    }

    pub fn total_pairs(&self) -> usize {
        self.grid_size.total_pairs()
    }

    pub fn turn_time_left(&self) -> u32 {
        self.turn_time_left
    }

    pub fn epoch(&self) -> u64 {
        self.epoch
    }

    pub fn is_empty(&self) -> bool {
        self.players.is_empty()
    }

    pub fn is_full(&self) -> bool {
        self.players.len() >= MAX_PLAYERS
    }

    /// A room matchmaking may place a newcomer into.
    pub fn is_open(&self) -> bool {
        self.status == RoomStatus::Waiting && !self.is_full()
    }

    pub fn has_player(&self, player_id: Uuid) -> bool {
        self.players.iter().any(|p| p.id == player_id)
    }

    pub fn player(&self, player_id: Uuid) -> Option<&Player> {
        self.players.iter().find(|p| p.id == player_id)
    }

    pub fn current_player(&self) -> Option<&Player> {
        self.players.get(self.current_player_index)
    }

    /// Adds a player and returns their seat index.
    pub fn join(&mut self, player: Player) -> Result<usize, GameError> {
        if self.is_full() {
            return Err(GameError::RoomFull);
        }

        info!("Player {} ({}) joined room {}", player.name, player.id, self.id);
        self.players.push(player);
        Ok(self.players.len() - 1)
    }

    pub fn start(&mut self) -> Result<(), GameError> {
        if self.players.len() != MAX_PLAYERS {
            return Err(GameError::NotEnoughPlayers);
        }

        self.reset_game();
        info!("Room {} started a {} game", self.id, self.grid_size);
        Ok(())
    }

    pub fn rematch(&mut self, player_id: Uuid) -> Result<(), GameError> {
        if !self.has_player(player_id) {
            return Err(GameError::PlayerNotFound);
        }
        if self.status != RoomStatus::Finished {
            return Err(GameError::NotFinished);
        }
        if self.players.len() != MAX_PLAYERS {
            return Err(GameError::NotEnoughPlayers);
        }

        self.reset_game();
        info!("Room {} started a rematch", self.id);
        Ok(())
    }

    fn reset_game(&mut self) {
        self.cards = generate_deck(self.grid_size);
        self.status = RoomStatus::Playing;
        self.current_player_index = 0;
        self.flipped_indices.clear();
        self.matched_pairs = 0;
        for player in &mut self.players {
            player.score = 0;
        }
        self.begin_turn();
    }

    fn begin_turn(&mut self) {
        self.turn_time_left = self.turn_time_limit;
        self.epoch += 1;
    }

    fn pass_turn(&mut self) {
        if !self.players.is_empty() {
            self.current_player_index = (self.current_player_index + 1) % self.players.len();
        }
    }

    fn revert_pending_flips(&mut self) {
        for index in self.flipped_indices.drain(..) {
            if let Some(card) = self.cards.get_mut(index) {
                if !card.is_matched {
                    card.is_flipped = false;
                }
            }
        }
    }

    pub fn flip(&mut self, player_id: Uuid, card_index: usize) -> Result<FlipOutcome, GameError> {
        if self.status != RoomStatus::Playing {
            return Err(GameError::NotPlaying);
        }
        if self.current_player().map(|p| p.id) != Some(player_id) {
            return Err(GameError::NotYourTurn);
        }
        let card = self
            .cards
            .get(card_index)
            .ok_or(GameError::InvalidCardIndex(card_index))?;
        if !card.is_concealed() || self.flipped_indices.contains(&card_index) {
            return Err(GameError::CardUnavailable(card_index));
        }
        if self.flipped_indices.len() >= 2 {
            return Err(GameError::PairPending);
        }

        let card = &mut self.cards[card_index];
        card.is_flipped = true;
        let card = PublicCard::from(&*card);
        self.flipped_indices.push(card_index);

        Ok(FlipOutcome {
            card_index,
            card,
            pair_complete: self.flipped_indices.len() == 2,
        })
    }

    /// Settles the pending pair. Returns `None` when there is nothing to
    /// resolve, which happens when the pair was already cleared by a timeout
    /// or a departure.
    pub fn resolve_match(&mut self) -> Option<MatchOutcome> {
        if self.status != RoomStatus::Playing || self.flipped_indices.len() != 2 {
            return None;
        }

        let card_indices = self.flipped_indices.clone();
        let (first, second) = (card_indices[0], card_indices[1]);

        if self.cards[first].symbol_id != self.cards[second].symbol_id {
            self.revert_pending_flips();
            self.pass_turn();
            self.begin_turn();
            return Some(MatchOutcome::Mismatched {
                card_indices,
                current_player_index: self.current_player_index,
            });
        }

        self.cards[first].is_matched = true;
        self.cards[second].is_matched = true;
        self.flipped_indices.clear();
        self.matched_pairs += 1;

        let scorer = &mut self.players[self.current_player_index];
        scorer.score += 1;
        let (player_id, player_score) = (scorer.id, scorer.score);

        let game_over = if self.matched_pairs == self.total_pairs() {
            self.status = RoomStatus::Finished;
            self.epoch += 1;
            let result = self.game_result();
            info!(
                "Room {} finished, winner: {:?}, draw: {}",
                self.id, result.winner_id, result.is_draw
            );
            Some(result)
        } else {
            self.begin_turn();
            None
        };

        Some(MatchOutcome::Matched {
            card_indices,
            player_id,
            player_score,
            matched_pairs: self.matched_pairs,
            total_pairs: self.total_pairs(),
            game_over,
        })
    }

    /// Advances the turn clock by one second.
    pub fn tick(&mut self) -> TickOutcome {
        if self.status != RoomStatus::Playing || self.flipped_indices.len() == 2 {
            return TickOutcome::Idle;
        }

        self.turn_time_left = self.turn_time_left.saturating_sub(1);
        if self.turn_time_left > 0 {
            return TickOutcome::Countdown {
                time_left: self.turn_time_left,
                is_warning: self.turn_time_left <= TIME_WARNING_THRESHOLD_SECS,
            };
        }

        self.revert_pending_flips();
        self.pass_turn();
        self.begin_turn();
        TickOutcome::TimedOut {
            current_player_index: self.current_player_index,
        }
    }

    /// Removes a player. A remaining player is sent back to the lobby state.
    pub fn leave(&mut self, player_id: Uuid) -> Result<Player, GameError> {
        let index = self
            .players
            .iter()
            .position(|p| p.id == player_id)
            .ok_or(GameError::PlayerNotFound)?;
        let player = self.players.remove(index);

        self.revert_pending_flips();
        self.current_player_index = 0;
        self.status = RoomStatus::Waiting;
        self.begin_turn();

        info!("Player {} left room {}", player.id, self.id);
        Ok(player)
    }

    /// Final standings: a strictly higher score wins, equal scores draw.
    pub fn game_result(&self) -> GameResult {
        let final_scores: Vec<FinalScore> = self
            .players
            .iter()
            .map(|p| FinalScore {
                player_id: p.id,
                name: p.name.clone(),
                score: p.score,
            })
            .collect();

        let best = final_scores.iter().map(|s| s.score).max().unwrap_or(0);
        let leaders: Vec<&FinalScore> = final_scores.iter().filter(|s| s.score == best).collect();
        let is_draw = leaders.len() != 1;
        let winner_id = if is_draw {
            None
        } else {
            leaders.first().map(|s| s.player_id)
        };

        GameResult {
            winner_id,
            is_draw,
            final_scores,
        }
    }

    /// Replaces the board with face-down cards in the given symbol order.
    #[cfg(test)]
    pub(crate) fn set_layout(&mut self, symbol_ids: &[usize]) {
        self.cards = symbol_ids
            .iter()
            .enumerate()
            .map(|(id, &symbol_id)| Card::new(id, symbol_id))
            .collect();
    }

    /// Redacted snapshot safe to broadcast.
    pub fn public_state(&self) -> RoomState {
        RoomState {
            id: self.id.clone(),
            grid_size: self.grid_size,
            players: self.players.clone(),
            cards: self.cards.iter().map(PublicCard::from).collect(),
            current_player_index: self.current_player_index,
            flipped_indices: self.flipped_indices.clone(),
            matched_pairs: self.matched_pairs,
            total_pairs: self.total_pairs(),
            status: self.status,
            turn_time_left: self.turn_time_left,
        }
    }
}
