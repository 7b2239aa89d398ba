//! Card choice for the headless client.
//!
//! The bot remembers every symbol it has seen revealed. It completes a known
//! pair when it can and otherwise explores the lowest card it has not seen,
//! so a game between two bots always finishes.

use crate::state::ConnectionState;
use std::collections::HashMap;

#[derive(Debug, Default)]
pub struct CardMemory {
    seen: HashMap<usize, usize>,
}

impl CardMemory {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn remember(&mut self, card_index: usize, symbol_id: usize) {
        self.seen.insert(card_index, symbol_id);
    }

    pub fn forget_all(&mut self) {
        self.seen.clear();
    }

    fn partner_of(&self, state: &ConnectionState, card_index: usize) -> Option<usize> {
        let symbol_id = self.seen.get(&card_index)?;
        self.seen
            .iter()
            .filter(|&(&index, &symbol)| index != card_index && symbol == *symbol_id)
            .map(|(&index, _)| index)
            .filter(|&index| state.can_flip(index))
            .min()
    }

    /// Next card to flip, or `None` when it is not our move.
    pub fn choose(&self, state: &ConnectionState) -> Option<usize> {
        let room = state.room.as_ref()?;
        let flippable: Vec<usize> = (0..room.cards.len())
            .filter(|&index| state.can_flip(index))
            .collect();
        let first_unseen = flippable
            .iter()
            .copied()
            .find(|index| !self.seen.contains_key(index));

        match room.flipped_indices.as_slice() {
            [pending] => self
                .partner_of(state, *pending)
                .or(first_unseen)
                .or_else(|| flippable.first().copied()),
            [] => flippable
                .iter()
                .copied()
                .find(|&index| self.partner_of(state, index).is_some())
                .or(first_unseen)
                .or_else(|| flippable.first().copied()),
            _ => None,
        }
    }
}
