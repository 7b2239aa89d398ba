//! Board generation.
//!
//! A deck is built by sampling `total_pairs` distinct symbols from the
//! palette, laying down two cards per symbol and shuffling the result.
//! Card ids are assigned after the final shuffle so that `id` always equals
//! the card's position on the board.

use rand::seq::SliceRandom;
use rand::Rng;
use shared::{Card, GridSize, SYMBOLS};

/// Generates a shuffled deck using the thread-local RNG.
pub fn generate_deck(grid_size: GridSize) -> Vec<Card> {
    generate_deck_with_rng(grid_size, &mut rand::thread_rng())
}

pub fn generate_deck_with_rng<R: Rng + ?Sized>(grid_size: GridSize, rng: &mut R) -> Vec<Card> {
    let total_pairs = grid_size.total_pairs();

    let mut palette: Vec<usize> = (0..SYMBOLS.len()).collect();
    palette.shuffle(rng);

    let mut symbol_ids: Vec<usize> = palette
        .into_iter()
        .take(total_pairs)
        .flat_map(|symbol_id| [symbol_id, symbol_id])
        .collect();
    symbol_ids.shuffle(rng);

    symbol_ids
        .into_iter()
        .enumerate()
        .map(|(id, symbol_id)| Card::new(id, symbol_id))
        .collect()
}
