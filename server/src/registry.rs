//! Room table and greedy matchmaking.
//!
//! The registry owns every live [`Room`]. Matchmaking is first-fit: the
//! oldest open room with the requested board size is claimed synchronously,
//! and a new room is created when none fits. There is no queue and no
//! reservation, a room is simply joined.

use crate::room::Room;
use log::info;
use rand::Rng;
use shared::{GridSize, ROOM_ID_LEN};
use std::collections::HashMap;

const ROOM_ID_ALPHABET: &[u8] = b"ABCDEFGHIJKLMNOPQRSTUVWXYZ0123456789";

pub fn generate_room_id<R: Rng + ?Sized>(rng: &mut R) -> String {
    (0..ROOM_ID_LEN)
        .map(|_| ROOM_ID_ALPHABET[rng.gen_range(0..ROOM_ID_ALPHABET.len())] as char)
        .collect()
}

pub struct RoomRegistry {
    rooms: HashMap<String, Room>,
    /// Room ids in creation order; matchmaking scans this.
    order: Vec<String>,
    turn_time_limit: u32,
}

impl RoomRegistry {
    pub fn new(turn_time_limit: u32) -> Self {
        Self {
            rooms: HashMap::new(),
            order: Vec::new(),
            turn_time_limit,
        }
    }

    /// Returns the id of the first open room for `grid_size`, creating one
    /// if necessary.
    pub fn find_or_create(&mut self, grid_size: GridSize) -> String {
        let open = self
            .order
            .iter()
            .find(|id| {
                self.rooms
                    .get(*id)
                    .is_some_and(|room| room.grid_size() == grid_size && room.is_open())
            })
            .cloned();

        match open {
            Some(id) => id,
            None => self.create(grid_size),
        }
    }

    pub fn create(&mut self, grid_size: GridSize) -> String {
        let mut rng = rand::thread_rng();
        let mut id = generate_room_id(&mut rng);
        while self.rooms.contains_key(&id) {
            id = generate_room_id(&mut rng);
        }

        info!("Created {} room {}", grid_size, id);
        self.rooms
            .insert(id.clone(), Room::new(id.clone(), grid_size, self.turn_time_limit));
        self.order.push(id.clone());
        id
    }

    pub fn get(&self, room_id: &str) -> Option<&Room> {
        self.rooms.get(room_id)
    }

    pub fn get_mut(&mut self, room_id: &str) -> Option<&mut Room> {
        self.rooms.get_mut(room_id)
    }

    pub fn remove(&mut self, room_id: &str) -> Option<Room> {
        let room = self.rooms.remove(room_id)?;
        self.order.retain(|id| id != room_id);
        info!("Destroyed room {}", room_id);
        Some(room)
    }

    pub fn len(&self) -> usize {
        self.rooms.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rooms.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use shared::{Player, RoomStatus};
    use uuid::Uuid;

    fn fill(registry: &mut RoomRegistry, room_id: &str) {
        let room = registry.get_mut(room_id).unwrap();
        while !room.is_full() {
            room.join(Player::new(Uuid::new_v4(), "P", "🙂")).unwrap();
        }
    }

    #[test]
    fn test_room_id_format() {
        let id = generate_room_id(&mut rand::thread_rng());
        assert_eq!(id.len(), ROOM_ID_LEN);
        assert!(id.bytes().all(|b| ROOM_ID_ALPHABET.contains(&b)));
    }

    #[test]
    fn test_creates_room_on_miss() {
        let mut registry = RoomRegistry::new(30);
        assert!(registry.is_empty());

        let id = registry.find_or_create(GridSize::FourByFour);
        let room = registry.get(&id).unwrap();
        assert_eq!(room.grid_size(), GridSize::FourByFour);
        assert_eq!(room.status(), RoomStatus::Waiting);
        assert_eq!(registry.len(), 1);
    }

    #[test]
    fn test_reuses_open_room_of_same_size() {
        let mut registry = RoomRegistry::new(30);
        let id = registry.find_or_create(GridSize::FourByFour);
        registry
            .get_mut(&id)
            .unwrap()
            .join(Player::new(Uuid::new_v4(), "A", "🙂"))
            .unwrap();

        assert_eq!(registry.find_or_create(GridSize::FourByFour), id);
        assert_eq!(registry.len(), 1);
    }

    #[test]
    fn test_grid_sizes_do_not_mix() {
        let mut registry = RoomRegistry::new(30);
        let small = registry.find_or_create(GridSize::FourByFour);
        let large = registry.find_or_create(GridSize::SixBySix);
        assert_ne!(small, large);
        assert_eq!(registry.len(), 2);
    }

    #[test]
    fn test_full_rooms_are_skipped() {
        let mut registry = RoomRegistry::new(30);
        let first = registry.find_or_create(GridSize::FourBySix);
        fill(&mut registry, &first);

        let second = registry.find_or_create(GridSize::FourBySix);
        assert_ne!(first, second);
    }

    #[test]
    fn test_first_available_in_creation_order() {
        let mut registry = RoomRegistry::new(30);
        let first = registry.create(GridSize::FourByFour);
        let second = registry.create(GridSize::FourByFour);
        assert_eq!(registry.find_or_create(GridSize::FourByFour), first);

        fill(&mut registry, &first);
        assert_eq!(registry.find_or_create(GridSize::FourByFour), second);
    }

    #[test]
    fn test_playing_room_with_one_seat_is_not_open() {
        let mut registry = RoomRegistry::new(30);
        let id = registry.find_or_create(GridSize::FourByFour);
        fill(&mut registry, &id);
        registry.get_mut(&id).unwrap().start().unwrap();

        let other = registry.find_or_create(GridSize::FourByFour);
        assert_ne!(id, other);
    }

    #[test]
    fn test_remove() {
        let mut registry = RoomRegistry::new(30);
        let id = registry.find_or_create(GridSize::FourByFour);
        assert!(registry.remove(&id).is_some());
        assert!(registry.get(&id).is_none());
        assert!(registry.remove(&id).is_none());
        assert_ne!(registry.find_or_create(GridSize::FourByFour), id);
    }
}
