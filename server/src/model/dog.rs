//! Dogs, their bags, and the loot lying around the map.

use serde::{Deserialize, Serialize};

use super::map::{Coords, Velocity};
use super::{DogId, LostObjectId};

/// A collectable item lying on a road. Immutable once created; it is
/// destroyed when a dog picks it up.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct LostObject {
    id: LostObjectId,
    type_index: usize,
    value: i32,
    pos: Coords,
}

impl LostObject {
    pub fn new(id: LostObjectId, type_index: usize, value: i32, pos: Coords) -> Self {
        Self { id, type_index, value, pos }
    }

    pub fn id(&self) -> LostObjectId {
        self.id
    }

    pub fn type_index(&self) -> usize {
        self.type_index
    }

    pub fn value(&self) -> i32 {
        self.value
    }

    pub fn pos(&self) -> Coords {
        self.pos
    }
}

/// An item carried in a dog's bag; keeps the id and value of the lost
/// object it was created from.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct LootInBag {
    pub id: LostObjectId,
    pub type_index: usize,
    pub value: i32,
}

impl From<&LostObject> for LootInBag {
    fn from(object: &LostObject) -> Self {
        Self {
            id: object.id,
            type_index: object.type_index,
            value: object.value,
        }
    }
}

/// A dog's bag: bounded storage for gathered loot.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Bag {
    capacity: usize,
    items: Vec<LootInBag>,
}

impl Bag {
    pub fn new(capacity: usize) -> Self {
        Self { capacity, items: Vec::new() }
    }

    pub fn with_items(capacity: usize, items: Vec<LootInBag>) -> Self {
        Self { capacity, items }
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }

    pub fn items(&self) -> &[LootInBag] {
        &self.items
    }

    pub fn len(&self) -> usize {
        self.items.len()
    }

    pub fn is_empty(&self) -> bool {
        self.items.is_empty()
    }

    pub fn is_full(&self) -> bool {
        self.items.len() >= self.capacity
    }

    /// Adds an item unless the bag is full. Returns whether it fit.
    pub fn try_add(&mut self, item: LootInBag) -> bool {
        if self.is_full() {
            return false;
        }
        self.items.push(item);
        true
    }

    pub fn value_sum(&self) -> i32 {
        self.items.iter().map(|item| item.value).sum()
    }

    pub fn clear(&mut self) {
        self.items.clear();
    }
}

/// A player's avatar inside a session.
#[derive(Debug, Clone, PartialEq)]
pub struct Dog {
    id: DogId,
    coords: Coords,
    velocity: Velocity,
    direction: String,
    bag: Bag,
    score: i32,
    life_time_seconds: f64,
    inactive_ms: u64,
}

impl Dog {
    pub fn new(id: DogId, coords: Coords, bag_capacity: usize) -> Self {
        Self {
            id,
            coords,
            velocity: Velocity::default(),
            direction: "U".to_string(),
            bag: Bag::new(bag_capacity),
            score: 0,
            life_time_seconds: 0.0,
            inactive_ms: 0,
        }
    }

    pub fn id(&self) -> DogId {
        self.id
    }

    pub fn coords(&self) -> Coords {
        self.coords
    }

    pub fn set_coords(&mut self, coords: Coords) {
        self.coords = coords;
    }

    pub fn velocity(&self) -> Velocity {
        self.velocity
    }

    /// Sets the velocity; a nonzero velocity marks the dog as active again.
    pub fn set_velocity(&mut self, velocity: Velocity) {
        self.velocity = velocity;
        if !velocity.is_zero() {
            self.inactive_ms = 0;
        }
    }

    pub fn direction(&self) -> &str {
        &self.direction
    }

    /// Stores the move command text as submitted by the client.
    pub fn set_direction(&mut self, direction: &str) {
        self.direction = direction.to_string();
    }

    pub fn bag(&self) -> &Bag {
        &self.bag
    }

    pub fn set_bag(&mut self, bag: Bag) {
        self.bag = bag;
    }

    /// Puts a gathered item into the bag. Returns false when the bag is
    /// full, in which case the item stays in the world.
    pub fn try_stash(&mut self, item: LootInBag) -> bool {
        self.bag.try_add(item)
    }

    /// Converts the whole bag into score at a deposit base.
    pub fn hand_over_loot(&mut self) {
        self.score += self.bag.value_sum();
        self.bag.clear();
    }

    pub fn score(&self) -> i32 {
        self.score
    }

    pub fn set_score(&mut self, score: i32) {
        self.score = score;
    }

    pub fn add_life_time(&mut self, delta_seconds: f64) {
        self.life_time_seconds += delta_seconds;
    }

    pub fn life_time_seconds(&self) -> f64 {
        self.life_time_seconds
    }

    /// Accumulates idle time and returns the new total.
    pub fn add_inactive_time(&mut self, delta_ms: u64) -> u64 {
        self.inactive_ms += delta_ms;
        self.inactive_ms
    }

    pub fn inactive_ms(&self) -> u64 {
        self.inactive_ms
    }
}
