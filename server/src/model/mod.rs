//! World model: maps with their road networks, dogs with their bags, and
//! the per-map game sessions that tie them together.

pub mod dog;
pub mod map;
pub mod session;

pub use dog::{Bag, Dog, LootInBag, LostObject};
pub use map::{
    Building, Coords, Game, Map, ModelError, Office, Offset, Point, Rectangle, Road, Size,
    Velocity,
};
pub use session::GameSession;

/// Dog identifier, unique within a session.
pub type DogId = u32;
/// Lost-object identifier, unique within a session.
pub type LostObjectId = u32;
/// Session identifier; sessions are created one per map, in map order.
pub type SessionId = u32;
/// Player identifier, unique within the application.
pub type PlayerId = u32;
