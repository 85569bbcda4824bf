//! # Shared Game Kernel
//!
//! This crate contains the pure, I/O-free game logic that the server builds
//! on: 2D geometry primitives, the swept-path collision detector, and the
//! loot generator. Keeping these pieces free of networking and world-state
//! concerns makes them deterministic and easy to test in isolation.
//!
//! ## Core Components
//!
//! ### Geometry (`geom`)
//! Floating-point points, vectors, and axis-aligned rectangles together
//! with the segment-projection math the collision detector is built on.
//!
//! ### Collision Detection (`collision`)
//! Swept-disc collision between moving gatherers and stationary targets.
//! Produces a time-ordered event list so that the simulation can apply
//! pickups and deposits in the order they physically happen within a tick.
//!
//! ### Loot Generation (`loot`)
//! A two-state stochastic generator that tops the world up with loot while
//! never exceeding one item per active player.
//!
//! ## Design Philosophy
//!
//! ### Deterministic Simulation
//! Nothing in this crate reads clocks or global random state. Callers pass
//! elapsed time and random values in, which makes replays reproducible and
//! lets tests pin exact outcomes.
//!
//! ### Provider Abstraction
//! The collision detector pulls its inputs through the
//! [`collision::ItemGathererProvider`] trait rather than concrete world
//! types, so the production per-session view and test doubles share one
//! code path.

pub mod collision;
pub mod geom;
pub mod loot;

pub use collision::{
    find_gather_events, Base, CollectResult, CollisionEvent, Gatherer, Item,
    ItemGathererProvider,
};
pub use geom::{Point2D, Rect, Vec2D};
pub use loot::LootGenerator;
