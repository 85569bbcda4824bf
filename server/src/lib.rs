//! # Game Server Library
//!
//! This library implements the authoritative server for the multiplayer
//! lost-and-found game. Players join a map, steer their dog along the road
//! network, gather the objects scattered on the roads, and bring them to a
//! deposit base for score; dogs left idle for too long retire onto a
//! persisted leaderboard.
//!
//! ## Core Responsibilities
//!
//! ### Authoritative Simulation
//! The server runs the definitive version of the world. A periodic (or
//! client-driven) tick advances every session: road-constrained movement
//! with segment handover, swept-path collision against items and bases,
//! loot generation, and retirement of idle players.
//!
//! ### Session & Player Management
//! One session exists per map. The player registry associates bearer
//! tokens with players and their dogs, and evicts players whose dogs have
//! been motionless beyond the configured retirement time, forwarding their
//! results to the records store.
//!
//! ### JSON HTTP API
//! Clients interact exclusively through `/api/v1/...`: map listings, join,
//! session state, movement commands, an optional manual tick, and the
//! leaderboard. Validation is strict and errors follow a fixed
//! code-plus-message taxonomy.
//!
//! ## Architecture Design
//!
//! ### Single-Writer World
//! The entire mutable world lives behind one async mutex. API handlers,
//! the tick task, and the snapshot listener each take the lock and run to
//! completion, which makes every tick atomic with respect to the API and
//! removes any need for finer-grained locking.
//!
//! ### Crash-Safe Persistence
//! An optional listener snapshots the world to disk at a configured
//! period (write-temp-then-rename); on startup the snapshot is restored
//! if present, and a corrupt file aborts startup rather than silently
//! starting from a broken world.
//!
//! ## Module Organization
//!
//! - [`model`]: maps, roads, dogs, and sessions: the simulation itself.
//! - [`app`]: the application facade and the player/token registry.
//! - [`api`]: HTTP endpoint dispatch, validation, and JSON shaping.
//! - [`config`]: the JSON config file format.
//! - [`snapshot`]: versioned world snapshots.
//! - [`records`]: the retired-player leaderboard store.

pub mod api;
pub mod app;
pub mod config;
pub mod model;
pub mod records;
pub mod snapshot;
