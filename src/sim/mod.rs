//! Deterministic simulation module
//!
//! Everything that moves lives here. This module must be pure and deterministic:
//! - Fixed timestep only
//! - Seeded RNG only
//! - Stable iteration order (bodies in request order)
//! - No rendering or platform dependencies

pub mod collision;
pub mod settle;
pub mod state;
pub mod throw;
pub mod tick;

pub use collision::{Contact, Manifold, find_contacts};
pub use settle::SettleEvent;
pub use state::{
    Boundary, BoundaryKind, CollisionWorld, DieInstance, DieState, Material, Pose, arena_boundaries,
};
pub use throw::{resting_pose, spawn_animated, spawn_instant};
pub use tick::tick;
