//! Fight replay reconstruction.
//!
//! Turns the sparse, per-event position readings of a combat log into a
//! continuous, queryable record of where every actor was at every moment of a
//! fight: raw events are normalized into samples, merged into per-actor
//! timelines, unified on a global time axis and pre-computed into one frame
//! per timestamp.

pub mod api;
pub mod config;
pub mod dump;
pub mod error;
pub mod index;
pub mod models;
pub mod normalize;
pub mod reconstruct;
pub mod snapshot;
pub mod taunt;
pub mod timeline;

pub use config::{EngineOptions, RevivalPolicy, ServerConfig};
pub use models::FightContext;
pub use error::Error;
pub use reconstruct::{reconstruct, reconstruct_with, Reconstruction};
