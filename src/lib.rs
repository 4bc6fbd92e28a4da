//! Short-video reward feed: per-slot playback controllers driven by a feed
//! coordinator, with rewards persisted to a hosted backend.

pub mod backends;
pub mod config;
pub mod events;
pub mod feed;
pub mod models;
pub mod player;
pub mod services;
pub mod utils;
