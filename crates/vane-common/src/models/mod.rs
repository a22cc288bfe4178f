//! Core domain models shared across all Vane services.
//!
//! These are the "truth" types — what the store persists and the API
//! serializes. Each model uses UUID v7 IDs (see [`crate::ids`]) for
//! globally unique, time-sortable identifiers.

pub mod channel;
pub mod message;
pub mod server;
pub mod user;

pub use channel::*;
pub use message::*;
pub use server::*;
pub use user::*;
