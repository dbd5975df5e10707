//! Configuration for the WHEP player
//!
//! Built from command line arguments by the binary; every section can also be
//! deserialized from JSON with missing fields falling back to defaults.

mod schema;

pub use schema::{AppConfig, PlaybackConfig, WhepConfig};
