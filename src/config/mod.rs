//! Configuration module
//!
//! Loading and validation of the bot's YAML configuration: identity, penalty
//! settings, reply templates, and the guilds served by the in-memory
//! platform.

pub mod loader;
pub mod schema;
pub mod validation;

pub use loader::{ConfigLoader, LoadResult, LoadWarning, LoaderOptions};
pub use schema::*;
pub use validation::{ValidationResult, Validator};
