//! Observability module
//!
//! Logging, metrics, and structured event infrastructure.

pub mod events;
pub mod logging;
pub mod metrics;

pub use events::{Event, EventEmitter};
pub use logging::init_logging;
pub use metrics::init_metrics;
