//! Process bootstrap for action servers: layered config, logging and shutdown signals.

pub mod config;
pub mod logging;
pub mod signals;

pub use config::*;
pub use logging::*;
pub use signals::*;
