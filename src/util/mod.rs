//! Utility functions.

pub mod env;
pub mod format;
pub mod time;

pub use env::should_use_color;
pub use format::{format_bytes, format_energy, format_percent, format_power};
pub use time::{format_countdown, format_relative_time};
