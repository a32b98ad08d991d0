//! Output rendering for human and robot modes.

pub mod error;
pub mod human;
pub mod robot;

pub use error::render_error;
