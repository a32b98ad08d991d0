//! Common helpers for integration tests.
//!
//! # Modules
//!
//! - `logger`: phase-tracking test logger
//! - `fixtures`: seeded stores and a mock telemetry server

pub mod fixtures;
pub mod logger;
