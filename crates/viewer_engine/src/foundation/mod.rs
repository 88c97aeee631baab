//! Foundation module - core utilities shared by the renderer
//!
//! - Math types and projection helpers
//! - Animation clock
//! - Logging setup

pub mod logging;
pub mod math;
pub mod time;
