//! # festreg common library
//!
//! Shared code for the festival registration client:
//! - Error type and result alias
//! - Configuration resolution (CLI → ENV → TOML → defaults)
//! - Session event bus
//! - Clock abstraction and countdown arithmetic
//! - Countdown formatting
//! - Field validation helpers

pub mod config;
pub mod error;
pub mod events;
pub mod human_time;
pub mod time;
pub mod validation;

pub use error::{Error, Result};
pub use time::{Clock, ManualClock, SystemClock};
pub use validation::FieldErrors;
