//! # SeatWatch Common Library
//!
//! Shared code for the SeatWatch services:
//! - Database schema, models and settings access
//! - Configuration file resolution and bootstrap TOML loading
//! - Error types
//! - Time helpers

pub mod config;
pub mod db;
pub mod error;
pub mod time;

pub use error::{Error, Result};
