//! # playout-core
//!
//! Core types, configuration, and error handling shared by the Playout
//! playback pipeline.

pub mod error;
pub mod types;

pub use error::{Error, Result};
pub use types::*;
