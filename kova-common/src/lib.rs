//! # Kova Common Library
//!
//! Shared code for Kova batch tooling:
//! - Error types (`Error`, `Result`)
//! - Event types (`KovaEvent`) and the in-process `EventBus`
//! - Configuration file loading and path resolution

pub mod config;
pub mod error;
pub mod events;

pub use error::{Error, Result};
