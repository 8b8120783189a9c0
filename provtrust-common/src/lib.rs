//! # provtrust Common Library
//!
//! Shared code for the provtrust workspace including:
//! - Error types (`Error`, `Result`)
//! - Configuration loading (TOML file + environment resolution)
//! - Pipeline event types and the broadcast `EventBus`
//! - Text normalization and fuzzy similarity helpers

pub mod config;
pub mod error;
pub mod events;
pub mod text;

pub use error::{Error, Result};
