//! Core types and utilities for noise-robustness evaluation.
//!
//! This crate provides the foundational types, configuration, metrics and
//! error handling shared by the data, evaluation and tool crates.

pub mod backend;
pub mod cli;
pub mod config;
pub mod error;
pub mod metrics;
pub mod types;

pub use backend::*;
pub use cli::*;
pub use config::*;
pub use error::{Error, Result};
pub use metrics::*;
pub use types::*;

/// Re-export commonly used types
pub mod prelude {
    pub use crate::backend::*;
    pub use crate::config::*;
    pub use crate::error::{Error, Result};
    pub use crate::metrics::*;
    pub use crate::types::*;
    pub use burn::prelude::*;
}
