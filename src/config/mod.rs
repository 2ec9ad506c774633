//! Configuration management
//!
//! Node address and wallet-file settings, seeded from environment
//! variables with sensible defaults.

pub mod settings;

pub use settings::{Config, GLOBAL_CONFIG};
