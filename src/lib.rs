//! scheduler - Workforce event auto-scheduling engine
//!
//! This crate is a thin CLI wrapper around `scheduler-core`: it loads configuration, seeds an
//! in-memory repository from a JSON file, and invokes the engine.

pub mod config;

pub use config::Config;
pub use scheduler_core::*;
