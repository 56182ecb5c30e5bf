//! CLI module for Lexi
//!
//! Handles command-line argument parsing and configuration management.

pub mod args;
pub mod config;

pub use args::{Args, CacheCommand, Commands, Verbosity};
pub use config::Config;
