//! frametime CLI library.
//!
//! This crate provides the command-line interface for frametime.

mod cli;
pub mod commands;
mod config;

pub use cli::Cli;
pub use config::Config;
