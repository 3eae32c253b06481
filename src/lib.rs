//! Cybermods - a command-line mod installer for Cyberpunk 2077
//!
//! This crate provides:
//! - ZIP/RAR archive installation with automatic layout detection
//! - A ledger of the files each archive installed, for clean uninstalls
//! - Nexus Mods integration for tracked mods, downloads and update checks

pub mod app;
pub mod config;
pub mod downloads;
pub mod mods;
pub mod nexus;
pub mod queue;

#[cfg(test)]
mod test_utils;

pub use app::App;
pub use config::Config;
