//! stopmo-kiosk library crate.
//!
//! This module exposes the internal components for integration testing.

#[cfg(not(unix))]
compile_error!("stopmo-kiosk needs a Unix platform for process signals and shared memory");

pub mod archive;
pub mod button;
pub mod capture;
pub mod cli;
pub mod clock;
pub mod command;
pub mod config;
pub mod frames;
pub mod input;
pub mod power;
pub mod process;
pub mod session;
