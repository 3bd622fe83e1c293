//! CLI argument parsing with clap.

use clap::{ArgAction, Parser, Subcommand};
use std::path::PathBuf;

use crate::button::ProfileKind;

/// Stop-motion animation kiosk driven by a panel of push buttons
#[derive(Parser, Debug)]
#[command(name = "stopmo-kiosk")]
#[command(version, about = "Button-driven stop-motion animation kiosk", long_about = None)]
pub struct Args {
    #[command(subcommand)]
    pub command: Option<Command>,

    /// Config file path
    #[arg(long, short)]
    pub config: Option<PathBuf>,

    /// Read buttons from the number keys instead of GPIO
    #[arg(long, short)]
    pub keyboard: bool,

    /// Button panel layout (overrides the config file)
    #[arg(long)]
    pub profile: Option<ProfileKind>,

    /// Append logs to this file instead of stderr
    #[arg(long)]
    pub log_file: Option<PathBuf>,

    /// More log output (-v debug, -vv trace)
    #[arg(short, long, action = ArgAction::Count)]
    pub verbose: u8,
}

#[derive(Subcommand, Debug)]
pub enum Command {
    /// Configuration management
    Config {
        #[command(subcommand)]
        action: ConfigAction,
    },
}

#[derive(Subcommand, Debug, Clone)]
pub enum ConfigAction {
    /// Show the effective configuration
    Show,
    /// Create default config file
    Init,
}

impl Args {
    /// Log filter implied by the verbosity count.
    pub fn log_level(&self) -> &'static str {
        match self.verbose {
            0 => "info",
            1 => "debug",
            _ => "trace",
        }
    }
}
