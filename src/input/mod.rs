//! Reading the button panel.
//!
//! A backend ([`InputLines`]) reports raw samples; the [`InputArbiter`] turns
//! them into at most one [`LogicalButton`](crate::button::LogicalButton) per
//! poll.

pub mod arbiter;
pub mod gpio;
pub mod keyboard;

pub use arbiter::InputArbiter;
pub use gpio::SysfsGpio;
pub use keyboard::KeyboardInput;

use serde::{Deserialize, Serialize};

/// One reading of the panel.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Sample {
    /// Raw electrical level of every configured line, in profile order.
    Levels(Vec<bool>),
    /// A line index chosen directly, bypassing electrical reads.
    Index(Option<usize>),
}

/// A source of button samples.
pub trait InputLines: Send {
    fn read(&mut self) -> Result<Sample, InputError>;

    /// Whether every sample is already a distinct press.
    fn is_discrete(&self) -> bool {
        false
    }
}

/// Which electrical level means "pressed".
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum Polarity {
    #[default]
    ActiveHigh,
    ActiveLow,
}

impl Polarity {
    pub fn is_pressed(self, level: bool) -> bool {
        match self {
            Polarity::ActiveHigh => level,
            Polarity::ActiveLow => !level,
        }
    }
}

/// Which backend reads the buttons.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum InputBackend {
    #[default]
    Gpio,
    Keyboard,
}

#[derive(Debug, thiserror::Error)]
pub enum InputError {
    #[error("input subsystem unavailable: {0}")]
    Unavailable(String),

    #[error("no input lines configured")]
    NoLines,

    #[error("failed to set up GPIO pin {pin}: {source}")]
    Setup {
        pin: u32,
        #[source]
        source: std::io::Error,
    },

    #[error("failed to read GPIO pin {pin}: {source}")]
    Read {
        pin: u32,
        #[source]
        source: std::io::Error,
    },

    #[error("keyboard listener stopped")]
    Disconnected,
}
