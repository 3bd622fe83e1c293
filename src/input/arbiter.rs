//! Turns raw panel samples into single logical presses.

use std::time::{Duration, Instant};

use super::{InputError, InputLines, Polarity, Sample};
use crate::button::{ButtonProfile, LogicalButton};

/// Picks at most one button per poll.
///
/// When several lines read as pressed at once the lowest configured index
/// wins and the rest are dropped for that poll. Bouncing switches make
/// simultaneous reads common, so this is not treated as an error.
pub struct InputArbiter {
    lines: Box<dyn InputLines>,
    profile: ButtonProfile,
    polarity: Polarity,
    press_interval: Duration,
    last_press: Option<Instant>,
}

impl InputArbiter {
    pub fn new(
        lines: Box<dyn InputLines>,
        profile: ButtonProfile,
        polarity: Polarity,
        press_interval: Duration,
    ) -> Self {
        Self {
            lines,
            profile,
            polarity,
            press_interval,
            last_press: None,
        }
    }

    pub fn profile(&self) -> &ButtonProfile {
        &self.profile
    }

    /// Read the panel once. Returns `LogicalButton::None` when nothing is
    /// pressed or the press falls inside the rate limit window.
    pub fn poll(&mut self, now: Instant) -> Result<LogicalButton, InputError> {
        let discrete = self.lines.is_discrete();
        let index = match self.lines.read()? {
            Sample::Index(index) => index,
            Sample::Levels(levels) => self.first_pressed(&levels),
        };

        let Some(index) = index else {
            return Ok(LogicalButton::None);
        };

        if !discrete {
            if let Some(last) = self.last_press {
                if now.saturating_duration_since(last) < self.press_interval {
                    log::trace!("Line {} ignored inside press interval", index);
                    return Ok(LogicalButton::None);
                }
            }
        }

        let button = self.profile.button_at(index);
        if button.is_none() {
            log::debug!("Line {} has no button assigned", index);
            return Ok(LogicalButton::None);
        }
        self.last_press = Some(now);
        Ok(button)
    }

    fn first_pressed(&self, levels: &[bool]) -> Option<usize> {
        let pressed: Vec<usize> = levels
            .iter()
            .enumerate()
            .filter(|(_, level)| self.polarity.is_pressed(**level))
            .map(|(i, _)| i)
            .collect();
        if pressed.len() > 1 {
            log::debug!("Simultaneous lines {:?}, taking {}", pressed, pressed[0]);
        }
        pressed.first().copied()
    }
}
