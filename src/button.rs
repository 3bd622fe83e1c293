//! Logical buttons, session modes, and deployment pin profiles.
//!
//! A physical input line is only ever known by its index in the active
//! profile. The profile decides which [`LogicalButton`] that index means.

use serde::{Deserialize, Serialize};
use std::fmt;

/// An abstract input event, decoupled from the pin that produced it.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum LogicalButton {
    Play,
    Record,
    Restart,
    Shutdown,
    Erase,
    Back,
    Forward,
    SwitchMode,
    Save,
    ViewPrevious,
    ViewNext,
    PlaySaved,
    /// No press this cycle, or a line that is wired but unassigned.
    None,
}

impl LogicalButton {
    pub fn is_none(self) -> bool {
        self == LogicalButton::None
    }

    /// Resolve a dual-function button for the given mode.
    ///
    /// On dual-function panels the creation buttons double as the archive
    /// controls while viewing.
    pub fn in_mode(self, mode: SessionMode) -> LogicalButton {
        match (mode, self) {
            (SessionMode::Viewing, LogicalButton::Back) => LogicalButton::ViewPrevious,
            (SessionMode::Viewing, LogicalButton::Forward) => LogicalButton::ViewNext,
            (SessionMode::Viewing, LogicalButton::Play) => LogicalButton::PlaySaved,
            (SessionMode::Viewing, LogicalButton::Record) => LogicalButton::Save,
            (_, other) => other,
        }
    }

    pub fn name(self) -> &'static str {
        match self {
            LogicalButton::Play => "Play",
            LogicalButton::Record => "Record",
            LogicalButton::Restart => "Restart",
            LogicalButton::Shutdown => "Shutdown",
            LogicalButton::Erase => "Erase",
            LogicalButton::Back => "Back",
            LogicalButton::Forward => "Forward",
            LogicalButton::SwitchMode => "Mode",
            LogicalButton::Save => "Save",
            LogicalButton::ViewPrevious => "View Previous",
            LogicalButton::ViewNext => "View Next",
            LogicalButton::PlaySaved => "Play Saved",
            LogicalButton::None => "None",
        }
    }
}

impl fmt::Display for LogicalButton {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// Which subset of buttons is meaningful.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum SessionMode {
    #[default]
    Creating,
    Viewing,
}

impl SessionMode {
    pub fn toggled(self) -> SessionMode {
        match self {
            SessionMode::Creating => SessionMode::Viewing,
            SessionMode::Viewing => SessionMode::Creating,
        }
    }
}

impl fmt::Display for SessionMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SessionMode::Creating => f.write_str("Create"),
            SessionMode::Viewing => f.write_str("View"),
        }
    }
}

/// One wired input line: the pin number it is read from and what it means.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct LineAssignment {
    pub pin: u32,
    pub button: LogicalButton,
}

/// Built-in pin maps, one per panel revision.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize, clap::ValueEnum)]
#[serde(rename_all = "kebab-case")]
pub enum ProfileKind {
    /// Four buttons: play, record, restart, shutdown.
    Basic,
    /// One button per logical action, both modes wired separately.
    Separate,
    /// Eight dual-function buttons plus a mode switch.
    #[default]
    Dual,
    /// Lines listed explicitly in the config file.
    Custom,
}

/// The fixed line-index to button mapping selected for a deployment.
///
/// Line order matters: it is the arbiter's tie-break order.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ButtonProfile {
    lines: Vec<LineAssignment>,
    dual_function: bool,
}

const fn line(pin: u32, button: LogicalButton) -> LineAssignment {
    LineAssignment { pin, button }
}

impl ButtonProfile {
    pub fn new(lines: Vec<LineAssignment>, dual_function: bool) -> Self {
        Self {
            lines,
            dual_function,
        }
    }

    /// Build one of the built-in profiles. `Custom` yields an empty map that
    /// the caller fills from configuration.
    pub fn builtin(kind: ProfileKind) -> Self {
        use LogicalButton as B;
        match kind {
            ProfileKind::Basic => Self::new(
                vec![
                    line(24, B::Play),
                    line(25, B::Record),
                    line(12, B::Restart),
                    line(16, B::Shutdown),
                ],
                false,
            ),
            ProfileKind::Separate => Self::new(
                vec![
                    line(18, B::Back),
                    line(23, B::Forward),
                    line(24, B::Play),
                    line(25, B::Record),
                    line(8, B::Erase),
                    line(21, B::Restart),
                    line(7, B::Shutdown),
                    line(20, B::SwitchMode),
                    line(10, B::Save),
                    line(22, B::ViewPrevious),
                    line(9, B::PlaySaved),
                    line(17, B::ViewNext),
                ],
                false,
            ),
            ProfileKind::Dual => Self::new(
                vec![
                    line(18, B::Back),
                    line(23, B::Forward),
                    line(24, B::Play),
                    line(25, B::Record),
                    line(12, B::Erase),
                    line(21, B::Restart),
                    line(16, B::Shutdown),
                    line(20, B::SwitchMode),
                ],
                true,
            ),
            ProfileKind::Custom => Self::new(Vec::new(), false),
        }
    }

    pub fn len(&self) -> usize {
        self.lines.len()
    }

    pub fn is_empty(&self) -> bool {
        self.lines.is_empty()
    }

    pub fn pins(&self) -> Vec<u32> {
        self.lines.iter().map(|l| l.pin).collect()
    }

    pub fn is_dual_function(&self) -> bool {
        self.dual_function
    }

    /// Button wired to line `index`, or `None` for an unknown index.
    pub fn button_at(&self, index: usize) -> LogicalButton {
        self.lines
            .get(index)
            .map(|l| l.button)
            .unwrap_or(LogicalButton::None)
    }

    /// Resolve a raw press for the current mode.
    pub fn resolve(&self, button: LogicalButton, mode: SessionMode) -> LogicalButton {
        if self.dual_function {
            button.in_mode(mode)
        } else {
            button
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_dual_function_resolution_in_viewing() {
        let profile = ButtonProfile::builtin(ProfileKind::Dual);
        assert_eq!(
            profile.resolve(LogicalButton::Record, SessionMode::Viewing),
            LogicalButton::Save
        );
        assert_eq!(
            profile.resolve(LogicalButton::Back, SessionMode::Viewing),
            LogicalButton::ViewPrevious
        );
        assert_eq!(
            profile.resolve(LogicalButton::Play, SessionMode::Viewing),
            LogicalButton::PlaySaved
        );
        assert_eq!(
            profile.resolve(LogicalButton::Erase, SessionMode::Viewing),
            LogicalButton::Erase
        );
    }

    #[test]
    fn test_dual_function_passthrough_in_creating() {
        let profile = ButtonProfile::builtin(ProfileKind::Dual);
        assert_eq!(
            profile.resolve(LogicalButton::Record, SessionMode::Creating),
            LogicalButton::Record
        );
    }

    #[test]
    fn test_separate_profile_never_translates() {
        let profile = ButtonProfile::builtin(ProfileKind::Separate);
        assert!(!profile.is_dual_function());
        assert_eq!(
            profile.resolve(LogicalButton::Record, SessionMode::Viewing),
            LogicalButton::Record
        );
    }

    #[test]
    fn test_button_at_out_of_range_is_none() {
        let profile = ButtonProfile::builtin(ProfileKind::Basic);
        assert_eq!(profile.button_at(0), LogicalButton::Play);
        assert_eq!(profile.button_at(3), LogicalButton::Shutdown);
        assert!(profile.button_at(4).is_none());
    }

    #[test]
    fn test_mode_toggle() {
        assert_eq!(SessionMode::Creating.toggled(), SessionMode::Viewing);
        assert_eq!(SessionMode::Viewing.toggled(), SessionMode::Creating);
    }

    #[test]
    fn test_button_names_match_panel_labels() {
        assert_eq!(LogicalButton::SwitchMode.to_string(), "Mode");
        assert_eq!(LogicalButton::Back.to_string(), "Back");
    }
}
