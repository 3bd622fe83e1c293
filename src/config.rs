//! Configuration file handling for stopmo-kiosk.
//!
//! Loads configuration from `~/.config/stopmo-kiosk/config.toml` or a custom path.
//! Every field has a default matching the dual-function panel wiring, so the
//! kiosk runs with no file at all.

use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;

use crate::button::{ButtonProfile, LineAssignment, ProfileKind};
use crate::capture::CropGeometry;
use crate::command::CommandTemplate;
use crate::input::{InputBackend, Polarity};
use crate::process::{KindPolicy, TerminationStrategy};
use crate::session::{Launchers, SessionSettings};

/// Configuration file structure for stopmo-kiosk.
/// Loaded from ~/.config/stopmo-kiosk/config.toml (or custom path via --config).
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    pub paths: PathsConfig,
    pub input: InputConfig,
    pub session: SessionConfig,
    pub camera: CameraConfig,
    pub viewer: ViewerConfig,
    pub shutdown: ShutdownConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct PathsConfig {
    /// Working directory holding the frame and archive directories.
    pub root: PathBuf,
    pub frames: String,
    pub saved: String,
    pub extension: String,
}

impl Default for PathsConfig {
    fn default() -> Self {
        Self {
            root: dirs::data_local_dir()
                .map(|d| d.join("stopmo-kiosk"))
                .unwrap_or_else(|| PathBuf::from(".")),
            frames: "Frames".to_string(),
            saved: "Saved".to_string(),
            extension: "jpg".to_string(),
        }
    }
}

impl PathsConfig {
    pub fn frames_dir(&self) -> PathBuf {
        self.root.join(&self.frames)
    }

    pub fn saved_dir(&self) -> PathBuf {
        self.root.join(&self.saved)
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct InputConfig {
    pub backend: InputBackend,
    pub polarity: Polarity,
    pub profile: ProfileKind,
    /// Minimum time between two honored presses.
    pub press_interval_ms: u64,
    /// Sleep between polls of the panel.
    pub poll_interval_ms: u64,
    pub sysfs_root: PathBuf,
    /// Added to each pin number to find its sysfs line.
    pub pin_offset: u32,
    /// Only for `profile = "custom"`: Back/Forward/Play/Record double as
    /// archive controls in View mode.
    pub dual_function: bool,
    /// Only for `profile = "custom"`. Order is the tie-break order.
    pub lines: Vec<LineAssignment>,
}

impl Default for InputConfig {
    fn default() -> Self {
        Self {
            backend: InputBackend::Gpio,
            polarity: Polarity::ActiveHigh,
            profile: ProfileKind::Dual,
            press_interval_ms: 1000,
            poll_interval_ms: 20,
            sysfs_root: PathBuf::from(crate::input::gpio::DEFAULT_SYSFS_ROOT),
            pin_offset: 0,
            dual_function: false,
            lines: Vec::new(),
        }
    }
}

impl InputConfig {
    pub fn button_profile(&self) -> Result<ButtonProfile, ConfigError> {
        match self.profile {
            ProfileKind::Custom => {
                if self.lines.is_empty() {
                    return Err(ConfigError::Invalid {
                        field: "input.lines",
                        reason: "a custom profile needs at least one line".to_string(),
                    });
                }
                Ok(ButtonProfile::new(self.lines.clone(), self.dual_function))
            }
            kind => {
                if !self.lines.is_empty() {
                    log::warn!("input.lines is ignored unless profile = \"custom\"");
                }
                Ok(ButtonProfile::builtin(kind))
            }
        }
    }

    pub fn press_interval(&self) -> Duration {
        Duration::from_millis(self.press_interval_ms)
    }

    pub fn poll_interval(&self) -> Duration {
        Duration::from_millis(self.poll_interval_ms)
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct SessionConfig {
    /// Idle time after which View mode falls back to Create mode.
    pub mode_timeout_secs: u64,
    pub max_saved: usize,
    pub min_save_interval_secs: u64,
    /// Allow saves back to back, for bench testing.
    pub bypass_save_cooldown: bool,
    /// Keep the frames of the previous run instead of starting empty.
    pub keep_frames_on_start: bool,
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self {
            mode_timeout_secs: 120,
            max_saved: 25,
            min_save_interval_secs: 30,
            bypass_save_cooldown: false,
            keep_frames_on_start: false,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct CameraConfig {
    pub width: u32,
    pub height: u32,
    pub crop_x: u32,
    pub crop_y: u32,
    pub preview_command: CommandTemplate,
    pub grab_command: CommandTemplate,
    /// Empty uses the screenshot uncropped.
    pub crop_command: CommandTemplate,
    /// Camera tool killed by name at shutdown.
    pub process_name: String,
    pub strategy: TerminationStrategy,
    /// Wait for a restarted preview to appear before grabbing.
    pub settle_ms: u64,
}

impl Default for CameraConfig {
    fn default() -> Self {
        Self {
            width: 1920,
            height: 1080,
            crop_x: 0,
            crop_y: 30,
            preview_command: CommandTemplate::new([
                "libcamera-vid",
                "-t",
                "0",
                "--width",
                "{width}",
                "--height",
                "{height}",
            ]),
            grab_command: CommandTemplate::new(["scrot", "{output}"]),
            crop_command: CommandTemplate::new([
                "convert",
                "{input}",
                "-crop",
                "{width}x{height}+{x}+{y}",
                "{output}",
            ]),
            process_name: "libcamera-vid".to_string(),
            strategy: TerminationStrategy::KillDirectChildId,
            settle_ms: 1500,
        }
    }
}

impl CameraConfig {
    pub fn geometry(&self) -> CropGeometry {
        CropGeometry {
            width: self.width,
            height: self.height,
            x: self.crop_x,
            y: self.crop_y,
        }
    }

    pub fn policy(&self) -> KindPolicy {
        KindPolicy {
            strategy: self.strategy,
            process_name: self.process_name.clone(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ViewerConfig {
    pub still_command: CommandTemplate,
    pub slideshow_command: CommandTemplate,
    /// Seconds between slides.
    pub slide_delay: f64,
    pub process_name: String,
    pub strategy: TerminationStrategy,
}

impl Default for ViewerConfig {
    fn default() -> Self {
        Self {
            still_command: CommandTemplate::new([
                "feh",
                "--quiet",
                "--hide-pointer",
                "-Z",
                "{path}",
            ]),
            slideshow_command: CommandTemplate::new([
                "feh",
                "--quiet",
                "--hide-pointer",
                "-Z",
                "-p",
                "--on-last-slide=quit",
                "--slideshow-delay",
                "{delay}",
                "{path}",
            ]),
            slide_delay: 0.001,
            process_name: "feh".to_string(),
            // feh is sometimes reached through a wrapper, so its direct
            // child pid is not enough.
            strategy: TerminationStrategy::KillByCommandNameScan,
        }
    }
}

impl ViewerConfig {
    pub fn policy(&self) -> KindPolicy {
        KindPolicy {
            strategy: self.strategy,
            process_name: self.process_name.clone(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ShutdownConfig {
    /// Run the power-off command. When false, Shutdown only exits.
    pub enabled: bool,
    pub grace_secs: u64,
    pub command: CommandTemplate,
}

impl Default for ShutdownConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            grace_secs: 6,
            command: CommandTemplate::new(["sudo", "poweroff"]),
        }
    }
}

impl Config {
    /// Load configuration from a file path.
    /// Returns default config if the file doesn't exist.
    /// Returns an error if the file exists but cannot be parsed or fails validation.
    pub fn load(path: Option<&Path>) -> Result<Self, ConfigError> {
        let path = path.map(PathBuf::from).unwrap_or_else(default_path);

        let config = if path.exists() {
            let content = std::fs::read_to_string(&path).map_err(|e| ConfigError::IoError {
                path: path.clone(),
                source: e,
            })?;
            Self::parse(&content).map_err(|e| match e {
                ConfigError::ParseError { source, .. } => ConfigError::ParseError {
                    path: path.clone(),
                    source,
                },
                other => other,
            })?
        } else {
            log::debug!("No config file at {}, using defaults", path.display());
            Config::default()
        };
        Ok(config)
    }

    /// Parse and validate TOML text.
    pub fn parse(content: &str) -> Result<Self, ConfigError> {
        let config: Config = toml::from_str(content).map_err(|e| ConfigError::ParseError {
            path: PathBuf::new(),
            source: e,
        })?;
        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.session.max_saved == 0 || self.session.max_saved > 100 {
            return Err(ConfigError::Invalid {
                field: "session.max_saved",
                reason: format!("must be between 1 and 100, got {}", self.session.max_saved),
            });
        }
        if self.camera.width == 0 || self.camera.height == 0 {
            return Err(ConfigError::Invalid {
                field: "camera.width",
                reason: "width and height must be non-zero".to_string(),
            });
        }
        if self.paths.extension.is_empty() || self.paths.extension.contains('.') {
            return Err(ConfigError::Invalid {
                field: "paths.extension",
                reason: format!("'{}' is not a bare file extension", self.paths.extension),
            });
        }
        if self.paths.frames == self.paths.saved {
            return Err(ConfigError::Invalid {
                field: "paths.saved",
                reason: "frames and saved directories must differ".to_string(),
            });
        }
        self.input.button_profile()?;
        Ok(())
    }

    /// Render the effective configuration as TOML.
    pub fn to_toml(&self) -> Result<String, ConfigError> {
        toml::to_string_pretty(self).map_err(ConfigError::SerializeError)
    }

    pub fn launchers(&self) -> Launchers {
        Launchers {
            preview: self.camera.preview_command.clone(),
            still: self.viewer.still_command.clone(),
            slideshow: self.viewer.slideshow_command.clone(),
            width: self.camera.width,
            height: self.camera.height,
            slideshow_delay: self.viewer.slide_delay,
        }
    }

    pub fn session_settings(&self) -> SessionSettings {
        SessionSettings {
            mode_timeout: Duration::from_secs(self.session.mode_timeout_secs),
            camera_settle: Duration::from_millis(self.camera.settle_ms),
            camera_process_name: self.camera.process_name.clone(),
            shutdown_grace: Duration::from_secs(self.shutdown.grace_secs),
        }
    }
}

/// Errors that can occur when loading configuration.
#[derive(Debug)]
pub enum ConfigError {
    IoError {
        path: PathBuf,
        source: std::io::Error,
    },
    ParseError {
        path: PathBuf,
        source: toml::de::Error,
    },
    SerializeError(toml::ser::Error),
    Invalid {
        field: &'static str,
        reason: String,
    },
    AlreadyExists(PathBuf),
}

impl std::fmt::Display for ConfigError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ConfigError::IoError { path, source } => {
                write!(f, "Failed to read config file '{}': {}", path.display(), source)
            }
            ConfigError::ParseError { path, source } => {
                write!(f, "Failed to parse config file '{}': {}", path.display(), source)
            }
            ConfigError::SerializeError(source) => {
                write!(f, "Failed to render configuration: {}", source)
            }
            ConfigError::Invalid { field, reason } => {
                write!(f, "Invalid value for {}: {}", field, reason)
            }
            ConfigError::AlreadyExists(path) => {
                write!(f, "Config file already exists: {}", path.display())
            }
        }
    }
}

impl std::error::Error for ConfigError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            ConfigError::IoError { source, .. } => Some(source),
            ConfigError::ParseError { source, .. } => Some(source),
            ConfigError::SerializeError(source) => Some(source),
            ConfigError::Invalid { .. } | ConfigError::AlreadyExists(_) => None,
        }
    }
}

/// Get the default config file path.
pub fn default_path() -> PathBuf {
    dirs::config_dir()
        .map(|d| d.join("stopmo-kiosk").join("config.toml"))
        .unwrap_or_else(|| {
            let home = std::env::var("HOME").unwrap_or_else(|_| ".".to_string());
            PathBuf::from(home).join(".config/stopmo-kiosk/config.toml")
        })
}

/// Commented starter file written by `config init`.
pub const DEFAULT_CONFIG: &str = r#"# stopmo-kiosk configuration

[paths]
# Directory holding the Frames and Saved folders
# root = "/home/rpi/projects/Animation"
frames = "Frames"
saved = "Saved"
extension = "jpg"

[input]
# gpio or keyboard (number keys 1-9, 0 select buttons by position)
backend = "gpio"
# active-high or active-low: which level means pressed
polarity = "active-high"
# basic, separate, dual or custom
profile = "dual"
press_interval_ms = 1000
poll_interval_ms = 20
sysfs_root = "/sys/class/gpio"
# Newer kernels number the header pins from 512
pin_offset = 0

# For profile = "custom", list lines in tie-break order:
# [[input.lines]]
# pin = 24
# button = "play"

[session]
# Seconds of inactivity before View mode returns to Create mode
mode_timeout_secs = 120
max_saved = 25
min_save_interval_secs = 30
bypass_save_cooldown = false
keep_frames_on_start = false

[camera]
width = 1920
height = 1080
# Offset of the preview picture on screen (skips the window title bar)
crop_x = 0
crop_y = 30
preview_command = ["libcamera-vid", "-t", "0", "--width", "{width}", "--height", "{height}"]
grab_command = ["scrot", "{output}"]
crop_command = ["convert", "{input}", "-crop", "{width}x{height}+{x}+{y}", "{output}"]
process_name = "libcamera-vid"
strategy = "kill-direct-child-id"
settle_ms = 1500

[viewer]
still_command = ["feh", "--quiet", "--hide-pointer", "-Z", "{path}"]
slideshow_command = ["feh", "--quiet", "--hide-pointer", "-Z", "-p", "--on-last-slide=quit", "--slideshow-delay", "{delay}", "{path}"]
slide_delay = 0.001
process_name = "feh"
strategy = "kill-by-command-name-scan"

[shutdown]
enabled = true
# Seconds to let stopped processes exit before powering off
grace_secs = 6
command = ["sudo", "poweroff"]
"#;

/// Write [`DEFAULT_CONFIG`] to `path`, refusing to overwrite.
pub fn write_default(path: &Path) -> Result<(), ConfigError> {
    if path.exists() {
        return Err(ConfigError::AlreadyExists(path.to_path_buf()));
    }
    if let Some(parent) = path.parent() {
        std::fs::create_dir_all(parent).map_err(|e| ConfigError::IoError {
            path: parent.to_path_buf(),
            source: e,
        })?;
    }
    std::fs::write(path, DEFAULT_CONFIG).map_err(|e| ConfigError::IoError {
        path: path.to_path_buf(),
        source: e,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::button::LogicalButton;
    use tempfile::TempDir;

    #[test]
    fn test_missing_file_gives_defaults() {
        let dir = TempDir::new().unwrap();
        let config = Config::load(Some(&dir.path().join("none.toml"))).unwrap();
        assert_eq!(config.session.max_saved, 25);
        assert_eq!(config.session.mode_timeout_secs, 120);
        assert_eq!(config.input.profile, ProfileKind::Dual);
        assert!(!config.session.bypass_save_cooldown);
    }

    #[test]
    fn test_default_file_parses_to_defaults() {
        let config = Config::parse(DEFAULT_CONFIG).unwrap();
        let defaults = Config::default();
        assert_eq!(config.camera.preview_command, defaults.camera.preview_command);
        assert_eq!(config.viewer.slideshow_command, defaults.viewer.slideshow_command);
        assert_eq!(config.viewer.strategy, TerminationStrategy::KillByCommandNameScan);
        assert_eq!(config.input.polarity, Polarity::ActiveHigh);
        assert_eq!(config.shutdown.grace_secs, 6);
    }

    #[test]
    fn test_partial_file_keeps_other_defaults() {
        let config = Config::parse(
            r#"
[input]
polarity = "active-low"
backend = "keyboard"

[session]
max_saved = 3
"#,
        )
        .unwrap();
        assert_eq!(config.input.polarity, Polarity::ActiveLow);
        assert_eq!(config.input.backend, InputBackend::Keyboard);
        assert_eq!(config.session.max_saved, 3);
        assert_eq!(config.session.min_save_interval_secs, 30);
        assert_eq!(config.camera.width, 1920);
    }

    #[test]
    fn test_custom_profile_lines() {
        let config = Config::parse(
            r#"
[input]
profile = "custom"
dual_function = true

[[input.lines]]
pin = 5
button = "record"

[[input.lines]]
pin = 6
button = "switch-mode"
"#,
        )
        .unwrap();
        let profile = config.input.button_profile().unwrap();
        assert_eq!(profile.pins(), vec![5, 6]);
        assert_eq!(profile.button_at(1), LogicalButton::SwitchMode);
        assert!(profile.is_dual_function());
    }

    #[test]
    fn test_custom_profile_without_lines_is_invalid() {
        let err = Config::parse("[input]\nprofile = \"custom\"\n").unwrap_err();
        assert!(matches!(err, ConfigError::Invalid { field: "input.lines", .. }));
    }

    #[test]
    fn test_rejects_zero_max_saved() {
        let err = Config::parse("[session]\nmax_saved = 0\n").unwrap_err();
        assert!(err.to_string().contains("session.max_saved"));
    }

    #[test]
    fn test_parse_error_names_file() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("config.toml");
        std::fs::write(&path, "[session\n").unwrap();
        let err = Config::load(Some(&path)).unwrap_err();
        assert!(err.to_string().contains("config.toml"));
    }

    #[test]
    fn test_write_default_refuses_overwrite() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("nested").join("config.toml");
        write_default(&path).unwrap();
        assert!(path.exists());
        assert!(matches!(
            write_default(&path),
            Err(ConfigError::AlreadyExists(_))
        ));
    }

    #[test]
    fn test_show_round_trips_through_toml() {
        let config = Config::default();
        let text = config.to_toml().unwrap();
        let again = Config::parse(&text).unwrap();
        assert_eq!(again.paths.frames_dir(), config.paths.frames_dir());
    }
}
