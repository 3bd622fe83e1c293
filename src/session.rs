//! The kiosk's state machine: one poll of the panel, one effect.
//!
//! A [`Session`] owns every piece of mutable state (mode, cursors, the frame
//! store, the archive, the background processes) and is driven by calling
//! [`Session::tick`] from a single loop.

use std::path::Path;
use std::time::{Duration, Instant};

use crate::archive::{ArchiveError, SaveOutcome, SavedArchive};
use crate::button::{LogicalButton, SessionMode};
use crate::capture::FrameGrabber;
use crate::clock::Clock;
use crate::command::{CommandTemplate, LaunchSpec};
use crate::frames::{wrap_cursor, FrameError, FrameStore};
use crate::input::{InputArbiter, InputError};
use crate::power::{PowerError, PowerOff};
use crate::process::{ProcessControl, ProcessError, ProcessKind, ProcessManager, SystemControl};

#[derive(Debug, thiserror::Error)]
pub enum SessionError {
    #[error(transparent)]
    Input(#[from] InputError),

    #[error(transparent)]
    Frame(#[from] FrameError),

    #[error(transparent)]
    Archive(#[from] ArchiveError),

    #[error(transparent)]
    Process(#[from] ProcessError),

    #[error(transparent)]
    Power(#[from] PowerError),
}

impl SessionError {
    /// Whether the poll loop has to give up. A single failed line read is
    /// retried on the next poll; losing the input subsystem is not.
    pub fn is_fatal(&self) -> bool {
        match self {
            SessionError::Input(InputError::Read { .. }) => false,
            SessionError::Input(_) => true,
            _ => false,
        }
    }
}

/// Outcome of one tick.
#[derive(Debug)]
pub enum Status {
    /// No press and nothing due.
    Idle,
    /// The press was carried out.
    Done(LogicalButton),
    /// The press had nothing to act on, or does nothing in this mode.
    Ignored(LogicalButton),
    /// A save came too soon after the previous one.
    Throttled { remaining: Duration },
    /// Viewing was left after the inactivity timeout.
    TimedOut,
    /// The live preview came back after playback ended.
    PreviewResumed,
    /// The press failed. The session is still usable.
    Failed {
        button: LogicalButton,
        error: SessionError,
    },
    /// Shutdown ran. The loop must stop.
    Shutdown { powered_off: bool },
}

impl Status {
    pub fn is_shutdown(&self) -> bool {
        matches!(self, Status::Shutdown { .. })
    }
}

/// Commands for the preview and the viewer, with the values they need.
#[derive(Debug, Clone)]
pub struct Launchers {
    /// Live camera preview: `{width}`, `{height}`.
    pub preview: CommandTemplate,
    /// Single image: `{path}`.
    pub still: CommandTemplate,
    /// Every image in a directory, then exit: `{path}`, `{delay}`.
    pub slideshow: CommandTemplate,
    pub width: u32,
    pub height: u32,
    pub slideshow_delay: f64,
}

impl Launchers {
    pub fn preview(&self) -> Option<LaunchSpec> {
        let (w, h) = (self.width.to_string(), self.height.to_string());
        self.preview.render(&[("width", w.as_str()), ("height", h.as_str())])
    }

    pub fn still(&self, path: &Path) -> Option<LaunchSpec> {
        let path = path.to_string_lossy();
        self.still.render(&[("path", path.as_ref())])
    }

    pub fn slideshow(&self, dir: &Path) -> Option<LaunchSpec> {
        let path = dir.to_string_lossy();
        let delay = self.slideshow_delay.to_string();
        self.slideshow
            .render(&[("path", path.as_ref()), ("delay", delay.as_str())])
    }
}

/// Timing and shutdown settings.
#[derive(Debug, Clone)]
pub struct SessionSettings {
    pub mode_timeout: Duration,
    /// Wait after (re)starting the preview before grabbing the screen.
    pub camera_settle: Duration,
    /// Camera tool killed by name at shutdown. Empty skips the scan.
    pub camera_process_name: String,
    pub shutdown_grace: Duration,
}

impl Default for SessionSettings {
    fn default() -> Self {
        Self {
            mode_timeout: Duration::from_secs(120),
            camera_settle: Duration::from_millis(1500),
            camera_process_name: "libcamera-vid".to_string(),
            shutdown_grace: Duration::from_secs(6),
        }
    }
}

/// Everything a session is assembled from.
pub struct SessionParts<C: ProcessControl = SystemControl> {
    pub frames: FrameStore,
    pub archive: SavedArchive,
    pub processes: ProcessManager<C>,
    pub arbiter: InputArbiter,
    pub grabber: Box<dyn FrameGrabber>,
    pub clock: Box<dyn Clock>,
    pub power: Box<dyn PowerOff>,
    pub launchers: Launchers,
    pub settings: SessionSettings,
}

pub struct Session<C: ProcessControl = SystemControl> {
    mode: SessionMode,
    frames: FrameStore,
    archive: SavedArchive,
    processes: ProcessManager<C>,
    arbiter: InputArbiter,
    grabber: Box<dyn FrameGrabber>,
    clock: Box<dyn Clock>,
    power: Box<dyn PowerOff>,
    launchers: Launchers,
    settings: SessionSettings,
    preview_index: isize,
    last_activity: Instant,
    /// Play stopped the live preview; bring it back when playback ends.
    preview_suspended: bool,
}

impl<C: ProcessControl> Session<C> {
    pub fn new(parts: SessionParts<C>) -> Self {
        let last_activity = parts.clock.now();
        Self {
            mode: SessionMode::Creating,
            frames: parts.frames,
            archive: parts.archive,
            processes: parts.processes,
            arbiter: parts.arbiter,
            grabber: parts.grabber,
            clock: parts.clock,
            power: parts.power,
            launchers: parts.launchers,
            settings: parts.settings,
            preview_index: 0,
            last_activity,
            preview_suspended: false,
        }
    }

    pub fn mode(&self) -> SessionMode {
        self.mode
    }

    pub fn frames(&self) -> &FrameStore {
        &self.frames
    }

    pub fn archive(&self) -> &SavedArchive {
        &self.archive
    }

    pub fn processes(&self) -> &ProcessManager<C> {
        &self.processes
    }

    pub fn processes_mut(&mut self) -> &mut ProcessManager<C> {
        &mut self.processes
    }

    pub fn preview_index(&self) -> isize {
        self.preview_index
    }

    /// Bring the kiosk up: optionally clear old frames, then start the
    /// live preview. A preview that fails to start is logged, not fatal.
    pub fn start(&mut self, keep_frames: bool) -> Result<(), SessionError> {
        if keep_frames {
            log::info!("Keeping {} frames from the last run", self.frames.count());
        } else {
            self.frames.reset()?;
        }
        if let Err(e) = self.start_preview() {
            log::warn!("Live preview did not start: {}", e);
        }
        log::info!("Mode: {}", self.mode);
        Ok(())
    }

    /// Poll the panel once and act on the result.
    ///
    /// Only a failure to read the input subsystem is returned as an error;
    /// everything else is reported through [`Status`].
    pub fn tick(&mut self) -> Result<Status, SessionError> {
        let now = self.clock.now();
        let raw = self.arbiter.poll(now)?;
        if raw.is_none() {
            return Ok(self.idle(now));
        }
        let button = self.arbiter.profile().resolve(raw, self.mode);
        log::info!("Button {} pressed", button);
        Ok(self.dispatch(button))
    }

    /// Carry out one logical press in the current mode.
    pub fn dispatch(&mut self, button: LogicalButton) -> Status {
        self.last_activity = self.clock.now();
        match self.perform(button) {
            Ok(status) => status,
            Err(error) => {
                log::error!("{} failed: {}", button, error);
                Status::Failed { button, error }
            }
        }
    }

    fn perform(&mut self, button: LogicalButton) -> Result<Status, SessionError> {
        use LogicalButton as B;
        use SessionMode::{Creating, Viewing};

        match (self.mode, button) {
            (_, B::SwitchMode) => {
                self.set_mode(self.mode.toggled());
                Ok(Status::Done(button))
            }
            (_, B::Shutdown) => Ok(self.shutdown()),

            (Creating, B::Record) => self.record(),
            (Creating, B::Back) => self.step_frame(button, -1),
            (Creating, B::Forward) => self.step_frame(button, 1),
            (Creating, B::Erase) => self.erase(),
            (Creating, B::Restart) => self.restart(),
            (Creating, B::Play) => self.play_frames(),

            (Viewing, B::ViewPrevious) => self.step_preview(button, -1),
            (Viewing, B::ViewNext) => self.step_preview(button, 1),
            (Viewing, B::Save) => self.save(),
            (Viewing, B::PlaySaved) => self.play_saved(),

            (mode, other) => {
                log::debug!("{} does nothing in {} mode", other, mode);
                Ok(Status::Ignored(other))
            }
        }
    }

    fn idle(&mut self, now: Instant) -> Status {
        if self.mode == SessionMode::Viewing
            && now.saturating_duration_since(self.last_activity) >= self.settings.mode_timeout
        {
            log::info!("No activity for {}s", self.settings.mode_timeout.as_secs());
            self.set_mode(SessionMode::Creating);
            return Status::TimedOut;
        }

        if self.preview_suspended && !self.processes.is_running(ProcessKind::Playback) {
            return match self.start_preview() {
                Ok(()) => Status::PreviewResumed,
                Err(error) => {
                    log::warn!("Could not resume live preview: {}", error);
                    // Do not retry every cycle; the next Record tries again.
                    self.preview_suspended = false;
                    Status::Idle
                }
            };
        }

        Status::Idle
    }

    fn set_mode(&mut self, mode: SessionMode) {
        if mode == self.mode {
            return;
        }
        self.mode = mode;
        log::info!("Mode: {}", mode);
        if mode == SessionMode::Creating {
            self.processes.stop(ProcessKind::Playback);
            if !self.processes.is_running(ProcessKind::Preview) {
                if let Err(e) = self.start_preview() {
                    log::warn!("Could not resume live preview: {}", e);
                }
            }
        }
    }

    fn start_preview(&mut self) -> Result<(), SessionError> {
        let kind = ProcessKind::Preview;
        let launch = self
            .launchers
            .preview()
            .ok_or(ProcessError::EmptyCommand { kind })?;
        self.processes.start(kind, launch)?;
        self.preview_suspended = false;
        Ok(())
    }

    fn show_still(&mut self, path: &Path) -> Result<(), SessionError> {
        let kind = ProcessKind::Playback;
        let launch = self
            .launchers
            .still(path)
            .ok_or(ProcessError::EmptyCommand { kind })?;
        self.processes.start(kind, launch)?;
        Ok(())
    }

    fn play_directory(&mut self, dir: &Path) -> Result<(), SessionError> {
        let kind = ProcessKind::Playback;
        let launch = self
            .launchers
            .slideshow(dir)
            .ok_or(ProcessError::EmptyCommand { kind })?;
        self.processes.start(kind, launch)?;
        Ok(())
    }

    fn record(&mut self) -> Result<Status, SessionError> {
        // The grab is a screenshot, so nothing may cover the preview.
        self.processes.stop(ProcessKind::Playback);
        if !self.processes.is_running(ProcessKind::Preview) {
            self.start_preview()?;
            self.clock.sleep(self.settings.camera_settle);
        }
        self.frames.capture(self.grabber.as_mut())?;
        Ok(Status::Done(LogicalButton::Record))
    }

    fn step_frame(
        &mut self,
        button: LogicalButton,
        direction: isize,
    ) -> Result<Status, SessionError> {
        if self.frames.is_empty() {
            return Ok(Status::Ignored(button));
        }
        self.frames.advance_cursor(direction);
        match self.frames.current_frame() {
            Some(path) => {
                log::debug!("Showing frame {}", self.frames.cursor());
                self.show_still(&path)?;
                Ok(Status::Done(button))
            }
            None => Ok(Status::Ignored(button)),
        }
    }

    fn erase(&mut self) -> Result<Status, SessionError> {
        let cursor = self.frames.cursor();
        if cursor < 0 {
            return Ok(Status::Ignored(LogicalButton::Erase));
        }
        // The viewer may be showing the frame being removed.
        self.processes.stop(ProcessKind::Playback);
        self.frames.erase(cursor as usize)?;
        Ok(Status::Done(LogicalButton::Erase))
    }

    fn restart(&mut self) -> Result<Status, SessionError> {
        self.processes.stop(ProcessKind::Playback);
        self.frames.reset()?;
        self.preview_index = 0;
        if !self.processes.is_running(ProcessKind::Preview) {
            self.start_preview()?;
        }
        Ok(Status::Done(LogicalButton::Restart))
    }

    fn play_frames(&mut self) -> Result<Status, SessionError> {
        if self.frames.is_empty() {
            return Ok(Status::Ignored(LogicalButton::Play));
        }
        let was_previewing = self.processes.is_running(ProcessKind::Preview);
        self.processes.stop(ProcessKind::Preview);
        self.preview_suspended = was_previewing || self.preview_suspended;
        let dir = self.frames.dir().to_path_buf();
        self.play_directory(&dir)?;
        Ok(Status::Done(LogicalButton::Play))
    }

    fn step_preview(
        &mut self,
        button: LogicalButton,
        direction: isize,
    ) -> Result<Status, SessionError> {
        if self.archive.is_empty() {
            return Ok(Status::Ignored(button));
        }
        self.preview_index = wrap_cursor(self.preview_index, direction, self.archive.occupied());
        match self.archive.preview(self.preview_index) {
            Some(path) => {
                log::debug!("Previewing saved animation {}", self.preview_index);
                self.show_still(&path)?;
                Ok(Status::Done(button))
            }
            None => Ok(Status::Ignored(button)),
        }
    }

    fn save(&mut self) -> Result<Status, SessionError> {
        let now = self.clock.now();
        match self.archive.save(&self.frames, now)? {
            SaveOutcome::Saved { .. } => {
                self.preview_index = 0;
                Ok(Status::Done(LogicalButton::Save))
            }
            SaveOutcome::Throttled { remaining } => Ok(Status::Throttled { remaining }),
            SaveOutcome::NothingToSave => Ok(Status::Ignored(LogicalButton::Save)),
        }
    }

    fn play_saved(&mut self) -> Result<Status, SessionError> {
        match self.archive.play(self.preview_index) {
            Some(dir) => {
                self.play_directory(&dir)?;
                Ok(Status::Done(LogicalButton::PlaySaved))
            }
            None => Ok(Status::Ignored(LogicalButton::PlaySaved)),
        }
    }

    /// Stop everything, give the signals time to land, then power off.
    pub fn shutdown(&mut self) -> Status {
        log::info!("Shutting down");
        self.processes.stop_all();
        self.preview_suspended = false;
        if !self.settings.camera_process_name.is_empty() {
            let killed = self.processes.kill_by_name(&self.settings.camera_process_name);
            log::debug!("Killed {} stray camera processes", killed.len());
        }
        self.clock.sleep(self.settings.shutdown_grace);
        match self.power.power_off() {
            Ok(()) => Status::Shutdown { powered_off: true },
            Err(e) => {
                log::error!("Power-off failed: {}", e);
                Status::Shutdown { powered_off: false }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn launchers() -> Launchers {
        Launchers {
            preview: CommandTemplate::new([
                "libcamera-vid",
                "-t",
                "0",
                "--width",
                "{width}",
                "--height",
                "{height}",
            ]),
            still: CommandTemplate::new(["feh", "{path}"]),
            slideshow: CommandTemplate::new(["feh", "--slideshow-delay", "{delay}", "{path}"]),
            width: 800,
            height: 600,
            slideshow_delay: 0.001,
        }
    }

    #[test]
    fn test_preview_gets_resolution() {
        let launch = launchers().preview().unwrap();
        assert_eq!(launch.program, "libcamera-vid");
        assert_eq!(launch.args, vec!["-t", "0", "--width", "800", "--height", "600"]);
    }

    #[test]
    fn test_paths_with_spaces_stay_one_argument() {
        let launch = launchers().still(Path::new("/srv/my frames/Frame00001.jpg")).unwrap();
        assert_eq!(launch.args, vec!["/srv/my frames/Frame00001.jpg"]);
    }

    #[test]
    fn test_slideshow_gets_delay_and_dir() {
        let launch = launchers().slideshow(Path::new("/srv/Saved/Video03")).unwrap();
        assert_eq!(launch.args, vec!["--slideshow-delay", "0.001", "/srv/Saved/Video03"]);
    }

    #[test]
    fn test_only_losing_input_is_fatal() {
        let lost = SessionError::Input(InputError::Disconnected);
        let glitch = SessionError::Input(InputError::Read {
            pin: 24,
            source: std::io::Error::other("busy"),
        });
        let capture = SessionError::Frame(FrameError::OutOfRange { ordinal: 0, count: 0 });
        assert!(lost.is_fatal());
        assert!(!glitch.is_fatal());
        assert!(!capture.is_fatal());
    }
}
