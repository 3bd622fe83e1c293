//! Frame capture from the live camera preview.
//!
//! Grabbing a still through the camera stack stalls for seconds, so a frame
//! is taken from what the preview is already showing: screenshot the display,
//! then crop away the preview window chrome.

mod errors;

pub use errors::CaptureError;

use std::path::{Path, PathBuf};
use std::process::Stdio;

use crate::command::{CommandTemplate, LaunchSpec};

/// Produces exactly one image at a path, or fails with nothing written there.
pub trait FrameGrabber {
    fn grab(&mut self, target: &Path) -> Result<(), CaptureError>;
}

/// Crop rectangle applied to the screenshot.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CropGeometry {
    pub width: u32,
    pub height: u32,
    pub x: u32,
    pub y: u32,
}

impl Default for CropGeometry {
    fn default() -> Self {
        // Skip the 30 pixel title bar of the preview window.
        Self {
            width: 1920,
            height: 1080,
            x: 0,
            y: 30,
        }
    }
}

/// Screenshot-then-crop grabber driven by two external tools.
#[derive(Debug, Clone)]
pub struct ScreenGrab {
    /// Writes a full-screen image to `{output}`.
    grab: CommandTemplate,
    /// Crops `{input}` to `{output}`. Empty means use the screenshot as is.
    crop: CommandTemplate,
    geometry: CropGeometry,
}

impl ScreenGrab {
    pub fn new(grab: CommandTemplate, crop: CommandTemplate, geometry: CropGeometry) -> Self {
        Self {
            grab,
            crop,
            geometry,
        }
    }

    fn screenshot_path(target: &Path) -> PathBuf {
        let name = target
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_else(|| "frame".to_string());
        target.with_file_name(format!(".screen-{}", name))
    }
}

impl FrameGrabber for ScreenGrab {
    fn grab(&mut self, target: &Path) -> Result<(), CaptureError> {
        let shot = Self::screenshot_path(target);
        let shot_str = shot.to_string_lossy().into_owned();
        let target_str = target.to_string_lossy().into_owned();

        let grab = self
            .grab
            .render(&[("output", shot_str.as_str())])
            .ok_or(CaptureError::EmptyCommand)?;

        let result = run_tool(&grab).and_then(|()| {
            if !shot.exists() {
                return Err(CaptureError::NoOutput { path: shot.clone() });
            }
            let (w, h, x, y) = (
                self.geometry.width.to_string(),
                self.geometry.height.to_string(),
                self.geometry.x.to_string(),
                self.geometry.y.to_string(),
            );
            match self.crop.render(&[
                ("input", shot_str.as_str()),
                ("output", target_str.as_str()),
                ("width", w.as_str()),
                ("height", h.as_str()),
                ("x", x.as_str()),
                ("y", y.as_str()),
            ]) {
                Some(crop) => run_tool(&crop),
                None => std::fs::rename(&shot, target).map_err(CaptureError::from),
            }
        });

        if shot.exists() {
            let _ = std::fs::remove_file(&shot);
        }
        if result.is_err() && target.exists() {
            let _ = std::fs::remove_file(target);
        }
        result?;

        if target.exists() {
            Ok(())
        } else {
            Err(CaptureError::NoOutput {
                path: target.to_path_buf(),
            })
        }
    }
}

/// Run a tool to completion and map its outcome.
fn run_tool(spec: &LaunchSpec) -> Result<(), CaptureError> {
    log::debug!("Capture step: {}", spec);
    let output = spec
        .to_command()
        .stdin(Stdio::null())
        .stdout(Stdio::null())
        .stderr(Stdio::piped())
        .output()
        .map_err(|e| {
            if e.kind() == std::io::ErrorKind::NotFound {
                CaptureError::ToolNotFound {
                    program: spec.program.clone(),
                }
            } else {
                CaptureError::Io(e)
            }
        })?;

    if output.status.success() {
        Ok(())
    } else {
        Err(CaptureError::ToolFailed {
            program: spec.program.clone(),
            code: output.status.code(),
            stderr: String::from_utf8_lossy(&output.stderr).into_owned(),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    fn sh(script: &str) -> CommandTemplate {
        CommandTemplate::new(["sh", "-c", script, "grab"])
    }

    #[test]
    fn test_grab_without_crop_moves_screenshot() {
        let dir = TempDir::new().unwrap();
        let target = dir.path().join("Frame00000.jpg");
        let mut grabber = ScreenGrab::new(
            CommandTemplate::new(["sh", "-c", "echo image > \"$1\"", "grab", "{output}"]),
            CommandTemplate::new(Vec::<String>::new()),
            CropGeometry::default(),
        );
        grabber.grab(&target).unwrap();
        assert!(target.exists());
        assert!(!dir.path().join(".screen-Frame00000.jpg").exists());
    }

    #[test]
    fn test_grab_then_crop_passes_geometry() {
        let dir = TempDir::new().unwrap();
        let target = dir.path().join("Frame00003.jpg");
        let mut grabber = ScreenGrab::new(
            CommandTemplate::new(["sh", "-c", "echo image > \"$1\"", "grab", "{output}"]),
            CommandTemplate::new([
                "sh",
                "-c",
                "echo \"$2\" > \"$3\"",
                "crop",
                "{input}",
                "{width}x{height}+{x}+{y}",
                "{output}",
            ]),
            CropGeometry {
                width: 800,
                height: 600,
                x: 0,
                y: 30,
            },
        );
        grabber.grab(&target).unwrap();
        let written = std::fs::read_to_string(&target).unwrap();
        assert_eq!(written.trim(), "800x600+0+30");
        assert!(!dir.path().join(".screen-Frame00003.jpg").exists());
    }

    #[test]
    fn test_failed_grab_leaves_nothing() {
        let dir = TempDir::new().unwrap();
        let target = dir.path().join("Frame00000.jpg");
        let mut grabber = ScreenGrab::new(
            sh("echo boom >&2; exit 3"),
            CommandTemplate::new(Vec::<String>::new()),
            CropGeometry::default(),
        );
        let err = grabber.grab(&target).unwrap_err();
        match err {
            CaptureError::ToolFailed { code, stderr, .. } => {
                assert_eq!(code, Some(3));
                assert!(stderr.contains("boom"));
            }
            other => panic!("unexpected error: {other}"),
        }
        assert!(!target.exists());
    }

    #[test]
    fn test_successful_tool_without_file_is_no_output() {
        let dir = TempDir::new().unwrap();
        let target = dir.path().join("Frame00000.jpg");
        let mut grabber = ScreenGrab::new(
            sh("true"),
            CommandTemplate::new(Vec::<String>::new()),
            CropGeometry::default(),
        );
        assert!(matches!(
            grabber.grab(&target),
            Err(CaptureError::NoOutput { .. })
        ));
        assert!(!target.exists());
    }

    #[test]
    fn test_missing_tool_is_reported() {
        let dir = TempDir::new().unwrap();
        let target = dir.path().join("Frame00000.jpg");
        let mut grabber = ScreenGrab::new(
            CommandTemplate::new(["/nonexistent/scrot", "{output}"]),
            CommandTemplate::new(Vec::<String>::new()),
            CropGeometry::default(),
        );
        assert!(matches!(
            grabber.grab(&target),
            Err(CaptureError::ToolNotFound { .. })
        ));
    }
}
