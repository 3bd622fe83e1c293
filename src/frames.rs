//! The frame sequence under construction.
//!
//! Frames live in one directory as `Frame00000.jpg`, `Frame00001.jpg`, ...
//! and always occupy exactly the ordinals `[0, count)`. Every mutation either
//! keeps that true or, when a filesystem step fails halfway, rescans and
//! compacts the directory before reporting the error.

use std::fs;
use std::io;
use std::path::{Path, PathBuf};

use crate::capture::{CaptureError, FrameGrabber};

pub const FRAME_PREFIX: &str = "Frame";
const STAGING_PREFIX: &str = ".partial-";

/// Errors from the frame store.
#[derive(Debug, thiserror::Error)]
pub enum FrameError {
    #[error("capture of frame {ordinal} failed: {source}")]
    Capture {
        ordinal: usize,
        #[source]
        source: CaptureError,
    },

    #[error("frame {ordinal} does not exist ({count} frames)")]
    OutOfRange { ordinal: usize, count: usize },

    #[error("I/O error on '{}': {source}", .path.display())]
    Io {
        path: PathBuf,
        #[source]
        source: io::Error,
    },
}

fn io_err(path: &Path) -> impl FnOnce(io::Error) -> FrameError + '_ {
    move |source| FrameError::Io {
        path: path.to_path_buf(),
        source,
    }
}

/// File name of the frame at `ordinal`.
pub fn frame_file_name(ordinal: usize, extension: &str) -> String {
    format!("{}{:05}.{}", FRAME_PREFIX, ordinal, extension)
}

/// Parse an ordinal back out of a frame file name.
pub fn parse_frame_ordinal(name: &str, extension: &str) -> Option<usize> {
    let digits = name
        .strip_prefix(FRAME_PREFIX)?
        .strip_suffix(extension)?
        .strip_suffix('.')?;
    if digits.is_empty() || !digits.bytes().all(|b| b.is_ascii_digit()) {
        return None;
    }
    digits.parse().ok()
}

/// Step a cursor by one in the sign of `direction`, wrapping over `[0, len)`.
///
/// Stepping back from the first position (or from the `-1` "before first"
/// sentinel) lands on the last one. With `len == 0` the cursor is returned
/// unchanged.
pub fn wrap_cursor(current: isize, direction: isize, len: usize) -> isize {
    if len == 0 {
        return current;
    }
    let len = len as isize;
    let next = current + direction.signum();
    if next < 0 {
        len - 1
    } else if next >= len {
        0
    } else {
        next
    }
}

/// Sorted ordinals of the frame files present in `dir`.
pub fn scan_ordinals(dir: &Path, extension: &str) -> io::Result<Vec<usize>> {
    let mut ordinals = Vec::new();
    for entry in fs::read_dir(dir)? {
        let entry = entry?;
        if !entry.file_type()?.is_file() {
            continue;
        }
        if let Some(ordinal) = entry
            .file_name()
            .to_str()
            .and_then(|name| parse_frame_ordinal(name, extension))
        {
            ordinals.push(ordinal);
        }
    }
    ordinals.sort_unstable();
    ordinals.dedup();
    Ok(ordinals)
}

/// The on-disk, densely numbered frame sequence.
#[derive(Debug)]
pub struct FrameStore {
    dir: PathBuf,
    extension: String,
    count: usize,
    cursor: isize,
}

impl FrameStore {
    /// Open (creating if needed) a frame directory.
    ///
    /// Leftover staging files are removed and any gap in the numbering is
    /// closed, so the store starts out dense.
    pub fn open(dir: impl Into<PathBuf>, extension: impl Into<String>) -> Result<Self, FrameError> {
        let dir = dir.into();
        fs::create_dir_all(&dir).map_err(io_err(&dir))?;
        let mut store = Self {
            dir,
            extension: extension.into(),
            count: 0,
            cursor: -1,
        };
        store.remove_staging()?;
        store.compact()?;
        store.cursor = store.count as isize - 1;
        Ok(store)
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    pub fn extension(&self) -> &str {
        &self.extension
    }

    pub fn count(&self) -> usize {
        self.count
    }

    pub fn is_empty(&self) -> bool {
        self.count == 0
    }

    /// Current frame index, or `-1` before the first capture.
    pub fn cursor(&self) -> isize {
        self.cursor
    }

    pub fn frame_path(&self, ordinal: usize) -> PathBuf {
        self.dir.join(frame_file_name(ordinal, &self.extension))
    }

    /// Path of the frame under the cursor.
    pub fn current_frame(&self) -> Option<PathBuf> {
        if self.cursor < 0 || self.cursor as usize >= self.count {
            return None;
        }
        Some(self.frame_path(self.cursor as usize))
    }

    /// Every frame path in ordinal order.
    pub fn frame_paths(&self) -> Vec<PathBuf> {
        (0..self.count).map(|i| self.frame_path(i)).collect()
    }

    /// Ordinals actually present on disk.
    pub fn ordinals_on_disk(&self) -> Result<Vec<usize>, FrameError> {
        scan_ordinals(&self.dir, &self.extension).map_err(io_err(&self.dir))
    }

    /// Capture one new frame at ordinal `count`.
    ///
    /// The grabber writes to a staging name which is renamed into place only
    /// after it succeeds, so a failed capture never changes `count`.
    pub fn capture(&mut self, grabber: &mut dyn FrameGrabber) -> Result<usize, FrameError> {
        let ordinal = self.count;
        let staging = self
            .dir
            .join(format!("{}{}", STAGING_PREFIX, frame_file_name(ordinal, &self.extension)));
        if staging.exists() {
            fs::remove_file(&staging).map_err(io_err(&staging))?;
        }

        if let Err(source) = grabber.grab(&staging) {
            let _ = fs::remove_file(&staging);
            return Err(FrameError::Capture { ordinal, source });
        }
        if !staging.exists() {
            return Err(FrameError::Capture {
                ordinal,
                source: CaptureError::NoOutput { path: staging },
            });
        }

        let target = self.frame_path(ordinal);
        if let Err(source) = fs::rename(&staging, &target) {
            let _ = fs::remove_file(&staging);
            return Err(FrameError::Io {
                path: target,
                source,
            });
        }

        self.count += 1;
        self.cursor = self.count as isize - 1;
        log::info!("Record Frame #{}", self.count);
        Ok(ordinal)
    }

    /// Remove the frame at `ordinal` and shift every later frame down by one.
    pub fn erase(&mut self, ordinal: usize) -> Result<(), FrameError> {
        if ordinal >= self.count {
            return Err(FrameError::OutOfRange {
                ordinal,
                count: self.count,
            });
        }

        log::info!("Erasing Frame {}", ordinal);
        let victim = self.frame_path(ordinal);
        match fs::remove_file(&victim) {
            Ok(()) => {}
            Err(e) if e.kind() == io::ErrorKind::NotFound => {}
            Err(source) => {
                return Err(FrameError::Io {
                    path: victim,
                    source,
                })
            }
        }

        if let Err(e) = self.renumber_down_from(ordinal) {
            self.recover();
            return Err(e);
        }

        self.count -= 1;
        self.clamp_cursor();
        Ok(())
    }

    fn renumber_down_from(&self, ordinal: usize) -> Result<(), FrameError> {
        for from in ordinal + 1..self.count {
            let src = self.frame_path(from);
            let dst = self.frame_path(from - 1);
            log::debug!("Rename: {} -> {}", src.display(), dst.display());
            fs::rename(&src, &dst).map_err(io_err(&src))?;
        }
        Ok(())
    }

    /// Delete every frame.
    pub fn reset(&mut self) -> Result<(), FrameError> {
        let result = self.remove_all_frames();
        self.count = 0;
        self.cursor = -1;
        if result.is_err() {
            self.recover();
        }
        result
    }

    fn remove_all_frames(&self) -> Result<(), FrameError> {
        self.remove_staging()?;
        for ordinal in self.ordinals_on_disk()? {
            let path = self.frame_path(ordinal);
            match fs::remove_file(&path) {
                Ok(()) => {}
                Err(e) if e.kind() == io::ErrorKind::NotFound => {}
                Err(source) => return Err(FrameError::Io { path, source }),
            }
        }
        Ok(())
    }

    fn remove_staging(&self) -> Result<(), FrameError> {
        for entry in fs::read_dir(&self.dir).map_err(io_err(&self.dir))? {
            let entry = entry.map_err(io_err(&self.dir))?;
            let name = entry.file_name();
            let is_staging = name
                .to_str()
                .map(|n| n.starts_with(STAGING_PREFIX) || n.starts_with(".screen-"))
                .unwrap_or(false);
            if is_staging {
                let path = entry.path();
                fs::remove_file(&path).map_err(io_err(&path))?;
            }
        }
        Ok(())
    }

    /// Move the cursor one step in `direction`, wrapping. No-op when empty.
    pub fn advance_cursor(&mut self, direction: isize) -> isize {
        self.cursor = wrap_cursor(self.cursor, direction, self.count);
        self.cursor
    }

    /// Renumber whatever frames are on disk to `[0, n)` and adopt `n` as the
    /// count. Returns the new count.
    pub fn compact(&mut self) -> Result<usize, FrameError> {
        let ordinals = self.ordinals_on_disk()?;
        for (index, ordinal) in ordinals.iter().copied().enumerate() {
            if ordinal != index {
                let src = self.frame_path(ordinal);
                let dst = self.frame_path(index);
                log::debug!("Compact: {} -> {}", src.display(), dst.display());
                fs::rename(&src, &dst).map_err(io_err(&src))?;
            }
        }
        if ordinals.len() != self.count {
            log::info!("Frame count {} -> {}", self.count, ordinals.len());
        }
        self.count = ordinals.len();
        self.clamp_cursor();
        Ok(self.count)
    }

    fn recover(&mut self) {
        if let Err(e) = self.compact() {
            log::error!("Could not restore frame numbering in {}: {}", self.dir.display(), e);
        }
    }

    fn clamp_cursor(&mut self) {
        if self.count == 0 {
            self.cursor = -1;
        } else if self.cursor >= self.count as isize {
            self.cursor = self.count as isize - 1;
        }
    }
}
