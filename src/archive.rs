//! Ring of saved animations.
//!
//! Slot `Video00` is always the most recent save. Saving shifts every
//! occupied slot up by one, evicting `Video{max-1}` when the ring is full.

use std::fs;
use std::io;
use std::path::{Path, PathBuf};
use std::time::{Duration, Instant};

use crate::frames::{frame_file_name, FrameStore};

pub const SLOT_PREFIX: &str = "Video";
const STAGING_DIR: &str = ".staging";

#[derive(Debug, thiserror::Error)]
pub enum ArchiveError {
    #[error("failed to copy '{}' into the archive: {source}", .from.display())]
    Copy {
        from: PathBuf,
        #[source]
        source: io::Error,
    },

    #[error("I/O error on '{}': {source}", .path.display())]
    Io {
        path: PathBuf,
        #[source]
        source: io::Error,
    },
}

fn io_err(path: &Path) -> impl FnOnce(io::Error) -> ArchiveError + '_ {
    move |source| ArchiveError::Io {
        path: path.to_path_buf(),
        source,
    }
}

/// What a save request ended up doing.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SaveOutcome {
    Saved { frames: usize, evicted: bool },
    /// Dropped because the previous save was too recent.
    Throttled { remaining: Duration },
    /// There were no frames to save.
    NothingToSave,
}

pub fn slot_dir_name(slot: usize) -> String {
    format!("{}{:02}", SLOT_PREFIX, slot)
}

fn parse_slot(name: &str) -> Option<usize> {
    let digits = name.strip_prefix(SLOT_PREFIX)?;
    if digits.len() < 2 || !digits.bytes().all(|b| b.is_ascii_digit()) {
        return None;
    }
    digits.parse().ok()
}

#[derive(Debug)]
pub struct SavedArchive {
    dir: PathBuf,
    extension: String,
    max_saved: usize,
    min_interval: Duration,
    bypass_cooldown: bool,
    occupied: usize,
    last_save: Option<Instant>,
}

impl SavedArchive {
    /// Open (creating if needed) the archive directory, discarding an
    /// interrupted save and closing gaps between slots.
    pub fn open(
        dir: impl Into<PathBuf>,
        extension: impl Into<String>,
        max_saved: usize,
        min_interval: Duration,
        bypass_cooldown: bool,
    ) -> Result<Self, ArchiveError> {
        let dir = dir.into();
        fs::create_dir_all(&dir).map_err(io_err(&dir))?;
        let mut archive = Self {
            dir,
            extension: extension.into(),
            max_saved: max_saved.max(1),
            min_interval,
            bypass_cooldown,
            occupied: 0,
            last_save: None,
        };
        archive.remove_staging()?;
        archive.compact()?;
        if bypass_cooldown {
            log::warn!("Save cooldown is bypassed");
        }
        Ok(archive)
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    pub fn occupied(&self) -> usize {
        self.occupied
    }

    pub fn is_empty(&self) -> bool {
        self.occupied == 0
    }

    pub fn max_saved(&self) -> usize {
        self.max_saved
    }

    pub fn slot_dir(&self, slot: usize) -> PathBuf {
        self.dir.join(slot_dir_name(slot))
    }

    fn staging_dir(&self) -> PathBuf {
        self.dir.join(STAGING_DIR)
    }

    /// Slot an arbitrary (possibly negative) index refers to, or `None` when
    /// the archive is empty.
    pub fn resolve(&self, index: isize) -> Option<usize> {
        if self.occupied == 0 {
            return None;
        }
        Some(index.rem_euclid(self.occupied as isize) as usize)
    }

    /// First frame of the slot at `index`, for a still preview.
    pub fn preview(&self, index: isize) -> Option<PathBuf> {
        let slot = self.resolve(index)?;
        Some(self.slot_dir(slot).join(frame_file_name(0, &self.extension)))
    }

    /// Directory of the slot at `index`, for slideshow playback.
    pub fn play(&self, index: isize) -> Option<PathBuf> {
        self.resolve(index).map(|slot| self.slot_dir(slot))
    }

    /// Slot indices currently present on disk, sorted.
    pub fn slots_on_disk(&self) -> Result<Vec<usize>, ArchiveError> {
        let mut slots = Vec::new();
        for entry in fs::read_dir(&self.dir).map_err(io_err(&self.dir))? {
            let entry = entry.map_err(io_err(&self.dir))?;
            if !entry.file_type().map_err(io_err(&self.dir))?.is_dir() {
                continue;
            }
            if let Some(slot) = entry.file_name().to_str().and_then(parse_slot) {
                slots.push(slot);
            }
        }
        slots.sort_unstable();
        slots.dedup();
        Ok(slots)
    }

    /// Copy the current frame sequence into slot 0.
    ///
    /// The frames are first copied into a staging directory; the ring is only
    /// shifted once the copy is complete.
    pub fn save(&mut self, frames: &FrameStore, now: Instant) -> Result<SaveOutcome, ArchiveError> {
        if frames.is_empty() {
            log::info!("Nothing to save");
            return Ok(SaveOutcome::NothingToSave);
        }

        if !self.bypass_cooldown {
            if let Some(last) = self.last_save {
                let elapsed = now.saturating_duration_since(last);
                if elapsed < self.min_interval {
                    let remaining = self.min_interval - elapsed;
                    log::info!("Save ignored, next save allowed in {}s", remaining.as_secs());
                    return Ok(SaveOutcome::Throttled { remaining });
                }
            }
        }

        let staging = self.staging_dir();
        if let Err(e) = self.stage(frames, &staging) {
            let _ = fs::remove_dir_all(&staging);
            return Err(e);
        }

        let mut evicted = false;
        if self.occupied == self.max_saved {
            let tail = self.slot_dir(self.max_saved - 1);
            log::info!("Discarding {}", tail.display());
            if let Err(source) = fs::remove_dir_all(&tail) {
                let _ = fs::remove_dir_all(&staging);
                return Err(ArchiveError::Io { path: tail, source });
            }
            self.occupied -= 1;
            evicted = true;
        }

        if let Err(e) = self.shift_up().and_then(|()| {
            let head = self.slot_dir(0);
            fs::rename(&staging, &head).map_err(io_err(&head))
        }) {
            let _ = fs::remove_dir_all(&staging);
            self.recover();
            return Err(e);
        }

        self.occupied += 1;
        self.last_save = Some(now);
        log::info!("Saved {} frames to {}", frames.count(), slot_dir_name(0));
        Ok(SaveOutcome::Saved {
            frames: frames.count(),
            evicted,
        })
    }

    fn stage(&self, frames: &FrameStore, staging: &Path) -> Result<(), ArchiveError> {
        if staging.exists() {
            fs::remove_dir_all(staging).map_err(io_err(staging))?;
        }
        fs::create_dir_all(staging).map_err(io_err(staging))?;
        for (ordinal, from) in frames.frame_paths().into_iter().enumerate() {
            let to = staging.join(frame_file_name(ordinal, frames.extension()));
            fs::copy(&from, &to).map_err(|source| ArchiveError::Copy { from, source })?;
        }
        Ok(())
    }

    /// Relocate slots high to low so nothing is overwritten before it moves.
    fn shift_up(&self) -> Result<(), ArchiveError> {
        for slot in (0..self.occupied).rev() {
            let src = self.slot_dir(slot);
            let dst = self.slot_dir(slot + 1);
            log::debug!("Move: {} -> {}", src.display(), dst.display());
            fs::rename(&src, &dst).map_err(io_err(&src))?;
        }
        Ok(())
    }

    fn remove_staging(&self) -> Result<(), ArchiveError> {
        let staging = self.staging_dir();
        if staging.exists() {
            log::warn!("Removing interrupted save at {}", staging.display());
            fs::remove_dir_all(&staging).map_err(io_err(&staging))?;
        }
        Ok(())
    }

    /// Renumber the slots on disk to `[0, n)`, dropping any beyond the ring
    /// size. Returns the occupied count.
    pub fn compact(&mut self) -> Result<usize, ArchiveError> {
        let mut slots = self.slots_on_disk()?;
        while slots.len() > self.max_saved {
            if let Some(extra) = slots.pop() {
                let path = self.slot_dir(extra);
                log::warn!(
                    "Archive holds more than {} slots, discarding {}",
                    self.max_saved,
                    path.display()
                );
                fs::remove_dir_all(&path).map_err(io_err(&path))?;
            }
        }
        for (index, slot) in slots.iter().copied().enumerate() {
            if slot != index {
                let src = self.slot_dir(slot);
                let dst = self.slot_dir(index);
                log::debug!("Compact: {} -> {}", src.display(), dst.display());
                fs::rename(&src, &dst).map_err(io_err(&src))?;
            }
        }
        self.occupied = slots.len();
        Ok(self.occupied)
    }

    fn recover(&mut self) {
        if let Err(e) = self.compact() {
            log::error!("Could not restore archive slots in {}: {}", self.dir.display(), e);
        }
    }
}
