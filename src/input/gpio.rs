//! GPIO button lines through the kernel's sysfs interface.

use std::fs;
use std::path::{Path, PathBuf};
use std::thread;
use std::time::Duration;

use super::{InputError, InputLines, Sample};

pub const DEFAULT_SYSFS_ROOT: &str = "/sys/class/gpio";

/// Reads the level of each configured pin from `<root>/gpioN/value`.
#[derive(Debug)]
pub struct SysfsGpio {
    pins: Vec<u32>,
    values: Vec<PathBuf>,
}

impl SysfsGpio {
    /// Export every pin (if the kernel has not already) and set it as an
    /// input. `offset` is added to each pin number to get the sysfs line
    /// number, for kernels where the header pins do not start at 0.
    pub fn open(root: impl AsRef<Path>, pins: &[u32], offset: u32) -> Result<Self, InputError> {
        let root = root.as_ref();
        if pins.is_empty() {
            return Err(InputError::NoLines);
        }
        if !root.is_dir() {
            return Err(InputError::Unavailable(format!(
                "{} does not exist",
                root.display()
            )));
        }

        let mut values = Vec::with_capacity(pins.len());
        for &pin in pins {
            let line = pin + offset;
            let dir = root.join(format!("gpio{}", line));
            if !dir.exists() {
                fs::write(root.join("export"), line.to_string())
                    .map_err(|source| InputError::Setup { pin, source })?;
                wait_for(&dir);
            }
            let direction = dir.join("direction");
            if direction.exists() {
                fs::write(&direction, "in").map_err(|source| InputError::Setup { pin, source })?;
            }
            let value = dir.join("value");
            // Fail at startup rather than on the first poll.
            read_level(&value).map_err(|source| InputError::Setup { pin, source })?;
            values.push(value);
        }

        log::info!("Reading buttons on GPIO pins {:?}", pins);
        Ok(Self {
            pins: pins.to_vec(),
            values,
        })
    }

    pub fn pins(&self) -> &[u32] {
        &self.pins
    }
}

/// The export attribute appears asynchronously after writing to `export`.
fn wait_for(dir: &Path) {
    for _ in 0..20 {
        if dir.exists() {
            return;
        }
        thread::sleep(Duration::from_millis(50));
    }
}

fn read_level(path: &Path) -> std::io::Result<bool> {
    let raw = fs::read_to_string(path)?;
    Ok(raw.trim() != "0")
}

impl InputLines for SysfsGpio {
    fn read(&mut self) -> Result<Sample, InputError> {
        let mut levels = Vec::with_capacity(self.values.len());
        for (pin, value) in self.pins.iter().zip(&self.values) {
            let level = read_level(value).map_err(|source| InputError::Read { pin: *pin, source })?;
            levels.push(level);
        }
        Ok(Sample::Levels(levels))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    fn fake_line(root: &Path, line: u32, level: &str) {
        let dir = root.join(format!("gpio{}", line));
        fs::create_dir_all(&dir).unwrap();
        fs::write(dir.join("direction"), "out").unwrap();
        fs::write(dir.join("value"), level).unwrap();
    }

    #[test]
    fn test_reads_levels_in_pin_order() {
        let root = TempDir::new().unwrap();
        fake_line(root.path(), 24, "0\n");
        fake_line(root.path(), 25, "1\n");

        let mut gpio = SysfsGpio::open(root.path(), &[25, 24], 0).unwrap();
        assert_eq!(gpio.read().unwrap(), Sample::Levels(vec![true, false]));
        assert_eq!(
            fs::read_to_string(root.path().join("gpio24/direction")).unwrap(),
            "in"
        );

        fs::write(root.path().join("gpio24/value"), "1\n").unwrap();
        assert_eq!(gpio.read().unwrap(), Sample::Levels(vec![true, true]));
    }

    #[test]
    fn test_offset_selects_line() {
        let root = TempDir::new().unwrap();
        fake_line(root.path(), 536, "1");
        let mut gpio = SysfsGpio::open(root.path(), &[24], 512).unwrap();
        assert_eq!(gpio.pins(), &[24]);
        assert_eq!(gpio.read().unwrap(), Sample::Levels(vec![true]));
    }

    #[test]
    fn test_missing_root_is_unavailable() {
        let root = TempDir::new().unwrap();
        let err = SysfsGpio::open(root.path().join("nope"), &[24], 0).unwrap_err();
        assert!(matches!(err, InputError::Unavailable(_)));
    }

    #[test]
    fn test_no_pins() {
        let root = TempDir::new().unwrap();
        assert!(matches!(
            SysfsGpio::open(root.path(), &[], 0),
            Err(InputError::NoLines)
        ));
    }

    #[test]
    fn test_unexportable_pin_fails_setup() {
        let root = TempDir::new().unwrap();
        // No export file and no gpio dir: the export write creates a plain
        // file but the line never appears.
        let err = SysfsGpio::open(root.path(), &[4], 0).unwrap_err();
        assert!(matches!(err, InputError::Setup { pin: 4, .. }));
    }
}
