//! Keyboard stand-in for the button panel, for bench testing without GPIO.
//!
//! Number keys select a line by position: `1`..`9` are lines 0..8 and `0`
//! is line 9. Each keystroke is one press.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::mpsc::{self, Receiver, TryRecvError};
use std::sync::Arc;
use std::thread;

use rdev::{listen, Event, EventType, Key};

use super::{InputError, InputLines, Sample};

/// Line index selected by a key, if any.
pub fn key_index(key: Key) -> Option<usize> {
    match key {
        Key::Num1 | Key::Kp1 => Some(0),
        Key::Num2 | Key::Kp2 => Some(1),
        Key::Num3 | Key::Kp3 => Some(2),
        Key::Num4 | Key::Kp4 => Some(3),
        Key::Num5 | Key::Kp5 => Some(4),
        Key::Num6 | Key::Kp6 => Some(5),
        Key::Num7 | Key::Kp7 => Some(6),
        Key::Num8 | Key::Kp8 => Some(7),
        Key::Num9 | Key::Kp9 => Some(8),
        Key::Num0 | Key::Kp0 => Some(9),
        _ => None,
    }
}

pub struct KeyboardInput {
    presses: Receiver<usize>,
    stop_flag: Arc<AtomicBool>,
}

impl KeyboardInput {
    /// Start a global key listener. Keys selecting an index at or beyond
    /// `lines` are ignored.
    pub fn start(lines: usize) -> Result<Self, InputError> {
        if lines == 0 {
            return Err(InputError::NoLines);
        }
        let (tx, rx) = mpsc::channel();
        let stop_flag = Arc::new(AtomicBool::new(false));
        let listener_stop = stop_flag.clone();

        thread::Builder::new()
            .name("keyboard-input".into())
            .spawn(move || {
                let callback = move |event: Event| {
                    if listener_stop.load(Ordering::SeqCst) {
                        return;
                    }
                    if let EventType::KeyPress(key) = event.event_type {
                        if let Some(index) = key_index(key).filter(|i| *i < lines) {
                            log::debug!("Key {:?} -> line {}", key, index);
                            let _ = tx.send(index);
                        }
                    }
                };
                // Blocks for the life of the process. The sender is dropped
                // if the listener fails, which surfaces as Disconnected.
                if let Err(e) = listen(callback) {
                    log::error!("Keyboard listener error: {:?}", e);
                }
            })
            .map_err(|e| InputError::Unavailable(format!("keyboard listener: {}", e)))?;

        log::info!("Using keyboard input for {} buttons", lines.min(10));
        Ok(Self::from_channel(rx, stop_flag))
    }

    /// Wrap an existing channel of line indices.
    pub fn from_channel(presses: Receiver<usize>, stop_flag: Arc<AtomicBool>) -> Self {
        Self { presses, stop_flag }
    }
}

impl InputLines for KeyboardInput {
    fn read(&mut self) -> Result<Sample, InputError> {
        match self.presses.try_recv() {
            Ok(index) => Ok(Sample::Index(Some(index))),
            Err(TryRecvError::Empty) => Ok(Sample::Index(None)),
            Err(TryRecvError::Disconnected) => Err(InputError::Disconnected),
        }
    }

    fn is_discrete(&self) -> bool {
        true
    }
}

impl Drop for KeyboardInput {
    fn drop(&mut self) {
        // rdev has no way to end listen(); the flag stops it forwarding keys.
        self.stop_flag.store(true, Ordering::SeqCst);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_number_keys_map_by_position() {
        assert_eq!(key_index(Key::Num1), Some(0));
        assert_eq!(key_index(Key::Num9), Some(8));
        assert_eq!(key_index(Key::Num0), Some(9));
        assert_eq!(key_index(Key::Kp4), Some(3));
        assert_eq!(key_index(Key::KeyA), None);
    }

    #[test]
    fn test_reads_one_press_per_key() {
        let (tx, rx) = mpsc::channel();
        let mut input = KeyboardInput::from_channel(rx, Arc::new(AtomicBool::new(false)));
        assert!(input.is_discrete());
        assert_eq!(input.read().unwrap(), Sample::Index(None));

        tx.send(3).unwrap();
        tx.send(0).unwrap();
        assert_eq!(input.read().unwrap(), Sample::Index(Some(3)));
        assert_eq!(input.read().unwrap(), Sample::Index(Some(0)));
        assert_eq!(input.read().unwrap(), Sample::Index(None));
    }

    #[test]
    fn test_dropped_listener_is_disconnected() {
        let (tx, rx) = mpsc::channel::<usize>();
        let mut input = KeyboardInput::from_channel(rx, Arc::new(AtomicBool::new(false)));
        drop(tx);
        assert!(matches!(input.read(), Err(InputError::Disconnected)));
    }
}
