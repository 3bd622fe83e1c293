//! On-disk invariants of the frame store and the saved archive ring.

use std::fs;
use std::path::Path;
use std::time::{Duration, Instant};

use stopmo_kiosk::archive::{SaveOutcome, SavedArchive};
use stopmo_kiosk::capture::{CaptureError, FrameGrabber};
use stopmo_kiosk::frames::FrameStore;
use tempfile::TempDir;

struct Label(String);

impl FrameGrabber for Label {
    fn grab(&mut self, target: &Path) -> Result<(), CaptureError> {
        fs::write(target, &self.0)?;
        Ok(())
    }
}

fn assert_dense(store: &FrameStore) {
    let expected: Vec<usize> = (0..store.count()).collect();
    assert_eq!(store.ordinals_on_disk().unwrap(), expected);
}

#[test]
fn test_capture_and_erase_keep_ordinals_dense() {
    let dir = TempDir::new().unwrap();
    let mut store = FrameStore::open(dir.path(), "jpg").unwrap();

    // A fixed interleaving of captures and erases at the front, middle and end.
    let script: &[(bool, usize)] = &[
        (true, 0),
        (true, 0),
        (true, 0),
        (false, 0),
        (true, 0),
        (true, 0),
        (false, 2),
        (false, 2),
        (true, 0),
        (false, 0),
        (false, 0),
        (false, 0),
        (true, 0),
    ];
    let mut serial = 0;
    for &(capture, ordinal) in script {
        if capture {
            store.capture(&mut Label(serial.to_string())).unwrap();
            serial += 1;
        } else {
            store.erase(ordinal).unwrap();
        }
        assert_dense(&store);
    }
    assert_eq!(store.count(), 1);
}

#[test]
fn test_erase_preserves_order_of_survivors() {
    let dir = TempDir::new().unwrap();
    let mut store = FrameStore::open(dir.path(), "jpg").unwrap();
    for label in ["a", "b", "c", "d", "e"] {
        store.capture(&mut Label(label.into())).unwrap();
    }
    store.erase(0).unwrap();
    store.erase(2).unwrap();

    let survivors: Vec<String> = store
        .frame_paths()
        .iter()
        .map(|p| fs::read_to_string(p).unwrap())
        .collect();
    assert_eq!(survivors, vec!["b", "c", "e"]);
}

#[test]
fn test_full_cursor_cycle_returns_to_start() {
    let dir = TempDir::new().unwrap();
    let mut store = FrameStore::open(dir.path(), "jpg").unwrap();
    for count in 1..=6 {
        store.capture(&mut Label(count.to_string())).unwrap();
        let start = store.cursor();
        for _ in 0..count {
            store.advance_cursor(1);
        }
        assert_eq!(store.cursor(), start, "forward cycle with {count} frames");
        for _ in 0..count {
            store.advance_cursor(-1);
        }
        assert_eq!(store.cursor(), start, "backward cycle with {count} frames");
    }
}

#[test]
fn test_reopen_after_interrupted_renumber() {
    let dir = TempDir::new().unwrap();
    {
        let mut store = FrameStore::open(dir.path(), "jpg").unwrap();
        for label in ["a", "b", "c"] {
            store.capture(&mut Label(label.into())).unwrap();
        }
    }
    // Simulate a crash between the delete and the renames of an erase.
    fs::remove_file(dir.path().join("Frame00000.jpg")).unwrap();

    let store = FrameStore::open(dir.path(), "jpg").unwrap();
    assert_eq!(store.count(), 2);
    assert_dense(&store);
    assert_eq!(fs::read_to_string(store.frame_path(0)).unwrap(), "b");
}

#[test]
fn test_ring_keeps_max_saved_and_evicts_oldest() {
    const MAX_SAVED: usize = 25;
    let root = TempDir::new().unwrap();
    let mut frames = FrameStore::open(root.path().join("Frames"), "jpg").unwrap();
    let mut archive = SavedArchive::open(
        root.path().join("Saved"),
        "jpg",
        MAX_SAVED,
        Duration::from_secs(30),
        false,
    )
    .unwrap();

    let mut now = Instant::now();
    for n in 0..=MAX_SAVED {
        frames.reset().unwrap();
        frames.capture(&mut Label(format!("save-{n}"))).unwrap();
        let outcome = archive.save(&frames, now).unwrap();
        assert_eq!(
            outcome,
            SaveOutcome::Saved {
                frames: 1,
                evicted: n == MAX_SAVED
            }
        );
        now += Duration::from_secs(30);
    }

    assert_eq!(archive.occupied(), MAX_SAVED);
    let expected: Vec<usize> = (0..MAX_SAVED).collect();
    assert_eq!(archive.slots_on_disk().unwrap(), expected);

    let newest = fs::read_to_string(archive.preview(0).unwrap()).unwrap();
    assert_eq!(newest, format!("save-{MAX_SAVED}"));
    let oldest = fs::read_to_string(archive.preview(MAX_SAVED as isize - 1).unwrap()).unwrap();
    assert_eq!(oldest, "save-1");
    for slot in 0..MAX_SAVED {
        let text = fs::read_to_string(archive.preview(slot as isize).unwrap()).unwrap();
        assert_ne!(text, "save-0");
    }
}

#[test]
fn test_reopened_archive_allows_immediate_save() {
    let root = TempDir::new().unwrap();
    let mut frames = FrameStore::open(root.path().join("Frames"), "jpg").unwrap();
    frames.capture(&mut Label("x".into())).unwrap();
    let saved = root.path().join("Saved");
    {
        let mut archive =
            SavedArchive::open(&saved, "jpg", 5, Duration::from_secs(30), false).unwrap();
        archive.save(&frames, Instant::now()).unwrap();
    }
    // The cooldown is per run; a fresh start may save immediately.
    let mut archive = SavedArchive::open(&saved, "jpg", 5, Duration::from_secs(30), false).unwrap();
    assert_eq!(archive.occupied(), 1);
    assert!(matches!(
        archive.save(&frames, Instant::now()).unwrap(),
        SaveOutcome::Saved { .. }
    ));
    assert_eq!(archive.occupied(), 2);
}
