//! Shared PID registry.
//!
//! A small block of pid slots mapped `MAP_SHARED | MAP_ANONYMOUS` before any
//! child is created, so that a freshly forked child can publish its own pid
//! from its side of the fork and the controller sees the write.

use std::io;
use std::ptr::{self, NonNull};
use std::sync::atomic::{AtomicI32, Ordering};

use super::ProcessError;

/// Sentinel stored in a slot with no running process.
pub const NO_PID: i32 = -1;

pub struct SharedPidRegistry {
    base: NonNull<AtomicI32>,
    slots: usize,
}

// The mapping is only ever accessed through atomics.
unsafe impl Send for SharedPidRegistry {}
unsafe impl Sync for SharedPidRegistry {}

impl SharedPidRegistry {
    /// Map `slots` pid slots and set every one to [`NO_PID`].
    pub fn allocate(slots: usize) -> Result<Self, ProcessError> {
        let slots = slots.max(1);
        let len = Self::byte_len(slots);

        // SAFETY: anonymous shared mapping, no fd, checked for MAP_FAILED.
        let ptr = unsafe {
            libc::mmap(
                ptr::null_mut(),
                len,
                libc::PROT_READ | libc::PROT_WRITE,
                libc::MAP_SHARED | libc::MAP_ANONYMOUS,
                -1,
                0,
            )
        };
        if ptr == libc::MAP_FAILED {
            return Err(ProcessError::RegistryAllocation(io::Error::last_os_error()));
        }
        let base = NonNull::new(ptr.cast::<AtomicI32>()).ok_or_else(|| {
            ProcessError::RegistryAllocation(io::Error::other("mmap returned null"))
        })?;

        let registry = Self { base, slots };
        for index in 0..slots {
            registry.clear(index);
        }
        Ok(registry)
    }

    fn byte_len(slots: usize) -> usize {
        slots * std::mem::size_of::<AtomicI32>()
    }

    fn slot(&self, index: usize) -> Option<&AtomicI32> {
        if index >= self.slots {
            return None;
        }
        // SAFETY: index is in bounds; the mapping is page aligned and lives
        // as long as self.
        Some(unsafe { &*self.base.as_ptr().add(index) })
    }

    pub fn len(&self) -> usize {
        self.slots
    }

    pub fn is_empty(&self) -> bool {
        self.slots == 0
    }

    /// Pid currently published in `index`, if any.
    pub fn get(&self, index: usize) -> Option<u32> {
        let raw = self.slot(index)?.load(Ordering::SeqCst);
        if raw > 0 {
            Some(raw as u32)
        } else {
            None
        }
    }

    pub fn set(&self, index: usize, pid: u32) {
        if let (Some(slot), Ok(pid)) = (self.slot(index), i32::try_from(pid)) {
            slot.store(pid, Ordering::SeqCst);
        }
    }

    pub fn clear(&self, index: usize) {
        if let Some(slot) = self.slot(index) {
            slot.store(NO_PID, Ordering::SeqCst);
        }
    }

    /// A handle that a child can use after fork to write its own pid.
    pub fn writer(&self, index: usize) -> Option<SlotWriter> {
        self.slot(index).map(|slot| SlotWriter {
            slot: slot as *const AtomicI32,
        })
    }
}

impl Drop for SharedPidRegistry {
    fn drop(&mut self) {
        // SAFETY: same pointer and length that mmap returned.
        unsafe {
            libc::munmap(self.base.as_ptr().cast(), Self::byte_len(self.slots));
        }
    }
}

/// Writes the calling process's pid into one registry slot.
///
/// Must not outlive the registry it came from.
#[derive(Clone, Copy)]
pub struct SlotWriter {
    slot: *const AtomicI32,
}

unsafe impl Send for SlotWriter {}
unsafe impl Sync for SlotWriter {}

impl SlotWriter {
    /// Publish `getpid()`. Async-signal-safe, so usable between fork and exec.
    pub fn publish_self(&self) {
        // SAFETY: getpid cannot fail; the slot points into a live mapping.
        unsafe {
            let pid = libc::getpid();
            (*self.slot).store(pid, Ordering::SeqCst);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::os::unix::process::CommandExt;
    use std::process::Command;

    #[test]
    fn test_new_registry_is_all_sentinel() {
        let registry = SharedPidRegistry::allocate(2).unwrap();
        assert_eq!(registry.len(), 2);
        assert_eq!(registry.get(0), None);
        assert_eq!(registry.get(1), None);
    }

    #[test]
    fn test_set_get_clear() {
        let registry = SharedPidRegistry::allocate(2).unwrap();
        registry.set(1, 4242);
        assert_eq!(registry.get(1), Some(4242));
        assert_eq!(registry.get(0), None);
        registry.clear(1);
        assert_eq!(registry.get(1), None);
    }

    #[test]
    fn test_out_of_range_slot_is_ignored() {
        let registry = SharedPidRegistry::allocate(1).unwrap();
        registry.set(5, 10);
        assert_eq!(registry.get(5), None);
        assert!(registry.writer(5).is_none());
    }

    #[test]
    fn test_child_publishes_its_own_pid_across_fork() {
        let registry = SharedPidRegistry::allocate(2).unwrap();
        let writer = registry.writer(0).unwrap();

        let mut cmd = Command::new("true");
        // SAFETY: publish_self only performs getpid and an atomic store.
        unsafe {
            cmd.pre_exec(move || {
                writer.publish_self();
                Ok(())
            });
        }
        let mut child = cmd.spawn().unwrap();
        let pid = child.id();
        child.wait().unwrap();

        assert_eq!(registry.get(0), Some(pid));
        assert_eq!(registry.get(1), None);
    }
}
