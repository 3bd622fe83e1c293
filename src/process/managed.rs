//! Background processes the controller must eventually stop.

use std::fmt;
use std::os::unix::process::CommandExt;
use std::process::{Child, Stdio};

use serde::{Deserialize, Serialize};

use super::control::{ProcessControl, SystemControl};
use super::registry::SharedPidRegistry;
use super::ProcessError;
use crate::command::LaunchSpec;

/// The two kinds of background execution. At most one of each runs at a time.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ProcessKind {
    /// Continuous live camera preview.
    Preview,
    /// Slideshow playback or a single still shown by the viewer.
    Playback,
}

impl ProcessKind {
    pub const ALL: [ProcessKind; 2] = [ProcessKind::Preview, ProcessKind::Playback];

    /// Registry slot owned by this kind.
    pub fn slot(self) -> usize {
        match self {
            ProcessKind::Preview => 0,
            ProcessKind::Playback => 1,
        }
    }
}

impl fmt::Display for ProcessKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ProcessKind::Preview => f.write_str("preview"),
            ProcessKind::Playback => f.write_str("playback"),
        }
    }
}

/// How a kind's process is located when it has to be stopped.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum TerminationStrategy {
    /// Signal the pid held in the registry slot.
    #[default]
    KillDirectChildId,
    /// Signal the registry pid, then also every process whose command name
    /// matches, for tools whose direct child hands off to another process.
    KillByCommandNameScan,
}

/// Per-kind stop policy.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct KindPolicy {
    pub strategy: TerminationStrategy,
    /// Command-name substring used by the scan strategy.
    pub process_name: String,
}

impl KindPolicy {
    pub fn direct() -> Self {
        Self {
            strategy: TerminationStrategy::KillDirectChildId,
            process_name: String::new(),
        }
    }

    pub fn scan(process_name: impl Into<String>) -> Self {
        Self {
            strategy: TerminationStrategy::KillByCommandNameScan,
            process_name: process_name.into(),
        }
    }
}

/// One running background process.
#[derive(Debug)]
pub struct ManagedProcess {
    pub kind: ProcessKind,
    pub launch: LaunchSpec,
    pub strategy: TerminationStrategy,
    child: Child,
}

impl ManagedProcess {
    pub fn direct_child_id(&self) -> u32 {
        self.child.id()
    }

    /// Kill (if needed) and reap the direct child.
    fn reap(&mut self) {
        match self.child.try_wait() {
            Ok(Some(_)) => {}
            _ => {
                let _ = self.child.kill();
                let _ = self.child.wait();
            }
        }
    }
}

/// Result of a stop: which pids actually received a signal.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StopReport {
    pub kind: ProcessKind,
    pub signalled: Vec<u32>,
}

impl StopReport {
    pub fn was_running(&self) -> bool {
        !self.signalled.is_empty()
    }
}

/// Starts and stops the preview and playback processes.
///
/// The registry slot for a kind holds the pid of its direct child from the
/// moment the child execs until `stop` clears it. The child stays unreaped
/// until then, so the pid in the slot cannot be recycled by the OS.
pub struct ProcessManager<C: ProcessControl = SystemControl> {
    registry: SharedPidRegistry,
    running: [Option<ManagedProcess>; 2],
    policies: [KindPolicy; 2],
    control: C,
}

impl ProcessManager<SystemControl> {
    pub fn system(preview: KindPolicy, playback: KindPolicy) -> Result<Self, ProcessError> {
        Self::new(SystemControl, preview, playback)
    }
}

impl<C: ProcessControl> ProcessManager<C> {
    /// Allocate the shared registry. Must happen before any process is started.
    pub fn new(
        control: C,
        preview: KindPolicy,
        playback: KindPolicy,
    ) -> Result<Self, ProcessError> {
        Ok(Self {
            registry: SharedPidRegistry::allocate(ProcessKind::ALL.len())?,
            running: [None, None],
            policies: [preview, playback],
            control,
        })
    }

    pub fn control(&self) -> &C {
        &self.control
    }

    pub fn policy(&self, kind: ProcessKind) -> &KindPolicy {
        &self.policies[kind.slot()]
    }

    /// Pid currently published for `kind`.
    pub fn registered_pid(&self, kind: ProcessKind) -> Option<u32> {
        self.registry.get(kind.slot())
    }

    /// Launch `launch` as the single process of `kind`, stopping any
    /// previous one first.
    ///
    /// On failure the slot is left at the sentinel and nothing is running.
    pub fn start(&mut self, kind: ProcessKind, launch: LaunchSpec) -> Result<u32, ProcessError> {
        self.stop(kind);

        let slot = kind.slot();
        let writer = self
            .registry
            .writer(slot)
            .ok_or(ProcessError::NoSlot { kind })?;

        let mut cmd = launch.to_command();
        cmd.stdin(Stdio::null())
            .stdout(Stdio::null())
            .stderr(Stdio::null());
        // SAFETY: publish_self is async-signal-safe (getpid + atomic store).
        unsafe {
            cmd.pre_exec(move || {
                writer.publish_self();
                Ok(())
            });
        }

        let child = match cmd.spawn() {
            Ok(child) => child,
            Err(source) => {
                self.registry.clear(slot);
                return Err(ProcessError::Spawn {
                    kind,
                    program: launch.program.clone(),
                    source,
                });
            }
        };

        // spawn() only returns once exec succeeded, so the child has run
        // its pre-exec hook. Record the pid ourselves if it somehow did not.
        let pid = child.id();
        if self.registry.get(slot) != Some(pid) {
            log::debug!("{} slot not published by child, recording pid {}", kind, pid);
            self.registry.set(slot, pid);
        }

        log::info!("Started {} process {}: {}", kind, pid, launch);
        let strategy = self.policy(kind).strategy;
        self.running[slot] = Some(ManagedProcess {
            kind,
            launch,
            strategy,
            child,
        });
        Ok(pid)
    }

    /// Stop the process of `kind`. Stopping something that is not running
    /// (or already exited) succeeds and changes nothing.
    ///
    /// A pid that cannot be signalled is logged and skipped. The direct child
    /// is always reaped and the slot always cleared, so the next `start` of
    /// this kind is never blocked by a process we do not own.
    pub fn stop(&mut self, kind: ProcessKind) -> StopReport {
        let slot = kind.slot();
        let policy = self.policy(kind).clone();
        let mut signalled = Vec::new();

        if let Some(pid) = self.registry.get(slot) {
            if self.signal(pid) {
                log::debug!("Killed {} pid {}", kind, pid);
                signalled.push(pid);
            }
        }

        if policy.strategy == TerminationStrategy::KillByCommandNameScan {
            for pid in self.control.find_by_name(&policy.process_name) {
                if signalled.contains(&pid) {
                    continue;
                }
                if self.signal(pid) {
                    log::info!("Killing {} pid {}", policy.process_name, pid);
                    signalled.push(pid);
                }
            }
        }

        if let Some(mut process) = self.running[slot].take() {
            process.reap();
        }
        self.registry.clear(slot);

        StopReport { kind, signalled }
    }

    /// Kill every process whose command name matches `name`, regardless of
    /// kind. Used at shutdown for tools that may have outlived their slot.
    pub fn kill_by_name(&self, name: &str) -> Vec<u32> {
        let mut signalled = Vec::new();
        for pid in self.control.find_by_name(name) {
            if self.signal(pid) {
                log::info!("Killing {} pid {}", name, pid);
                signalled.push(pid);
            }
        }
        signalled
    }

    fn signal(&self, pid: u32) -> bool {
        match self.control.kill(pid) {
            Ok(delivered) => delivered,
            Err(e) => {
                log::warn!("Cannot signal pid {}: {}", pid, e);
                false
            }
        }
    }

    /// Whether the process of `kind` is still alive. An exited process is
    /// reaped and its slot reset.
    pub fn is_running(&mut self, kind: ProcessKind) -> bool {
        let slot = kind.slot();
        let exited = match self.running[slot].as_mut() {
            None => return false,
            Some(process) => match process.child.try_wait() {
                Ok(None) => false,
                Ok(Some(status)) => {
                    log::debug!("{} process {} exited: {}", kind, process.child.id(), status);
                    true
                }
                Err(e) => {
                    log::warn!("Could not query {} process: {}", kind, e);
                    false
                }
            },
        };
        if exited {
            self.running[slot] = None;
            self.registry.clear(slot);
            return false;
        }
        true
    }

    pub fn running(&self, kind: ProcessKind) -> Option<&ManagedProcess> {
        self.running[kind.slot()].as_ref()
    }

    pub fn stop_all(&mut self) {
        for kind in ProcessKind::ALL {
            self.stop(kind);
        }
    }
}

impl<C: ProcessControl> Drop for ProcessManager<C> {
    fn drop(&mut self) {
        // Only our own children; name scans are reserved for explicit stops.
        for kind in ProcessKind::ALL {
            if let Some(mut process) = self.running[kind.slot()].take() {
                process.reap();
            }
            self.registry.clear(kind.slot());
        }
    }
}
