//! Signal delivery and process enumeration.

use std::io;

use sysinfo::{ProcessRefreshKind, ProcessesToUpdate, System, UpdateKind};

/// How the controller reaches processes it cannot hold a handle to.
pub trait ProcessControl {
    /// Forcefully terminate `pid`.
    ///
    /// Returns `Ok(true)` if a signal was delivered and `Ok(false)` if no such
    /// process exists. A missing process is never an error.
    fn kill(&self, pid: u32) -> io::Result<bool>;

    /// Pids of running processes whose command name or command line contains
    /// `pattern`. Never includes the calling process.
    fn find_by_name(&self, pattern: &str) -> Vec<u32>;
}

/// SIGKILL via libc and a process table read via sysinfo.
#[derive(Debug, Default, Clone, Copy)]
pub struct SystemControl;

impl ProcessControl for SystemControl {
    fn kill(&self, pid: u32) -> io::Result<bool> {
        // pid 0 and negative pids address process groups.
        let pid = match libc::pid_t::try_from(pid) {
            Ok(pid) if pid > 0 => pid,
            _ => return Ok(false),
        };

        // SAFETY: plain syscall on a positive pid.
        let rc = unsafe { libc::kill(pid, libc::SIGKILL) };
        if rc == 0 {
            return Ok(true);
        }
        let err = io::Error::last_os_error();
        if err.raw_os_error() == Some(libc::ESRCH) {
            Ok(false)
        } else {
            Err(err)
        }
    }

    fn find_by_name(&self, pattern: &str) -> Vec<u32> {
        if pattern.trim().is_empty() {
            return Vec::new();
        }

        let mut sys = System::new();
        sys.refresh_processes_specifics(
            ProcessesToUpdate::All,
            true,
            ProcessRefreshKind::nothing().with_cmd(UpdateKind::Always),
        );

        let own = std::process::id();
        let mut pids: Vec<u32> = sys
            .processes()
            .iter()
            .filter(|(pid, _)| pid.as_u32() != own)
            .filter(|(_, process)| {
                let name = process.name().to_string_lossy();
                if name.contains(pattern) {
                    return true;
                }
                let cmdline = process
                    .cmd()
                    .iter()
                    .map(|part| part.to_string_lossy())
                    .collect::<Vec<_>>()
                    .join(" ");
                command_matches(&cmdline, pattern)
            })
            .map(|(pid, _)| pid.as_u32())
            .collect();
        pids.sort_unstable();
        pids
    }
}

/// Match against the program part of a command line only, so that an
/// unrelated process that merely mentions the name in an argument (an editor
/// open on `feh.conf`, say) is left alone.
pub fn command_matches(cmdline: &str, pattern: &str) -> bool {
    cmdline
        .split_whitespace()
        .next()
        .map(|program| {
            let base = program.rsplit('/').next().unwrap_or(program);
            base.contains(pattern)
        })
        .unwrap_or(false)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::process::Command;

    #[test]
    fn test_kill_missing_process_is_not_an_error() {
        let mut child = Command::new("true").spawn().unwrap();
        let pid = child.id();
        child.wait().unwrap();
        assert!(!SystemControl.kill(pid).unwrap());
    }

    #[test]
    fn test_kill_refuses_group_pids() {
        assert!(!SystemControl.kill(0).unwrap());
    }

    #[test]
    fn test_kill_running_child() {
        let mut child = Command::new("sleep").arg("30").spawn().unwrap();
        assert!(SystemControl.kill(child.id()).unwrap());
        let status = child.wait().unwrap();
        assert!(!status.success());
    }

    #[test]
    fn test_command_matches_program_basename() {
        assert!(command_matches("/usr/bin/feh --quiet Frames", "feh"));
        assert!(command_matches("libcamera-vid -t 0", "libcamera-vid"));
        assert!(!command_matches("vim feh.conf", "feh"));
        assert!(!command_matches("", "feh"));
    }

    #[test]
    fn test_find_by_name_ignores_empty_pattern() {
        assert!(SystemControl.find_by_name("").is_empty());
        assert!(SystemControl.find_by_name("   ").is_empty());
    }
}
