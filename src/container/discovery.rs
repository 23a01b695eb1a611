//! Live-container discovery by scanning the process table.
//!
//! A container is running iff some process has a
//! `/proc/<pid>/root/run/.containerenv` whose contents contain the
//! container ID. The marker is written by the namespaced child right after
//! it enters the rootfs; this module treats it as opaque.

use std::path::PathBuf;
use std::thread;
use std::time::Duration;

use nix::unistd::Pid;

use crate::container::identity;
use crate::error::{Error, Result};
use crate::home::AppHome;

/// Finds the PID of the process running the given container.
///
/// Processes that disappear or are unreadable mid-scan are skipped; at most
/// one container per ID is live by invariant, so the first match wins.
pub fn pid_of(home: &AppHome, container: &str) -> Result<Pid> {
    let id = identity::resolve(home, container);

    let processes = procfs::process::all_processes()
        .map_err(|e| Error::Internal(format!("cannot enumerate /proc: {}", e)))?;

    for prc in processes.flatten() {
        let marker = PathBuf::from("/proc")
            .join(prc.pid.to_string())
            .join("root/run/.containerenv");

        let Ok(data) = std::fs::read(&marker) else {
            continue;
        };

        if String::from_utf8_lossy(&data).contains(&id) {
            return Ok(Pid::from_raw(prc.pid));
        }
    }

    Err(Error::NotRunning(id))
}

pub fn is_running(home: &AppHome, container: &str) -> bool {
    pid_of(home, container).is_ok()
}

/// Polls for the container PID. The marker only appears once the child has
/// finished entering its rootfs, so the slirp attach path waits briefly for
/// it instead of failing on the race.
pub fn wait_for_pid(home: &AppHome, container: &str, attempts: u32) -> Result<Pid> {
    let mut last = Error::NotRunning(identity::resolve(home, container));
    for _ in 0..attempts {
        match pid_of(home, container) {
            Ok(pid) => return Ok(pid),
            Err(e) => last = e,
        }
        thread::sleep(Duration::from_millis(200));
    }
    Err(last)
}
