//! Container stop: SIGTERM with a bounded wait, escalating to SIGKILL.

use std::thread;
use std::time::Duration;

use clap::Args;
use nix::sys::signal::{kill, Signal};
use nix::unistd::Pid;

use crate::container::{discovery, identity};
use crate::error::{Error, Result};
use crate::home::AppHome;
use crate::netns::{self, NetworkNamespace};

#[derive(Args, Debug)]
pub struct Stop {
    /// Name or ID of the container.
    pub container: String,
    /// Kill immediately instead of terminating gracefully.
    #[arg(short, long)]
    pub force: bool,
    /// Seconds to wait for graceful termination before killing.
    #[arg(short, long, default_value_t = 10)]
    pub timeout: u32,
}

impl Stop {
    pub fn exec(&self, home: &AppHome) -> Result<()> {
        stop(home, &self.container, self.force, self.timeout)
    }
}

pub fn stop(home: &AppHome, container: &str, force: bool, timeout: u32) -> Result<()> {
    let pid = discovery::pid_of(home, container)?;
    log::debug!("stopping container {} with pid {}", container, pid);

    terminate(pid, force, timeout, || {
        discovery::pid_of(home, container).ok()
    })?;

    // A private-network container leaves its pinned namespace and runtime
    // directory behind once the process is gone.
    let id = identity::resolve(home, container);
    if netns::runtime_dir_of(&id).exists() {
        if let Err(e) = NetworkNamespace::new(&id)?.cleanup() {
            log::warn!("network cleanup after stop: {}", e);
        }
    }

    Ok(())
}

/// Signal escalation against a PID. `probe` re-resolves the PID between
/// polls; a probe failure means the process is disappearing and counts as
/// gone.
fn terminate<F>(pid: Pid, force: bool, mut timeout: u32, probe: F) -> Result<()>
where
    F: Fn() -> Option<Pid>,
{
    if force {
        return kill(pid, Signal::SIGKILL).map_err(|e| Error::kernel("SIGKILL", e));
    }

    kill(pid, Signal::SIGTERM).map_err(|e| Error::kernel("SIGTERM", e))?;

    loop {
        if timeout == 0 {
            log::warn!("timeout exceeded waiting for {}, force killing", pid);
            return kill(pid, Signal::SIGKILL).map_err(|e| Error::kernel("SIGKILL", e));
        }

        thread::sleep(Duration::from_secs(1));

        if probe().is_none() {
            return Ok(());
        }

        timeout -= 1;
    }
}

#[cfg(test)]
mod tests {
    use std::process::{Child, Command};

    use super::*;

    fn alive(child: &Child) -> bool {
        kill(Pid::from_raw(child.id() as i32), None).is_ok()
    }

    fn reap(mut child: Child) {
        let _ = child.wait();
    }

    #[test]
    fn sigterm_stops_a_cooperative_process() {
        let child = Command::new("sleep").arg("60").spawn().unwrap();
        let pid = Pid::from_raw(child.id() as i32);

        terminate(pid, false, 30, || {
            if alive(&child) {
                Some(pid)
            } else {
                None
            }
        })
        .unwrap();

        reap(child);
    }

    #[test]
    fn force_sends_a_single_kill() {
        let child = Command::new("sleep").arg("60").spawn().unwrap();
        let pid = Pid::from_raw(child.id() as i32);

        terminate(pid, true, 30, || None).unwrap();

        reap(child);
    }

    #[test]
    fn escalates_to_kill_after_timeout() {
        // A shell that ignores SIGTERM only dies from the escalation.
        let child = Command::new("sh")
            .args(["-c", "trap '' TERM; sleep 60"])
            .spawn()
            .unwrap();
        let pid = Pid::from_raw(child.id() as i32);

        terminate(pid, false, 2, || Some(pid)).unwrap();

        // SIGKILL cannot be ignored; the process must be gone shortly.
        let mut child = child;
        let status = child.wait().unwrap();
        assert!(!status.success());
    }

    #[test]
    fn stopping_a_stopped_container_reports_not_running() {
        let tmp = tempfile::tempdir().unwrap();
        let home = AppHome::at(tmp.path());
        let err = stop(&home, "ghost", false, 1).unwrap_err();
        assert!(matches!(err, Error::NotRunning(_)));
    }
}
