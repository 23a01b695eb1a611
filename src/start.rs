//! Container start: agent injection, network namespace setup, the re-exec
//! launch and the slirp attach, with cleanup funneled on every failure
//! path past namespace creation.

use std::fs::{self, DirBuilder};
use std::os::unix::fs::{DirBuilderExt, PermissionsExt};
use std::path::Path;

use clap::Args;

use crate::container::state::{ContainerRecord, PRIVATE};
use crate::container::{discovery, identity};
use crate::error::{Error, Result};
use crate::home::AppHome;
use crate::launch::{self, PTY_AGENT_PATH};
use crate::netns::NetworkNamespace;
use crate::stdio::{self, Mode};

/// How long the slirp attach path waits for the child's liveness marker.
const PID_WAIT_ATTEMPTS: u32 = 15;

#[derive(Args, Debug)]
pub struct Start {
    /// Name or ID of the container.
    pub container: String,
    /// Keep stdin open and forward stdio.
    #[arg(short, long)]
    pub interactive: bool,
    /// Allocate a pseudoterminal.
    #[arg(short, long)]
    pub tty: bool,
}

impl Start {
    pub fn exec(&self, home: &AppHome) -> Result<()> {
        let record = ContainerRecord::load(&identity::config_path(home, &self.container))?;

        if discovery::is_running(home, &record.names) {
            return Err(Error::InvalidInput(format!(
                "container {} is already running",
                record.names
            )));
        }

        start(home, self.interactive, self.tty, record)
    }
}

/// Runs the start protocol against a loaded record.
pub fn start(home: &AppHome, interactive: bool, tty: bool, record: ContainerRecord) -> Result<()> {
    let container_dir = home.containers_dir().join(&record.id);
    let rootfs = container_dir.join("rootfs");

    inject_pty_agent(home, &rootfs)?;

    // The namespace must exist before the child is spawned so the child
    // inherits it; everything after this point funnels into cleanup.
    let mut ns = if record.network == PRIVATE {
        let mut ns = NetworkNamespace::new(&record.id)?;
        ns.setup()?;
        Some(ns)
    } else {
        None
    };

    let result = launch_child(home, interactive, tty, &record, ns.as_mut());

    match result {
        Ok(Some(status)) => {
            // Foreground run ended; the namespace has no holder left.
            if let Some(mut ns) = ns {
                if let Err(e) = ns.cleanup() {
                    log::warn!("network cleanup after exit: {}", e);
                }
            }
            log::debug!("container {} exited with {}", record.names, status);
            Ok(())
        }
        Ok(None) => Ok(()),
        Err(e) => {
            if let Some(mut ns) = ns {
                if let Err(cleanup_err) = ns.cleanup() {
                    log::warn!("network cleanup after failed start: {}", cleanup_err);
                }
            }
            Err(e)
        }
    }
}

fn launch_child(
    home: &AppHome,
    interactive: bool,
    tty: bool,
    record: &ContainerRecord,
    ns: Option<&mut NetworkNamespace>,
) -> Result<Option<std::process::ExitStatus>> {
    let mut cmd = launch::enter_command(home, record, launch::rootful_override())?;
    if tty {
        cmd.arg("--tty");
    }

    let mode = if tty {
        Mode::Tty
    } else if interactive {
        Mode::Interactive
    } else {
        Mode::Detached(home.containers_dir().join(&record.id).join("current-logs"))
    };

    let mut spawned = stdio::spawn(cmd, mode, "container child")?;

    // The transport can only attach once a process holds the namespace,
    // which the liveness marker proves.
    if let Some(ns) = ns {
        let pid = match discovery::wait_for_pid(home, &record.id, PID_WAIT_ATTEMPTS) {
            Ok(pid) => pid,
            Err(e) => {
                spawned.abort();
                return Err(e);
            }
        };
        if let Err(e) = ns.start_slirp(&home.bin_dir().join("slirp4netns"), pid) {
            spawned.abort();
            return Err(e);
        }
    }

    spawned.finish()
}

/// Places the PTY agent inside the rootfs if it is not there yet.
fn inject_pty_agent(home: &AppHome, rootfs: &Path) -> Result<()> {
    let source = home.bin_dir().join("pty");
    let agent = fs::read(&source).map_err(|e| match e.kind() {
        std::io::ErrorKind::NotFound => {
            Error::NotFound(format!("pty agent binary missing at {}", source.display()))
        }
        _ => Error::Io(e),
    })?;

    let target = rootfs.join(PTY_AGENT_PATH.trim_start_matches('/'));
    if !target.exists() {
        log::debug!("injecting pty agent at {}", target.display());
        if let Some(parent) = target.parent() {
            DirBuilder::new().recursive(true).mode(0o755).create(parent)?;
        }
        fs::write(&target, agent)?;
        fs::set_permissions(&target, fs::Permissions::from_mode(0o755))?;
    }

    if !target.exists() {
        return Err(Error::Internal(format!(
            "pty agent did not land at {}",
            target.display()
        )));
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn injection_lands_agent_with_exec_bits() {
        let tmp = tempfile::tempdir().unwrap();
        let home = AppHome::at(tmp.path());
        fs::create_dir_all(home.bin_dir()).unwrap();
        fs::write(home.bin_dir().join("pty"), b"#!agent").unwrap();

        let rootfs = tmp.path().join("rootfs");
        fs::create_dir_all(&rootfs).unwrap();
        inject_pty_agent(&home, &rootfs).unwrap();

        let target = rootfs.join("usr/libexec/vessel-pty");
        assert_eq!(fs::read(&target).unwrap(), b"#!agent");
        assert_eq!(
            fs::metadata(&target).unwrap().permissions().mode() & 0o777,
            0o755
        );

        // A second start must not rewrite the agent.
        fs::write(home.bin_dir().join("pty"), b"#!other").unwrap();
        inject_pty_agent(&home, &rootfs).unwrap();
        assert_eq!(fs::read(&target).unwrap(), b"#!agent");
    }

    #[test]
    fn injection_without_agent_binary_fails() {
        let tmp = tempfile::tempdir().unwrap();
        let home = AppHome::at(tmp.path());
        let rootfs = tmp.path().join("rootfs");
        fs::create_dir_all(&rootfs).unwrap();
        let err = inject_pty_agent(&home, &rootfs).unwrap_err();
        assert!(matches!(err, Error::NotFound(_)));
    }
}
