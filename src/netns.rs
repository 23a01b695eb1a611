//! Per-container network namespace lifecycle.
//!
//! The namespace is pinned by bind-mounting `/proc/self/ns/net` onto a
//! well-known file instead of holding a descriptor: the short-lived parent
//! exits, and both the container child and slirp4netns find the namespace
//! by path. Teardown is best-effort and aggregates every sub-error so a
//! partial failure never strands the rest of the resources.

use std::fs::{self, DirBuilder, File};
use std::os::unix::fs::DirBuilderExt;
use std::path::{Path, PathBuf};
use std::process::{Child, Command};

use nix::mount::{mount, umount2, MntFlags, MsFlags};
use nix::sched::{setns, unshare, CloneFlags};
use nix::sys::signal::{kill, Signal};
use nix::unistd::{geteuid, Pid};

use crate::error::{Error, Result};

const SLIRP_MTU: &str = "--mtu=65520";
const SLIRP_INTERFACE: &str = "tap0";

pub struct NetworkNamespace {
    container_id: String,
    runtime_dir: PathBuf,
    netns_path: PathBuf,
    api_socket: PathBuf,
    slirp: Option<Child>,
}

impl NetworkNamespace {
    /// Allocates the runtime directory and computes paths. No kernel work
    /// happens until `setup`.
    pub fn new(container_id: &str) -> Result<Self> {
        Self::at(&runtime_base(), container_id)
    }

    pub fn at(base: &Path, container_id: &str) -> Result<Self> {
        let runtime_dir = base.join(container_id);
        DirBuilder::new()
            .recursive(true)
            .mode(0o700)
            .create(&runtime_dir)?;

        Ok(Self {
            container_id: container_id.to_string(),
            netns_path: runtime_dir.join("netns"),
            api_socket: runtime_dir.join("slirp.sock"),
            runtime_dir,
            slirp: None,
        })
    }

    pub fn netns_path(&self) -> &Path {
        &self.netns_path
    }

    /// Creates the network namespace and pins it.
    ///
    /// The caller process itself is moved into the new namespace; the child
    /// it spawns afterwards inherits it, and the bind mount keeps the
    /// namespace alive after both exit.
    pub fn setup(&mut self) -> Result<()> {
        log::debug!("creating network namespace for {}", self.container_id);
        unshare(CloneFlags::CLONE_NEWNET).map_err(|e| Error::kernel("unshare(CLONE_NEWNET)", e))?;

        // An empty regular file is the bind-mount target.
        fs::write(&self.netns_path, b"")?;

        if let Err(e) = mount(
            Some("/proc/self/ns/net"),
            &self.netns_path,
            None::<&str>,
            MsFlags::MS_BIND,
            None::<&str>,
        ) {
            let _ = fs::remove_file(&self.netns_path);
            return Err(Error::kernel("bind mount of network namespace", e));
        }

        Ok(())
    }

    /// Spawns the userspace transport against the namespace holder.
    ///
    /// Does not wait; the handle is retained so `cleanup` can reap it. The
    /// target PID must already be inside the pinned namespace.
    pub fn start_slirp(&mut self, slirp_binary: &Path, target_pid: Pid) -> Result<()> {
        if !slirp_binary.exists() {
            return Err(Error::NotFound(format!(
                "slirp4netns binary not found at {}",
                slirp_binary.display()
            )));
        }

        log::debug!(
            "starting {} for pid {}",
            slirp_binary.display(),
            target_pid
        );
        let child = Command::new(slirp_binary)
            .arg("--configure")
            .arg(SLIRP_MTU)
            .arg("-r")
            .arg("/etc/resolv.conf")
            .arg("-a")
            .arg(&self.api_socket)
            .arg(target_pid.to_string())
            .arg(SLIRP_INTERFACE)
            .spawn()
            .map_err(|e| Error::launch("slirp4netns", e))?;

        self.slirp = Some(child);
        Ok(())
    }

    /// Tears down everything this namespace owns. Idempotent: every step
    /// tolerates the resource already being gone, and all failures are
    /// collected into one aggregate error.
    pub fn cleanup(&mut self) -> Result<()> {
        let mut errors = Vec::new();

        if let Some(mut slirp) = self.slirp.take() {
            let pid = Pid::from_raw(slirp.id() as i32);
            if let Err(e) = kill(pid, Signal::SIGTERM) {
                errors.push(Error::kernel("SIGTERM to slirp4netns", e));
                if let Err(e) = slirp.kill() {
                    errors.push(Error::launch("kill of slirp4netns", e));
                }
            }
            let _ = slirp.wait();
        }

        match umount2(&self.netns_path, MntFlags::empty()) {
            Ok(()) => {}
            // EINVAL: not a mount point; ENOENT: pin file already gone.
            Err(nix::errno::Errno::EINVAL) | Err(nix::errno::Errno::ENOENT) => {}
            Err(e) => errors.push(Error::kernel("unmount of network namespace", e)),
        }

        remove_if_present(&self.netns_path, &mut errors);
        remove_if_present(&self.api_socket, &mut errors);

        if let Err(e) = fs::remove_dir_all(&self.runtime_dir) {
            if e.kind() != std::io::ErrorKind::NotFound {
                errors.push(Error::Io(e));
            }
        }

        if errors.is_empty() {
            Ok(())
        } else {
            Err(Error::Cleanup(errors))
        }
    }
}

fn remove_if_present(path: &Path, errors: &mut Vec<Error>) {
    if let Err(e) = fs::remove_file(path) {
        if e.kind() != std::io::ErrorKind::NotFound {
            errors.push(Error::Io(e));
        }
    }
}

/// Joins a pinned network namespace and brings loopback up. Runs on the
/// child side before the rootfs swallows the view of the pin path.
pub fn enter_child(netns_path: &Path) -> Result<()> {
    let file = File::open(netns_path).map_err(|e| match e.kind() {
        std::io::ErrorKind::NotFound => Error::NotFound(format!(
            "pinned network namespace missing at {}",
            netns_path.display()
        )),
        _ => Error::Io(e),
    })?;

    setns(&file, CloneFlags::CLONE_NEWNET).map_err(|e| Error::kernel("setns(CLONE_NEWNET)", e))?;

    let status = Command::new("ip")
        .args(["link", "set", "lo", "up"])
        .status()
        .map_err(|e| Error::launch("ip link set lo up", e))?;
    if !status.success() {
        log::warn!("could not bring loopback up, status {}", status);
    }

    Ok(())
}

/// Runtime directory of a container's network namespace, whether or not it
/// exists yet.
pub fn runtime_dir_of(container_id: &str) -> PathBuf {
    runtime_base().join(container_id)
}

/// Path of the pinned namespace file for a container.
pub fn pin_path(container_id: &str) -> PathBuf {
    runtime_dir_of(container_id).join("netns")
}

/// Base of per-container runtime state: `$XDG_RUNTIME_DIR/vessel` or
/// `/run/user/<euid>/vessel`.
fn runtime_base() -> PathBuf {
    match std::env::var("XDG_RUNTIME_DIR") {
        Ok(dir) => PathBuf::from(dir).join("vessel"),
        Err(_) => PathBuf::from("/run/user")
            .join(geteuid().to_string())
            .join("vessel"),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn new_allocates_runtime_dir_with_paths() {
        let tmp = tempfile::tempdir().unwrap();
        let ns = NetworkNamespace::at(tmp.path(), "abc123").unwrap();
        assert!(tmp.path().join("abc123").is_dir());
        assert_eq!(ns.netns_path(), tmp.path().join("abc123/netns"));
        assert_eq!(ns.api_socket, tmp.path().join("abc123/slirp.sock"));
    }

    #[test]
    fn cleanup_is_idempotent() {
        let tmp = tempfile::tempdir().unwrap();
        let mut ns = NetworkNamespace::at(tmp.path(), "abc123").unwrap();
        // Simulate a partially set up namespace: pin file exists but was
        // never mounted, the socket never appeared.
        fs::write(ns.netns_path(), b"").unwrap();

        ns.cleanup().unwrap();
        assert!(!tmp.path().join("abc123").exists());

        // Second pass over already-removed state must still succeed.
        ns.cleanup().unwrap();
        assert!(!tmp.path().join("abc123").exists());
    }

    #[test]
    fn cleanup_reaps_slirp_handle() {
        let tmp = tempfile::tempdir().unwrap();
        let mut ns = NetworkNamespace::at(tmp.path(), "abc123").unwrap();
        ns.slirp = Some(
            Command::new("sleep")
                .arg("30")
                .spawn()
                .expect("spawn sleep"),
        );

        ns.cleanup().unwrap();
        assert!(ns.slirp.is_none());
        assert!(!tmp.path().join("abc123").exists());
    }

    #[test]
    fn missing_slirp_binary_is_not_found() {
        let tmp = tempfile::tempdir().unwrap();
        let mut ns = NetworkNamespace::at(tmp.path(), "abc123").unwrap();
        let err = ns
            .start_slirp(&tmp.path().join("no-such-binary"), Pid::from_raw(1))
            .unwrap_err();
        assert!(matches!(err, Error::NotFound(_)));
        ns.cleanup().unwrap();
    }
}
