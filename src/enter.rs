//! Child side of the launch protocol: the hidden `enter` subcommand.
//!
//! The parent has already created the namespaces this process inherited.
//! What is left is the in-container setup: joining the pinned network
//! namespace, swapping the root, announcing liveness, dropping to the
//! configured user and exec'ing the entrypoint.

use std::ffi::CString;
use std::fs;

use clap::Args;
use nix::unistd::{self, Gid, Uid};

use crate::container::state::{ContainerRecord, PRIVATE};
use crate::error::{Error, Result};
use crate::home::AppHome;
use crate::launch::PTY_AGENT_PATH;
use crate::netns;
use crate::utils;

/// Internal namespace-entry command. Not user-facing; its `--config`
/// argument is the ABI between the launching parent and this child.
#[derive(Args, Debug)]
pub struct Enter {
    /// Serialized container record.
    #[arg(long)]
    config: String,
    /// Run the entrypoint under the injected PTY agent.
    #[arg(long)]
    tty: bool,
}

impl Enter {
    pub fn exec(&self, home: &AppHome) -> Result<()> {
        let record: ContainerRecord = serde_json::from_str(&self.config)
            .map_err(|e| Error::InvalidInput(format!("unreadable record: {}", e)))?;

        if record.entrypoint.is_empty() {
            return Err(Error::InvalidInput(format!(
                "container {} has no entrypoint",
                record.names
            )));
        }

        let rootfs = home.containers_dir().join(&record.id).join("rootfs");
        if !rootfs.is_dir() {
            return Err(Error::NotFound(format!(
                "rootfs for {} missing at {}",
                record.names,
                rootfs.display()
            )));
        }

        // The pin path is only visible before the root changes.
        if record.network == PRIVATE {
            netns::enter_child(&netns::pin_path(&record.id))?;
        }

        if let Err(e) = unistd::sethostname(&record.hostname) {
            log::warn!("cannot set hostname {}: {}", record.hostname, e);
        }

        unistd::chroot(&rootfs).map_err(|e| Error::kernel("chroot", e))?;
        unistd::chdir("/").map_err(|e| Error::kernel("chdir", e))?;

        // Liveness marker: process discovery matches the ID inside it.
        fs::create_dir_all("/run")?;
        fs::write("/run/.containerenv", &record.id)?;

        let workdir = if record.workdir.is_empty() {
            "/"
        } else {
            record.workdir.as_str()
        };
        unistd::chdir(workdir).map_err(|e| Error::kernel("chdir to workdir", e))?;

        become_user(&record.user);

        let argv = build_argv(&record, self.tty)?;
        let envp = build_envp(&record)?;

        // On success this never returns.
        unistd::execvpe(&argv[0], &argv, &envp)
            .map_err(|e| Error::kernel("exec of entrypoint", e))?;
        Ok(())
    }
}

/// Switches to the configured `uid[:gid]`. Without a user namespace an
/// unprivileged runtime cannot change identity; the process then keeps
/// running as the invoker rather than failing the whole start.
fn become_user(spec: &str) {
    if spec.is_empty() {
        return;
    }
    let (uid, gid) = utils::parse_user(spec);
    if Gid::current().as_raw() != gid {
        let gid = Gid::from_raw(gid);
        if let Err(e) = unistd::setresgid(gid, gid, gid) {
            log::warn!("cannot switch to gid {}: {}", gid, e);
        }
    }
    if Uid::current().as_raw() != uid {
        let uid = Uid::from_raw(uid);
        if let Err(e) = unistd::setresuid(uid, uid, uid) {
            log::warn!("cannot switch to uid {}: {}", uid, e);
        }
    }
}

fn build_argv(record: &ContainerRecord, tty: bool) -> Result<Vec<CString>> {
    let mut argv = Vec::new();
    if tty {
        argv.push(cstring(PTY_AGENT_PATH)?);
    }
    for arg in &record.entrypoint {
        argv.push(cstring(arg)?);
    }
    Ok(argv)
}

fn build_envp(record: &ContainerRecord) -> Result<Vec<CString>> {
    record.env.iter().map(|kv| cstring(kv)).collect()
}

fn cstring(s: &str) -> Result<CString> {
    CString::new(s).map_err(|_| Error::InvalidInput(format!("embedded NUL in {:?}", s)))
}
