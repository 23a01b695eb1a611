//! Parent side of the container launch protocol.
//!
//! The runtime never forks and configures in one process. It re-executes
//! itself with the internal `enter` subcommand, handing the full record
//! over as a JSON argument. All namespace creation happens here in the
//! parent, with a single `unshare` call, so the child simply inherits the
//! new namespaces on exec.

use std::env;
use std::fs;
use std::os::unix::process::CommandExt;
use std::process::Command;

use nix::sched::{unshare, CloneFlags};

use crate::container::state::{ContainerRecord, KEEP_ID, PRIVATE};
use crate::error::{Error, Result};
use crate::home::AppHome;
use crate::logger;

/// Fallback identity mapping installed when keep-id is requested without
/// explicit maps.
pub const DEFAULT_ID_MAP: &str = "1000:100000:65536";

/// Where the PTY agent lives inside every container rootfs. Part of the
/// ABI between the launcher, the `enter` child and the exec path.
pub const PTY_AGENT_PATH: &str = "/usr/libexec/vessel-pty";

/// True when the invoker asked to skip user-namespace creation entirely,
/// for already-privileged use.
pub fn rootful_override() -> bool {
    matches!(env::var("VESSEL_ROOTFUL").as_deref(), Ok("true"))
}

/// Namespace flags the child will run under. Mount and UTS are
/// unconditional; the rest follow the record's isolation modes. The
/// network namespace is handled separately by its own manager.
pub fn clone_flags(record: &ContainerRecord, rootful: bool) -> CloneFlags {
    let mut flags = CloneFlags::CLONE_NEWNS | CloneFlags::CLONE_NEWUTS;

    if record.userns == KEEP_ID && !rootful {
        flags |= CloneFlags::CLONE_NEWUSER;
    }
    if record.ipc == PRIVATE {
        flags |= CloneFlags::CLONE_NEWIPC;
    }
    if record.pid == PRIVATE {
        flags |= CloneFlags::CLONE_NEWPID;
    }
    if record.cgroup == PRIVATE {
        flags |= CloneFlags::CLONE_NEWCGROUP;
    }

    flags
}

/// The uid/gid map specs to install for keep-id, falling back to the
/// default mapping when the record carries none.
pub fn keep_id_maps(record: &ContainerRecord) -> (String, String) {
    let uidmap = if record.uidmap.is_empty() {
        log::warn!("no uidmap configured, defaulting to {}", DEFAULT_ID_MAP);
        DEFAULT_ID_MAP.to_string()
    } else {
        record.uidmap.clone()
    };
    let gidmap = if record.gidmap.is_empty() {
        log::warn!("no gidmap configured, defaulting to {}", DEFAULT_ID_MAP);
        DEFAULT_ID_MAP.to_string()
    } else {
        record.gidmap.clone()
    };
    (uidmap, gidmap)
}

/// Builds the `enter` invocation and performs the parent-side namespace
/// setup the child will inherit.
///
/// After this returns, the calling process is already inside the new
/// namespaces; it must proceed to spawn and not attempt a second unshare.
pub fn enter_command(home: &AppHome, record: &ContainerRecord, rootful: bool) -> Result<Command> {
    let config_arg = serde_json::to_string(record)
        .map_err(|e| Error::InvalidInput(format!("record does not serialize: {}", e)))?;

    let exe = env::current_exe()?;
    let mut cmd = Command::new(exe);
    cmd.arg("--root")
        .arg(home.root())
        .arg("--log-level")
        .arg(logger::level_arg())
        .arg("enter")
        .arg("--config")
        .arg(config_arg);

    let flags = clone_flags(record, rootful);
    let new_userns = flags.contains(CloneFlags::CLONE_NEWUSER);

    // The child leads its own session and process group.
    unsafe {
        cmd.pre_exec(|| {
            nix::unistd::setsid().map_err(|e| std::io::Error::from_raw_os_error(e as i32))?;
            Ok(())
        });
    }

    unshare(flags).map_err(|e| Error::kernel("unshare of container namespaces", e))?;

    if new_userns {
        let (uidmap, gidmap) = keep_id_maps(record);
        write_id_maps(&uidmap, &gidmap)?;
        // Root inside the new user namespace; only valid because the
        // namespace exists.
        cmd.uid(0);
        cmd.gid(0);
    }

    Ok(cmd)
}

/// Installs the uid/gid maps for the freshly unshared user namespace. The
/// maps apply to this process and are inherited by the exec'd child.
fn write_id_maps(uidmap: &str, gidmap: &str) -> Result<()> {
    // gid_map writes require setgroups to be denied first.
    fs::write("/proc/self/setgroups", b"deny")?;
    fs::write("/proc/self/uid_map", format_map(uidmap)?)?;
    fs::write("/proc/self/gid_map", format_map(gidmap)?)?;
    Ok(())
}

fn format_map(spec: &str) -> Result<String> {
    let parts: Vec<&str> = spec.split(':').collect();
    if parts.len() != 3 || parts.iter().any(|p| p.parse::<u32>().is_err()) {
        return Err(Error::InvalidInput(format!(
            "id map {} is not of the form inside:outside:size",
            spec
        )));
    }
    Ok(format!("{} {} {}\n", parts[0], parts[1], parts[2]))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::container::state::{sample_record, HOST};

    #[test]
    fn mount_and_uts_are_unconditional() {
        let mut record = sample_record();
        record.userns = HOST.into();
        record.ipc = HOST.into();
        record.pid = HOST.into();
        record.cgroup = HOST.into();
        let flags = clone_flags(&record, false);
        assert_eq!(
            flags,
            CloneFlags::CLONE_NEWNS | CloneFlags::CLONE_NEWUTS
        );
    }

    #[test]
    fn private_modes_add_their_namespaces() {
        let mut record = sample_record();
        record.ipc = PRIVATE.into();
        record.pid = PRIVATE.into();
        record.cgroup = PRIVATE.into();
        let flags = clone_flags(&record, false);
        assert!(flags.contains(CloneFlags::CLONE_NEWIPC));
        assert!(flags.contains(CloneFlags::CLONE_NEWPID));
        assert!(flags.contains(CloneFlags::CLONE_NEWCGROUP));
        assert!(!flags.contains(CloneFlags::CLONE_NEWUSER));
    }

    #[test]
    fn keep_id_requests_a_user_namespace() {
        let mut record = sample_record();
        record.userns = KEEP_ID.into();
        assert!(clone_flags(&record, false).contains(CloneFlags::CLONE_NEWUSER));
    }

    #[test]
    fn rootful_suppresses_the_user_namespace() {
        let mut record = sample_record();
        record.userns = KEEP_ID.into();
        assert!(!clone_flags(&record, true).contains(CloneFlags::CLONE_NEWUSER));
    }

    #[test]
    fn empty_maps_fall_back_to_default() {
        let mut record = sample_record();
        record.uidmap = String::new();
        record.gidmap = String::new();
        assert_eq!(
            keep_id_maps(&record),
            (DEFAULT_ID_MAP.to_string(), DEFAULT_ID_MAP.to_string())
        );
    }

    #[test]
    fn explicit_maps_win() {
        let mut record = sample_record();
        record.uidmap = "1000:1000:1".into();
        record.gidmap = "100:100:1".into();
        assert_eq!(
            keep_id_maps(&record),
            ("1000:1000:1".to_string(), "100:100:1".to_string())
        );
    }

    #[test]
    fn map_spec_formats_as_kernel_line() {
        assert_eq!(format_map("1000:100000:65536").unwrap(), "1000 100000 65536\n");
        assert!(format_map("1000:100000").is_err());
        assert!(format_map("a:b:c").is_err());
    }

    #[test]
    fn rootful_env_override_is_recognized() {
        env::remove_var("VESSEL_ROOTFUL");
        assert!(!rootful_override());
        env::set_var("VESSEL_ROOTFUL", "true");
        assert!(rootful_override());
        env::remove_var("VESSEL_ROOTFUL");
    }
}
