//! Running a command inside an already-running container by joining its
//! namespaces through the system nsenter utility.

use std::process::Command;

use clap::Args;
use nix::unistd::Pid;

use crate::container::state::{ContainerRecord, PRIVATE};
use crate::container::{discovery, identity};
use crate::home::AppHome;
use crate::launch::PTY_AGENT_PATH;
use crate::stdio::{self, Mode};
use crate::utils;
use crate::error::Result;

#[derive(Args, Debug)]
pub struct Exec {
    /// Name or ID of the running container.
    pub container: String,
    /// Keep stdin open and forward stdio.
    #[arg(short, long)]
    pub interactive: bool,
    /// Allocate a pseudoterminal.
    #[arg(short, long)]
    pub tty: bool,
    /// Command to run; defaults to the container's entrypoint.
    #[arg(trailing_var_arg = true, allow_hyphen_values = true)]
    pub command: Vec<String>,
}

impl Exec {
    pub fn exec(&self, home: &AppHome) -> Result<()> {
        let pid = discovery::pid_of(home, &self.container)?;
        let mut record = ContainerRecord::load(&identity::config_path(home, &self.container))?;
        if !self.command.is_empty() {
            record.entrypoint = self.command.clone();
        }
        run(home, pid, self.interactive, self.tty, record)
    }
}

/// Joins the namespaces of `pid` and executes the record's entrypoint.
pub fn run(
    home: &AppHome,
    pid: Pid,
    interactive: bool,
    tty: bool,
    record: ContainerRecord,
) -> Result<()> {
    let mut cmd = Command::new("nsenter");
    cmd.args(nsenter_args(pid, tty, &record));
    cmd.env_clear();
    for kv in &record.env {
        if let Some((key, value)) = kv.split_once('=') {
            cmd.env(key, value);
        }
    }

    let mode = if tty {
        Mode::Tty
    } else if interactive {
        Mode::Interactive
    } else {
        Mode::Detached(home.containers_dir().join(&record.id).join("current-logs"))
    };

    stdio::spawn(cmd, mode, "nsenter")?.finish()?;
    Ok(())
}

/// The nsenter invocation for a container: mount, UTS and user namespaces
/// with preserved credentials always; IPC, network and PID only when the
/// record isolates them. Root and working directory are reached through
/// the target's `/proc` view.
pub fn nsenter_args(pid: Pid, tty: bool, record: &ContainerRecord) -> Vec<String> {
    let mut args: Vec<String> = ["-m", "-u", "-U", "--preserve-credentials"]
        .iter()
        .map(|s| s.to_string())
        .collect();

    if record.ipc == PRIVATE {
        args.push("-i".into());
    }
    if record.network == PRIVATE {
        args.push("-n".into());
    }
    if record.pid == PRIVATE {
        args.push("-p".into());
    }

    let (uid, gid) = utils::parse_user(&record.user);
    args.push("-S".into());
    args.push(uid.to_string());
    args.push("-G".into());
    args.push(gid.to_string());
    args.push(format!("-r/proc/{}/root", pid));
    args.push(format!("-w/proc/{}/root{}", pid, record.workdir));
    args.push("-t".into());
    args.push(pid.to_string());

    if tty {
        args.push(PTY_AGENT_PATH.into());
    }
    args.extend(record.entrypoint.iter().cloned());

    args
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::container::state::{sample_record, HOST};

    #[test]
    fn nsenter_always_joins_mount_uts_user() {
        let mut record = sample_record();
        record.ipc = HOST.into();
        record.network = HOST.into();
        record.pid = HOST.into();
        record.user = "1000:100".into();
        record.workdir = "/srv".into();
        record.entrypoint = vec!["/bin/sh".into(), "-l".into()];

        let args = nsenter_args(Pid::from_raw(4242), false, &record);
        assert_eq!(
            args,
            vec![
                "-m",
                "-u",
                "-U",
                "--preserve-credentials",
                "-S",
                "1000",
                "-G",
                "100",
                "-r/proc/4242/root",
                "-w/proc/4242/root/srv",
                "-t",
                "4242",
                "/bin/sh",
                "-l",
            ]
        );
    }

    #[test]
    fn private_modes_add_their_flags() {
        let record = sample_record();
        let args = nsenter_args(Pid::from_raw(7), false, &record);
        assert!(args.contains(&"-i".to_string()));
        assert!(args.contains(&"-n".to_string()));
        assert!(args.contains(&"-p".to_string()));
    }

    #[test]
    fn tty_prepends_the_agent_before_the_entrypoint() {
        let record = sample_record();
        let args = nsenter_args(Pid::from_raw(7), true, &record);
        let agent_pos = args.iter().position(|a| a == PTY_AGENT_PATH).unwrap();
        let entry_pos = args.iter().position(|a| a == "/bin/sh").unwrap();
        assert!(agent_pos < entry_pos);
    }
}
