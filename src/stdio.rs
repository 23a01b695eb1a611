//! Stdio disposition for launched processes.
//!
//! Every launch picks one of three modes: a full pseudoterminal with raw
//! byte forwarding, plain interactive stdio inheritance, or detached with
//! combined output captured to a log file. Spawning and completion are
//! separate so callers can act on the live child (the start path attaches
//! slirp4netns between the two).

use std::fs::OpenOptions;
use std::io::{self, IsTerminal, Read, Write};
use std::os::fd::OwnedFd;
use std::path::PathBuf;
use std::process::{Child, Command, ExitStatus, Stdio};
use std::thread;

use nix::pty::openpty;
use nix::sys::termios::{self, SetArg, Termios};

use crate::error::{Error, Result};

pub enum Mode {
    /// Allocate a pty pair and forward bytes between it and the caller's
    /// terminal.
    Tty,
    /// Wire the caller's stdio straight through.
    Interactive,
    /// No stdio; combined stdout/stderr goes to the given log file.
    Detached(PathBuf),
}

#[derive(Debug)]
pub struct Spawned {
    child: Child,
    io: SpawnedIo,
}

#[derive(Debug)]
enum SpawnedIo {
    Tty(TtySession),
    Wait,
    Detached,
}

/// Launches the command under the requested stdio mode.
pub fn spawn(mut cmd: Command, mode: Mode, what: &str) -> Result<Spawned> {
    let io = match mode {
        Mode::Tty => {
            let pty = openpty(None, None).map_err(|e| Error::kernel("openpty", e))?;
            let master = pty.master;
            let slave = pty.slave;

            cmd.stdin(Stdio::from(slave.try_clone()?));
            cmd.stdout(Stdio::from(slave.try_clone()?));
            cmd.stderr(Stdio::from(slave));

            SpawnedIo::Tty(TtySession::new(master)?)
        }
        Mode::Interactive => {
            cmd.stdin(Stdio::inherit());
            cmd.stdout(Stdio::inherit());
            cmd.stderr(Stdio::inherit());
            SpawnedIo::Wait
        }
        Mode::Detached(logfile) => {
            let log = OpenOptions::new()
                .create(true)
                .write(true)
                .truncate(true)
                .open(&logfile)?;
            cmd.stdin(Stdio::null());
            cmd.stdout(Stdio::from(log.try_clone()?));
            cmd.stderr(Stdio::from(log));
            SpawnedIo::Detached
        }
    };

    let child = cmd.spawn().map_err(|e| Error::launch(what, e))?;
    Ok(Spawned { child, io })
}

impl Spawned {
    pub fn pid(&self) -> u32 {
        self.child.id()
    }

    /// Kills the child without waiting for completion. Used on the error
    /// funnel when a later launch step fails.
    pub fn abort(&mut self) {
        let _ = self.child.kill();
        let _ = self.child.wait();
    }

    /// Drives the launch to its end: forwards and waits in the foreground
    /// modes, returns immediately with `None` for a detached child.
    pub fn finish(mut self) -> Result<Option<ExitStatus>> {
        match self.io {
            SpawnedIo::Tty(session) => {
                session.forward();
                let status = self.child.wait()?;
                Ok(Some(status))
            }
            SpawnedIo::Wait => Ok(Some(self.child.wait()?)),
            SpawnedIo::Detached => Ok(None),
        }
    }
}

/// Parent side of an allocated pty. Puts the local terminal into raw mode
/// for the duration of the forwarding and restores it on drop.
#[derive(Debug)]
struct TtySession {
    master: OwnedFd,
    saved: Option<Termios>,
}

impl TtySession {
    fn new(master: OwnedFd) -> Result<Self> {
        let stdin = io::stdin();
        let saved = if stdin.is_terminal() {
            let saved =
                termios::tcgetattr(&stdin).map_err(|e| Error::kernel("tcgetattr", e))?;
            let mut raw = saved.clone();
            termios::cfmakeraw(&mut raw);
            termios::tcsetattr(&stdin, SetArg::TCSANOW, &raw)
                .map_err(|e| Error::kernel("tcsetattr", e))?;
            Some(saved)
        } else {
            None
        };

        Ok(Self { master, saved })
    }

    /// Pumps local stdin into the pty and pty output to local stdout until
    /// the child's side closes. The stdin pump blocks on read and dies with
    /// the process.
    fn forward(&self) {
        if let Ok(writer) = self.master.try_clone() {
            thread::spawn(move || {
                let mut writer = std::fs::File::from(writer);
                let mut stdin = io::stdin();
                let mut buf = [0u8; 4096];
                loop {
                    match stdin.read(&mut buf) {
                        Ok(0) | Err(_) => break,
                        Ok(n) => {
                            if writer.write_all(&buf[..n]).is_err() {
                                break;
                            }
                        }
                    }
                }
            });
        }

        let Ok(reader) = self.master.try_clone() else {
            return;
        };
        let mut reader = std::fs::File::from(reader);
        let mut stdout = io::stdout();
        let mut buf = [0u8; 4096];
        loop {
            // EIO arrives when the pty slave has fully closed.
            match reader.read(&mut buf) {
                Ok(0) | Err(_) => break,
                Ok(n) => {
                    if stdout.write_all(&buf[..n]).is_err() {
                        break;
                    }
                    let _ = stdout.flush();
                }
            }
        }
    }
}

impl Drop for TtySession {
    fn drop(&mut self) {
        if let Some(saved) = &self.saved {
            let _ = termios::tcsetattr(&io::stdin(), SetArg::TCSANOW, saved);
        }
    }
}

#[cfg(test)]
mod tests {
    use std::fs;

    use super::*;

    #[test]
    fn interactive_mode_waits_for_exit() {
        let mut cmd = Command::new("true");
        cmd.stdout(Stdio::null());
        let spawned = spawn(cmd, Mode::Interactive, "true").unwrap();
        let status = spawned.finish().unwrap().expect("foreground status");
        assert!(status.success());
    }

    #[test]
    fn detached_mode_returns_without_status_and_logs() {
        let tmp = tempfile::tempdir().unwrap();
        let logfile = tmp.path().join("current-logs");
        let mut cmd = Command::new("sh");
        cmd.args(["-c", "echo out; echo err >&2"]);

        let spawned = spawn(cmd, Mode::Detached(logfile.clone()), "sh").unwrap();
        let pid = spawned.pid();
        assert!(pid > 0);
        assert!(spawned.finish().unwrap().is_none());

        // Give the detached child a moment to write before asserting.
        for _ in 0..50 {
            let content = fs::read_to_string(&logfile).unwrap_or_default();
            if content.contains("out") && content.contains("err") {
                return;
            }
            thread::sleep(std::time::Duration::from_millis(100));
        }
        panic!("combined output never reached the log file");
    }

    #[test]
    fn spawn_failure_is_child_launch() {
        let cmd = Command::new("/no/such/binary");
        let err = spawn(cmd, Mode::Interactive, "ghost").unwrap_err();
        assert!(matches!(err, Error::ChildLaunch { .. }));
    }

    #[test]
    fn abort_kills_the_child() {
        let mut cmd = Command::new("sleep");
        cmd.arg("30");
        let mut spawned = spawn(cmd, Mode::Interactive, "sleep").unwrap();
        spawned.abort();
    }
}
