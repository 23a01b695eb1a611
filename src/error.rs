use std::io;

use thiserror::Error;

/// Error taxonomy of the runtime. Components return these upward; the CLI
/// boundary funnels them into process exit codes.
#[derive(Debug, Error)]
pub enum Error {
    #[error("invalid input: {0}")]
    InvalidInput(String),

    #[error("{0}")]
    NotFound(String),

    #[error("container {0} is not running")]
    NotRunning(String),

    #[error("corrupt container state: {0}")]
    CorruptState(String),

    /// A namespace, mount or signal syscall failed.
    #[error("{op} failed: {errno}")]
    KernelOp {
        op: &'static str,
        #[source]
        errno: nix::errno::Errno,
    },

    /// Spawning an external process (the re-exec'd child, slirp4netns,
    /// nsenter, the puller helper) failed.
    #[error("failed to launch {what}: {source}")]
    ChildLaunch {
        what: String,
        #[source]
        source: io::Error,
    },

    /// Best-effort teardown collects every sub-error instead of stopping
    /// at the first one.
    #[error("cleanup finished with {} error(s): {}", .0.len(), describe(.0))]
    Cleanup(Vec<Error>),

    #[error("internal error: {0}")]
    Internal(String),

    #[error(transparent)]
    Io(#[from] io::Error),
}

pub type Result<T> = std::result::Result<T, Error>;

impl Error {
    pub fn kernel(op: &'static str, errno: nix::errno::Errno) -> Self {
        Error::KernelOp { op, errno }
    }

    pub fn launch(what: impl Into<String>, source: io::Error) -> Self {
        Error::ChildLaunch {
            what: what.into(),
            source,
        }
    }
}

fn describe(errors: &[Error]) -> String {
    errors
        .iter()
        .map(|e| e.to_string())
        .collect::<Vec<_>>()
        .join("; ")
}
