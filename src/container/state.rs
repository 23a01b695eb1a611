use std::fs;
use std::path::Path;

use serde::{Deserialize, Serialize};

use crate::error::{Error, Result};

/// Isolation mode values stored in the record.
pub const PRIVATE: &str = "private";
pub const HOST: &str = "host";
pub const KEEP_ID: &str = "keep-id";

pub const CONFIG_FILE: &str = "config";

/// The persisted per-container configuration record.
///
/// `status` and `size` are derived on inspection and never written by the
/// persistence path, so records round-trip losslessly. Isolation modes stay
/// plain strings for the same reason.
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq, Eq, Default)]
pub struct ContainerRecord {
    pub id: String,
    pub names: String,
    pub created: String,
    pub hostname: String,
    pub image: String,
    pub entrypoint: Vec<String>,
    pub env: Vec<String>,
    pub workdir: String,
    pub user: String,
    pub labels: Vec<String>,
    pub uidmap: String,
    pub gidmap: String,
    pub userns: String,
    pub ipc: String,
    pub pid: String,
    pub cgroup: String,
    pub network: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub status: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub size: Option<String>,
}

impl ContainerRecord {
    pub fn load(path: &Path) -> Result<Self> {
        let data = fs::read(path).map_err(|e| match e.kind() {
            std::io::ErrorKind::NotFound => {
                Error::NotFound(format!("no configuration at {}", path.display()))
            }
            _ => Error::Io(e),
        })?;
        serde_json::from_slice(&data)
            .map_err(|e| Error::CorruptState(format!("{}: {}", path.display(), e)))
    }

    /// Replaces the record on disk. Written to a temp file in the same
    /// directory and renamed over the destination; callers must hold the
    /// container directory.
    pub fn save(&self, path: &Path) -> Result<()> {
        let parent = path.parent().ok_or_else(|| {
            Error::InvalidInput(format!("{} has no parent directory", path.display()))
        })?;
        let tmp = parent.join(".config.tmp");
        fs::write(&tmp, serde_json::to_vec_pretty(self).map_err(corrupt)?)?;
        fs::rename(&tmp, path)?;
        Ok(())
    }

    /// Current timestamp in the record's `created` format.
    pub fn timestamp_now() -> String {
        chrono::Local::now().format("%Y.%m.%d %H:%M:%S").to_string()
    }
}

fn corrupt(e: serde_json::Error) -> Error {
    Error::CorruptState(e.to_string())
}

#[cfg(test)]
pub(crate) fn sample_record() -> ContainerRecord {
    ContainerRecord {
        id: "2567a5ec9705eb7ac2c984033e06189d".into(),
        names: "web".into(),
        created: "2024.03.01 10:22:31".into(),
        hostname: "web".into(),
        image: "docker.io/library/alpine:latest".into(),
        entrypoint: vec!["/bin/sh".into()],
        env: vec!["PATH=/usr/bin:/bin".into(), "TERM=xterm".into()],
        workdir: "/".into(),
        user: "0:0".into(),
        labels: vec!["tier=frontend".into()],
        uidmap: String::new(),
        gidmap: String::new(),
        userns: HOST.into(),
        ipc: PRIVATE.into(),
        pid: PRIVATE.into(),
        cgroup: PRIVATE.into(),
        network: PRIVATE.into(),
        status: None,
        size: None,
    }
}
