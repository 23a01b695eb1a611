use std::env;
use std::path::{Path, PathBuf};

use crate::error::{Error, Result};

/// Resolved data root of the runtime. Threaded explicitly through every
/// operation instead of living in process-wide state.
///
/// Precedence: `--root` flag, then `VESSEL_HOME`, then
/// `$XDG_DATA_HOME/vessel`, then `~/.local/share/vessel`.
#[derive(Debug, Clone)]
pub struct AppHome {
    root: PathBuf,
}

impl AppHome {
    pub fn new(flag: Option<PathBuf>) -> Result<Self> {
        if let Some(root) = flag {
            return Ok(Self { root });
        }
        if let Ok(home) = env::var("VESSEL_HOME") {
            return Ok(Self { root: home.into() });
        }
        if let Ok(data) = env::var("XDG_DATA_HOME") {
            return Ok(Self {
                root: PathBuf::from(data).join("vessel"),
            });
        }
        let home = env::var("HOME")
            .map_err(|_| Error::Internal("cannot locate data root: HOME is not set".into()))?;
        Ok(Self {
            root: PathBuf::from(home).join(".local/share/vessel"),
        })
    }

    /// Builds an `AppHome` rooted at an explicit path. Used by tests and by
    /// callers that already resolved the root.
    pub fn at(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    pub fn containers_dir(&self) -> PathBuf {
        self.root.join("containers")
    }

    pub fn images_dir(&self) -> PathBuf {
        self.root.join("images")
    }

    pub fn bin_dir(&self) -> PathBuf {
        self.root.join("bin")
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn explicit_flag_wins() {
        let home = AppHome::new(Some(PathBuf::from("/tmp/elsewhere"))).unwrap();
        assert_eq!(home.root(), Path::new("/tmp/elsewhere"));
        assert_eq!(
            home.containers_dir(),
            PathBuf::from("/tmp/elsewhere/containers")
        );
    }

    #[test]
    fn layout_hangs_off_root() {
        let home = AppHome::at("/data/vessel");
        assert_eq!(home.images_dir(), PathBuf::from("/data/vessel/images"));
        assert_eq!(home.bin_dir(), PathBuf::from("/data/vessel/bin"));
    }
}
