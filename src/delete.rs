//! Container removal.

use std::fs;

use clap::Args;

use crate::container::{discovery, identity};
use crate::error::{Error, Result};
use crate::home::AppHome;
use crate::netns::{self, NetworkNamespace};
use crate::stop;

#[derive(Args, Debug)]
pub struct Delete {
    /// Names or IDs to remove.
    #[arg(required = true)]
    pub containers: Vec<String>,
    /// Kill a running container before removing it.
    #[arg(short, long)]
    pub force: bool,
}

impl Delete {
    pub fn exec(&self, home: &AppHome) -> Result<()> {
        for container in &self.containers {
            remove(home, container, self.force)?;
        }
        Ok(())
    }
}

pub fn remove(home: &AppHome, container: &str, force: bool) -> Result<()> {
    let dir = identity::dir(home, container);
    if !dir.exists() {
        return Err(Error::NotFound(format!(
            "container {} does not exist",
            container
        )));
    }

    if discovery::is_running(home, container) {
        if !force {
            return Err(Error::InvalidInput(format!(
                "container {} is running, stop it or pass --force",
                container
            )));
        }
        stop::stop(home, container, true, 0)?;
    }

    // Leftover network state from a previous run goes with the container.
    let id = identity::resolve(home, container);
    if netns::runtime_dir_of(&id).exists() {
        if let Err(e) = NetworkNamespace::new(&id)?.cleanup() {
            log::warn!("network cleanup during removal: {}", e);
        }
    }

    log::debug!("removing {}", dir.display());
    fs::remove_dir_all(&dir)?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::container::state::{sample_record, CONFIG_FILE};

    #[test]
    fn remove_deletes_the_container_directory() {
        let tmp = tempfile::tempdir().unwrap();
        let home = AppHome::at(tmp.path());
        let mut record = sample_record();
        record.names = "doomed".into();
        record.id = identity::resolve(&home, "doomed");
        let dir = identity::dir(&home, "doomed");
        fs::create_dir_all(dir.join("rootfs")).unwrap();
        record.save(&dir.join(CONFIG_FILE)).unwrap();

        remove(&home, "doomed", false).unwrap();
        assert!(!dir.exists());
    }

    #[test]
    fn remove_unknown_container_is_not_found() {
        let tmp = tempfile::tempdir().unwrap();
        let home = AppHome::at(tmp.path());
        assert!(matches!(
            remove(&home, "ghost", false),
            Err(Error::NotFound(_))
        ));
    }
}
