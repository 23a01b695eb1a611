//! Renaming a container: move its directory, then rewrite the record with
//! the new name, the new derived ID and a fresh creation timestamp.
//!
//! The container must not be running; the caller is responsible for
//! stopping it first, this layer does not enforce it.

use std::fs;

use clap::Args;

use crate::container::state::{ContainerRecord, CONFIG_FILE};
use crate::container::identity;
use crate::error::{Error, Result};
use crate::home::AppHome;

#[derive(Args, Debug)]
pub struct Rename {
    /// Current name or ID.
    pub old: String,
    /// New name.
    pub new: String,
}

impl Rename {
    pub fn exec(&self, home: &AppHome) -> Result<()> {
        rename(home, &self.old, &self.new)
    }
}

pub fn rename(home: &AppHome, old: &str, new: &str) -> Result<()> {
    let old_dir = identity::dir(home, old);
    if !old_dir.exists() {
        return Err(Error::NotFound(format!("container {} does not exist", old)));
    }

    let new_dir = identity::dir(home, new);
    if new_dir.exists() {
        return Err(Error::InvalidInput(format!(
            "destination name {} for container {} already exists",
            new, old
        )));
    }

    log::debug!(
        "renaming {} to {}, moving {} to {}",
        old,
        new,
        old_dir.display(),
        new_dir.display()
    );
    fs::rename(&old_dir, &new_dir)?;

    let config_path = new_dir.join(CONFIG_FILE);
    let mut record = ContainerRecord::load(&config_path)?;
    record.names = new.to_string();
    record.id = identity::resolve(home, new);
    record.created = ContainerRecord::timestamp_now();
    record.save(&config_path)
}
