pub mod discovery;
pub mod identity;
pub mod state;

use std::env;
use std::process::Command;

use crate::error::{Error, Result};
use crate::home::AppHome;
use crate::utils;

pub use state::ContainerRecord;

pub const STATUS_RUNNING: &str = "running";
pub const STATUS_STOPPED: &str = "stopped";

/// Loads a container's record with its derived fields filled in.
///
/// Returns `Ok(None)` for a corrupt record: the container is irrecoverable,
/// so a removal is triggered through the public CLI and the entry is
/// dropped from whatever listing asked for it.
pub fn info(home: &AppHome, container: &str, with_size: bool) -> Result<Option<ContainerRecord>> {
    let config_path = home.containers_dir().join(container).join(state::CONFIG_FILE);

    let mut record = match ContainerRecord::load(&config_path) {
        Ok(record) => record,
        Err(Error::CorruptState(e)) => {
            log::warn!("found invalid container {}, cleaning up: {}", container, e);
            remove_out_of_band(home, container);
            return Ok(None);
        }
        Err(e) => return Err(e),
    };

    record.status = Some(status_of(home, &record).to_string());
    if with_size {
        record.size = Some(utils::disk_usage_mib(
            &home.containers_dir().join(container),
        )?);
    }

    Ok(Some(record))
}

pub fn status_of(home: &AppHome, record: &ContainerRecord) -> &'static str {
    if discovery::is_running(home, &record.names) {
        STATUS_RUNNING
    } else {
        STATUS_STOPPED
    }
}

/// Removes a broken container through the same CLI surface a user would
/// use, so the deletion goes through one code path.
pub fn remove_out_of_band(home: &AppHome, container: &str) {
    let Ok(exe) = env::current_exe() else {
        log::warn!("cannot locate own binary to remove {}", container);
        return;
    };
    let result = Command::new(exe)
        .arg("--root")
        .arg(home.root())
        .args(["rm", "--force", container])
        .status();
    match result {
        Ok(status) if status.success() => {}
        Ok(status) => log::warn!("removal of {} exited with {}", container, status),
        Err(e) => log::warn!("removal of {} could not be spawned: {}", container, e),
    }
}

#[cfg(test)]
mod tests {
    use std::fs;

    use super::*;
    use crate::container::state::sample_record;

    #[test]
    fn info_derives_stopped_status() {
        let tmp = tempfile::tempdir().unwrap();
        let home = AppHome::at(tmp.path());
        let record = sample_record();
        let dir = home.containers_dir().join(&record.id);
        fs::create_dir_all(&dir).unwrap();
        record.save(&dir.join(state::CONFIG_FILE)).unwrap();

        let info = info(&home, &record.id, true).unwrap().unwrap();
        assert_eq!(info.status.as_deref(), Some(STATUS_STOPPED));
        assert!(info.size.as_deref().unwrap().ends_with("MiB"));
        assert_eq!(info.names, record.names);
    }

    #[test]
    fn info_missing_record_surfaces() {
        let tmp = tempfile::tempdir().unwrap();
        let home = AppHome::at(tmp.path());
        assert!(matches!(
            info(&home, "missing", false),
            Err(Error::NotFound(_))
        ));
    }
}
