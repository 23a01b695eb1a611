//! Read-side view of the local OCI image store.
//!
//! Pulling and verifying images is the job of the companion puller helper;
//! this runtime only consumes the store layout it produces:
//! `<root>/images/<sanitized-ref>/{manifest.json, config.json, <digest>.tar.gz}`.

use std::fs;
use std::path::{Path, PathBuf};
use std::process::Command;

use serde::Deserialize;

use crate::error::{Error, Result};
use crate::home::AppHome;

/// Subset of the OCI image manifest the rootfs builder needs.
#[derive(Deserialize, Debug)]
pub struct Manifest {
    pub layers: Vec<Descriptor>,
}

#[derive(Deserialize, Debug)]
pub struct Descriptor {
    pub digest: String,
}

impl Descriptor {
    /// Blob file name for this layer, `sha256:abc...` becoming `abc....tar.gz`.
    pub fn blob_name(&self) -> String {
        let hex = self.digest.split(':').nth(1).unwrap_or(&self.digest);
        format!("{}.tar.gz", hex)
    }
}

/// The legacy image config carrying the default environment and command.
#[derive(Deserialize, Debug, Default)]
pub struct LegacyConfig {
    #[serde(default)]
    pub config: RunConfig,
}

#[derive(Deserialize, Debug, Default)]
pub struct RunConfig {
    #[serde(default, rename = "Env")]
    pub env: Vec<String>,
    #[serde(default, rename = "Cmd")]
    pub cmd: Vec<String>,
}

pub struct Store {
    images_root: PathBuf,
}

impl Store {
    pub fn new(home: &AppHome) -> Self {
        Self {
            images_root: home.images_dir(),
        }
    }

    pub fn image_dir(&self, reference: &str) -> PathBuf {
        self.images_root.join(sanitize(reference))
    }

    pub fn contains(&self, reference: &str) -> bool {
        self.image_dir(reference).join("manifest.json").exists()
    }

    /// Fetches a missing image through the puller helper next to the other
    /// companion binaries. The runtime never talks to a registry itself.
    pub fn pull(&self, home: &AppHome, reference: &str) -> Result<()> {
        let helper = home.bin_dir().join("pull");
        if !helper.exists() {
            return Err(Error::NotFound(format!(
                "image {} is not in the local store and no puller helper exists at {}",
                reference,
                helper.display()
            )));
        }

        log::debug!("pulling {} via {}", reference, helper.display());
        let status = Command::new(&helper)
            .arg(reference)
            .arg(self.image_dir(reference))
            .status()
            .map_err(|e| Error::launch(format!("puller {}", helper.display()), e))?;
        if !status.success() {
            return Err(Error::Internal(format!(
                "puller exited with {} for image {}",
                status, reference
            )));
        }
        Ok(())
    }

    pub fn manifest(&self, reference: &str) -> Result<Manifest> {
        read_json(&self.image_dir(reference).join("manifest.json"))
    }

    pub fn legacy_config(&self, reference: &str) -> Result<LegacyConfig> {
        read_json(&self.image_dir(reference).join("config.json"))
    }
}

fn read_json<T: for<'de> Deserialize<'de>>(path: &Path) -> Result<T> {
    let data = fs::read(path).map_err(|e| match e.kind() {
        std::io::ErrorKind::NotFound => Error::NotFound(format!("missing {}", path.display())),
        _ => Error::Io(e),
    })?;
    serde_json::from_slice(&data)
        .map_err(|e| Error::CorruptState(format!("{}: {}", path.display(), e)))
}

fn sanitize(reference: &str) -> String {
    reference
        .chars()
        .map(|c| match c {
            '/' | ':' | '@' => '_',
            c => c,
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn sanitized_reference_is_a_single_path_component() {
        assert_eq!(
            sanitize("docker.io/library/alpine:latest"),
            "docker.io_library_alpine_latest"
        );
    }

    #[test]
    fn blob_name_strips_algorithm_prefix() {
        let layer = Descriptor {
            digest: "sha256:0011aabb".into(),
        };
        assert_eq!(layer.blob_name(), "0011aabb.tar.gz");
    }

    #[test]
    fn manifest_parses_oci_layout() {
        let tmp = tempfile::tempdir().unwrap();
        let home = AppHome::at(tmp.path());
        let store = Store::new(&home);
        let dir = store.image_dir("alpine:latest");
        fs::create_dir_all(&dir).unwrap();
        fs::write(
            dir.join("manifest.json"),
            br#"{
                "schemaVersion": 2,
                "config": {"mediaType": "x", "digest": "sha256:cfg", "size": 1},
                "layers": [
                    {"mediaType": "x", "digest": "sha256:l1", "size": 2},
                    {"mediaType": "x", "digest": "sha256:l2", "size": 3}
                ]
            }"#,
        )
        .unwrap();

        assert!(store.contains("alpine:latest"));
        let manifest = store.manifest("alpine:latest").unwrap();
        assert_eq!(manifest.layers.len(), 2);
        assert_eq!(manifest.layers[0].blob_name(), "l1.tar.gz");
    }

    #[test]
    fn pull_without_helper_is_not_found() {
        let tmp = tempfile::tempdir().unwrap();
        let home = AppHome::at(tmp.path());
        let store = Store::new(&home);
        let err = store.pull(&home, "alpine:latest").unwrap_err();
        assert!(matches!(err, Error::NotFound(_)));
    }
}
