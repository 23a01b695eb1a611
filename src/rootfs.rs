//! Rootfs materialization from OCI image layers.
//!
//! Layers are extracted in manifest order into the container directory.
//! Extraction runs unprivileged: device nodes and FIFOs are skipped, and
//! ownership handling depends on the user-namespace mode. Under `keep-id`
//! entries are written as the invoking user so that root-in-container files
//! stay readable by the unprivileged process; otherwise the archived
//! uid/gid is applied where permissions allow.

use std::fs::{self, File};
use std::io;
use std::os::unix::fs::PermissionsExt;
use std::path::Path;

use flate2::read::GzDecoder;
use nix::unistd::{chown, Gid, Uid};
use tar::{Archive, EntryType};

use crate::container::identity;
use crate::container::state::{ContainerRecord, KEEP_ID};
use crate::error::{Error, Result};
use crate::home::AppHome;
use crate::image;

const WHITEOUT_PREFIX: &str = ".wh.";
const WHITEOUT_OPAQUE: &str = ".wh..wh..opq";

/// Builds a chrootable rootfs for a new container and persists its record.
///
/// Pulls the image if the local store does not have it, unpacks every layer
/// in manifest order, then merges the image defaults into the draft record:
/// image env appends after caller env, `HOSTNAME` and `TERM` are always
/// set, and an empty entrypoint adopts the image command.
pub fn create_rootfs(
    home: &AppHome,
    image_ref: &str,
    name: &str,
    mut record: ContainerRecord,
    uidmap: &str,
    gidmap: &str,
) -> Result<()> {
    let rootfs = identity::rootfs_dir(home, name);
    log::debug!("preparing rootfs at {}", rootfs.display());
    fs::create_dir_all(&rootfs)?;

    let store = image::Store::new(home);
    if !store.contains(image_ref) {
        store.pull(home, image_ref)?;
    }

    let manifest = store.manifest(image_ref)?;
    let image_dir = store.image_dir(image_ref);
    let keep_id = record.userns == KEEP_ID;

    for layer in &manifest.layers {
        let blob = image_dir.join(layer.blob_name());
        log::debug!("extracting layer {}", blob.display());
        extract_layer(&blob, &rootfs, keep_id)?;
    }

    let config = store.legacy_config(image_ref)?;
    record.env.extend(config.config.env);
    record.env.push(format!("HOSTNAME={}", record.hostname));
    record.env.push("TERM=xterm".to_string());

    if record.entrypoint.is_empty() {
        log::debug!("no entrypoint given, adopting the image command");
        record.entrypoint = config.config.cmd;
    }

    record.uidmap = uidmap.to_string();
    record.gidmap = gidmap.to_string();

    record.save(&identity::config_path(home, name))
}

/// Unpacks one gzipped layer tarball into `dest`, honoring OCI whiteouts.
pub fn extract_layer(blob: &Path, dest: &Path, keep_id: bool) -> Result<()> {
    let file = File::open(blob).map_err(|e| match e.kind() {
        io::ErrorKind::NotFound => Error::NotFound(format!("missing layer blob {}", blob.display())),
        _ => Error::Io(e),
    })?;
    let mut archive = Archive::new(GzDecoder::new(file));
    archive.set_preserve_permissions(true);

    for entry in archive.entries()? {
        let mut entry = entry?;
        let path = entry.path()?.to_path_buf();

        let file_name = path
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_default();

        // Opaque marker: content under the parent from lower layers is hidden.
        if file_name == WHITEOUT_OPAQUE {
            if let Some(parent) = path.parent() {
                clear_directory(&dest.join(parent))?;
            }
            continue;
        }

        // Plain whiteout: delete the named sibling from lower layers.
        if let Some(target) = file_name.strip_prefix(WHITEOUT_PREFIX) {
            if let Some(parent) = path.parent() {
                let victim = dest.join(parent).join(target);
                if victim.is_dir() {
                    fs::remove_dir_all(&victim)?;
                } else if victim.exists() {
                    fs::remove_file(&victim)?;
                }
            }
            continue;
        }

        let target = dest.join(&path);
        if let Some(parent) = target.parent() {
            fs::create_dir_all(parent)?;
        }

        let header = entry.header().clone();
        match header.entry_type() {
            EntryType::Directory => {
                fs::create_dir_all(&target)?;
                if let Ok(mode) = header.mode() {
                    fs::set_permissions(&target, fs::Permissions::from_mode(mode))?;
                }
                apply_ownership(&target, &header, keep_id);
            }
            EntryType::Regular | EntryType::Continuous => {
                let mut out = File::create(&target)?;
                io::copy(&mut entry, &mut out)?;
                if let Ok(mode) = header.mode() {
                    fs::set_permissions(&target, fs::Permissions::from_mode(mode))?;
                }
                apply_ownership(&target, &header, keep_id);
            }
            EntryType::Symlink => {
                if let Ok(Some(link)) = entry.link_name() {
                    let _ = fs::remove_file(&target);
                    std::os::unix::fs::symlink(link, &target)?;
                }
            }
            EntryType::Link => {
                if let Ok(Some(link)) = entry.link_name() {
                    let source = dest.join(link.as_ref());
                    if source.exists() {
                        let _ = fs::remove_file(&target);
                        fs::hard_link(&source, &target)?;
                    }
                }
            }
            // Device nodes and FIFOs need privileges the runtime does not have.
            EntryType::Char | EntryType::Block | EntryType::Fifo => {
                log::debug!("skipping special file {}", path.display());
            }
            other => {
                log::debug!("skipping {:?} entry {}", other, path.display());
            }
        }
    }

    Ok(())
}

/// Under keep-id, files stay owned by the invoking user; otherwise the
/// archived ownership is applied where the kernel allows it.
fn apply_ownership(target: &Path, header: &tar::Header, keep_id: bool) {
    if keep_id {
        return;
    }
    let (Ok(uid), Ok(gid)) = (header.uid(), header.gid()) else {
        return;
    };
    if let Err(e) = chown(
        target,
        Some(Uid::from_raw(uid as u32)),
        Some(Gid::from_raw(gid as u32)),
    ) {
        log::debug!("cannot chown {}: {}", target.display(), e);
    }
}

fn clear_directory(dir: &Path) -> Result<()> {
    if !dir.exists() {
        return Ok(());
    }
    for entry in fs::read_dir(dir)? {
        let path = entry?.path();
        if path.is_dir() {
            fs::remove_dir_all(&path)?;
        } else {
            fs::remove_file(&path)?;
        }
    }
    Ok(())
}
