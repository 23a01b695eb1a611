//! Container identity: stable IDs derived from human names, and the on-disk
//! layout derived from IDs.

use std::path::PathBuf;

use md5::{Digest, Md5};
use rand::rngs::OsRng;
use rand::Rng;

use crate::home::AppHome;

/// Resolves a human name or ID to the container ID.
///
/// A name that already matches a container directory is an ID and is
/// returned verbatim, so `resolve` is idempotent. Anything else is hashed;
/// the digest is an identifier, not a security primitive.
pub fn resolve(home: &AppHome, name: &str) -> String {
    if home.containers_dir().join(name).exists() {
        return name.to_string();
    }
    Md5::digest(name.as_bytes())
        .iter()
        .map(|b| format!("{:02x}", b))
        .collect()
}

/// Directory holding the container's config and rootfs.
pub fn dir(home: &AppHome, name: &str) -> PathBuf {
    home.containers_dir().join(resolve(home, name))
}

/// The container's root filesystem tree.
pub fn rootfs_dir(home: &AppHome, name: &str) -> PathBuf {
    dir(home, name).join("rootfs")
}

/// Path of the persisted configuration record.
pub fn config_path(home: &AppHome, name: &str) -> PathBuf {
    dir(home, name).join("config")
}

const NAME_LETTERS: &[u8] = b"abcdefghijklmnopqrstuvwxyz0123456789";

/// Generates a `xxxxxx_xxxxxx` name for containers created without one.
pub fn random_name() -> String {
    let part = || -> String {
        (0..6)
            .map(|_| NAME_LETTERS[OsRng.gen_range(0..NAME_LETTERS.len())] as char)
            .collect()
    };
    format!("{}_{}", part(), part())
}
