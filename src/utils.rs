use std::fs;
use std::path::Path;

use crate::error::Result;

/// Parses a `uid[:gid]` spec. Missing pieces default to 0; a gid-less spec
/// reuses the uid. Non-numeric values fall back to 0 with a warning, the
/// runtime only deals in numeric ids.
pub fn parse_user(spec: &str) -> (u32, u32) {
    let mut parts = spec.splitn(2, ':');
    let uid = parse_id(parts.next().unwrap_or(""), spec);
    let gid = match parts.next() {
        Some(g) => parse_id(g, spec),
        None => uid,
    };
    (uid, gid)
}

fn parse_id(value: &str, spec: &str) -> u32 {
    if value.is_empty() {
        return 0;
    }
    value.parse().unwrap_or_else(|_| {
        log::warn!("cannot parse numeric id from user spec {}, using 0", spec);
        0
    })
}

/// Disk usage of a directory tree, formatted in MiB.
pub fn disk_usage_mib(path: &Path) -> Result<String> {
    let bytes = dir_size(path)?;
    Ok(format!("{:.2}MiB", bytes as f64 / (1024.0 * 1024.0)))
}

fn dir_size(path: &Path) -> Result<u64> {
    let mut total = 0;
    for entry in fs::read_dir(path)? {
        let entry = entry?;
        let meta = entry.metadata()?;
        if meta.is_dir() {
            total += dir_size(&entry.path())?;
        } else {
            total += meta.len();
        }
    }
    Ok(total)
}
