//! Path normalization and stable path hashing.

use std::path::{Component, Path, PathBuf};

/// Normalize a path lexically: collapse `.` components, resolve `..` against preceding
/// components and drop trailing separators. The filesystem is never touched.
pub fn normalize_path(path: impl AsRef<Path>) -> PathBuf {
    let mut normalized = PathBuf::new();
    for component in path.as_ref().components() {
        match component {
            Component::CurDir => {}
            Component::ParentDir => {
                if !normalized.pop() {
                    normalized.push("..");
                }
            }
            other => normalized.push(other.as_os_str()),
        }
    }
    if normalized.as_os_str().is_empty() {
        normalized.push(".");
    }
    normalized
}

/// Whether `path` equals `ancestor` or lies below it. Compared component-wise, so
/// `/work/app2` is not inside `/work/app`.
pub fn is_within(path: &Path, ancestor: &Path) -> bool {
    path.starts_with(ancestor)
}

/// Stable identity for a filesystem location: the first 16 hex digits of the BLAKE3
/// hash of the normalized path. Identical across process restarts.
pub fn stable_path_hash(path: impl AsRef<Path>) -> String {
    let normalized = normalize_path(path);
    let hash = blake3::hash(normalized.to_string_lossy().as_bytes());
    hash.to_hex()[..16].to_string()
}

/// Render a path with forward slashes, for glob matching and keys.
pub fn to_slash(path: &Path) -> String {
    path.components()
        .filter_map(|component| match component {
            Component::RootDir => Some(String::new()),
            Component::Prefix(prefix) => Some(prefix.as_os_str().to_string_lossy().into_owned()),
            Component::CurDir => None,
            other => Some(other.as_os_str().to_string_lossy().into_owned()),
        })
        .collect::<Vec<_>>()
        .join("/")
}
