use std::path::{Component, Path, PathBuf};

use crate::ExtractError;

/// Turns an archive entry name into a path relative to the destination.
///
/// Rejects:
/// - Empty names
/// - Absolute paths (Unix `/` or Windows `C:\`)
/// - Parent directory traversal (`..`)
/// - Windows prefix components (`C:`, `\\server`)
pub fn sanitize_entry_path(entry: &str) -> Result<PathBuf, ExtractError> {
    if entry.is_empty() {
        return Err(ExtractError::UnsafeEntry("empty entry name".into()));
    }

    let mut relative = PathBuf::new();
    for component in Path::new(entry).components() {
        match component {
            Component::Normal(part) => relative.push(part),
            Component::CurDir => {}
            Component::ParentDir => {
                return Err(ExtractError::UnsafeEntry(format!(
                    "parent directory traversal not allowed: {entry}"
                )));
            }
            Component::RootDir | Component::Prefix(_) => {
                return Err(ExtractError::UnsafeEntry(format!(
                    "absolute path not allowed: {entry}"
                )));
            }
        }
    }

    if relative.as_os_str().is_empty() {
        return Err(ExtractError::UnsafeEntry(format!("no file name in entry: {entry}")));
    }
    Ok(relative)
}
