use std::collections::VecDeque;
use std::fs;
use std::path::{Path, PathBuf};

use tracing::trace;

/// Looks for an existing installation of a game under `root`.
///
/// Walks breadth-first down to `max_depth` directory levels below `root`
/// and returns the directory that contains `executable` for the first match.
/// `executable` may be a relative path such as `bin/server`; the returned
/// directory is then the one `executable` is relative to. Unreadable
/// directories are skipped. Order within a level follows the directory
/// listing.
pub fn find_install_dir(root: &Path, executable: &str, max_depth: usize) -> Option<PathBuf> {
    let wanted = Path::new(executable);
    let file_name = wanted.file_name()?;
    let levels_up = wanted.components().count();

    let mut pending = VecDeque::from([(root.to_path_buf(), 0usize)]);
    while let Some((dir, depth)) = pending.pop_front() {
        let entries = match fs::read_dir(&dir) {
            Ok(entries) => entries,
            Err(e) => {
                trace!(dir = %dir.display(), error = %e, "skipping unreadable directory");
                continue;
            }
        };

        let mut subdirs = Vec::new();
        for entry in entries.flatten() {
            let path = entry.path();
            let Ok(file_type) = entry.file_type() else {
                continue;
            };
            if file_type.is_dir() {
                if depth < max_depth {
                    subdirs.push(path);
                }
                continue;
            }
            if entry.file_name() == file_name && path.ends_with(wanted) {
                return path.ancestors().nth(levels_up).map(Path::to_path_buf);
            }
        }
        pending.extend(subdirs.into_iter().map(|d| (d, depth + 1)));
    }
    None
}
