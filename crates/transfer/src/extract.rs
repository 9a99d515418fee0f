use std::fs::{self, File};
use std::io;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use tokio_util::sync::CancellationToken;
use tracing::{debug, warn};
use zip::ZipArchive;

use crate::ExtractError;
use crate::phase::{PhaseHandle, PhaseOutcome};
use crate::progress::PhaseProgress;
use crate::validation::sanitize_entry_path;

/// Turns a transferred archive into an installation directory.
///
/// Implementations start the work and return immediately; the returned
/// handle resolves once extraction ends. Cancelling `cancel` must end the
/// phase with [`PhaseOutcome::Cancelled`].
pub trait Extractor: Send + Sync {
    fn extract(&self, archive: &Path, destination: &Path, cancel: CancellationToken)
    -> PhaseHandle;
}

/// Extracts `.zip` archives on the blocking thread pool.
///
/// Progress is counted in compressed bytes against the archive size, so
/// the phase total matches the transferred artifact. Must be called from
/// within a tokio runtime.
#[derive(Debug, Clone, Copy, Default)]
pub struct ZipExtractor;

impl Extractor for ZipExtractor {
    fn extract(
        &self,
        archive: &Path,
        destination: &Path,
        cancel: CancellationToken,
    ) -> PhaseHandle {
        let total = fs::metadata(archive).map(|m| m.len()).unwrap_or(0);
        let (handle, reporter) = PhaseHandle::channel(Arc::new(PhaseProgress::new(total)), archive);
        let archive = archive.to_path_buf();
        let destination = destination.to_path_buf();

        tokio::task::spawn_blocking(move || {
            let outcome = match extract_zip(&archive, &destination, reporter.progress(), &cancel)
            {
                Ok(()) => {
                    debug!(archive = %archive.display(), dest = %destination.display(), "archive extracted");
                    PhaseOutcome::Completed
                }
                Err(ExtractError::Cancelled) => PhaseOutcome::Cancelled,
                Err(e) => {
                    warn!(archive = %archive.display(), error = %e, "extraction failed");
                    PhaseOutcome::Failed(e.to_string())
                }
            };
            reporter.report(outcome);
        });

        handle
    }
}

fn extract_zip(
    source: &Path,
    target: &Path,
    progress: &PhaseProgress,
    cancel: &CancellationToken,
) -> Result<(), ExtractError> {
    let mut archive = ZipArchive::new(File::open(source)?)?;
    fs::create_dir_all(target)?;

    for index in 0..archive.len() {
        if cancel.is_cancelled() {
            return Err(ExtractError::Cancelled);
        }

        let mut entry = archive.by_index(index)?;
        let destination: PathBuf = target.join(sanitize_entry_path(entry.name())?);

        if entry.is_dir() {
            fs::create_dir_all(&destination)?;
        } else {
            if let Some(parent) = destination.parent() {
                fs::create_dir_all(parent)?;
            }
            let mut output = File::create(&destination)?;
            io::copy(&mut entry, &mut output)?;

            #[cfg(unix)]
            if let Some(mode) = entry.unix_mode() {
                use std::os::unix::fs::PermissionsExt;
                fs::set_permissions(&destination, fs::Permissions::from_mode(mode))?;
            }
        }
        progress.advance(entry.compressed_size());
    }

    // Headers and the central directory are not part of any entry.
    let rest = progress.total().saturating_sub(progress.done());
    if rest > 0 {
        progress.advance(rest);
    }
    Ok(())
}
