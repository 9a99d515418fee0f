//! The two phases of acquiring a game: network transfer and extraction.
//!
//! Neither phase is implemented here end to end. The transfer itself is
//! driven by the remote collaborator; this crate provides the pieces both
//! sides share: live [`PhaseProgress`], the [`PhaseHandle`]/[`PhaseReporter`]
//! completion pair, the [`Extractor`] seam with a zip implementation, and
//! the install-directory search.

mod extract;
mod phase;
mod progress;
mod search;
mod validation;

pub use extract::{Extractor, ZipExtractor};
pub use phase::{PhaseHandle, PhaseOutcome, PhaseReporter};
pub use progress::{PhaseProgress, SpeedCalculator};
pub use search::find_install_dir;
pub use validation::sanitize_entry_path;

/// Depth used when looking for an existing installation.
pub const INSTALL_SEARCH_DEPTH: usize = 3;

/// Errors produced while extracting an archive.
#[derive(Debug, thiserror::Error)]
pub enum ExtractError {
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("zip error: {0}")]
    Zip(#[from] zip::result::ZipError),

    #[error("unsafe archive entry: {0}")]
    UnsafeEntry(String),

    #[error("extraction cancelled")]
    Cancelled,
}
