//! Best-effort release of a run's ephemeral files.
//!
//! Deletion failures are logged and counted but never abort the remaining
//! paths. Callers guarantee a given run's paths are released once; the
//! registry's remove-once semantics enforce that.

use std::io::ErrorKind;
use std::path::{Path, PathBuf};

use tracing::{debug, warn};

/// Outcome of one [`release`] call.
#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct CleanupReport {
    /// Paths that existed and were deleted.
    pub removed: Vec<PathBuf>,
    /// Paths that did not exist (never created, or already gone).
    pub missing: Vec<PathBuf>,
    /// Paths whose deletion failed, with the error text.
    pub failed: Vec<(PathBuf, String)>,
}

impl CleanupReport {
    /// Whether every path is gone.
    #[must_use]
    pub fn is_clean(&self) -> bool {
        self.failed.is_empty()
    }
}

/// Delete every path in `resources`, in order.
pub async fn release<P: AsRef<Path>>(resources: &[P]) -> CleanupReport {
    let mut report = CleanupReport::default();

    for path in resources {
        let path = path.as_ref();
        match tokio::fs::remove_file(path).await {
            Ok(()) => {
                debug!(path = %path.display(), "resource removed");
                report.removed.push(path.to_owned());
            }
            Err(err) if err.kind() == ErrorKind::NotFound => {
                report.missing.push(path.to_owned());
            }
            Err(err) => {
                warn!(path = %path.display(), %err, "failed to remove resource");
                report.failed.push((path.to_owned(), err.to_string()));
            }
        }
    }

    report
}
