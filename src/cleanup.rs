use std::io::ErrorKind;
use std::path::Path;
use std::time::Duration;

use tracing::{info, warn};

/// Files older than this are removed by the periodic sweep.
pub const STALE_FILE_AGE: Duration = Duration::from_secs(60 * 60);
const SWEEP_INTERVAL: Duration = Duration::from_secs(10 * 60);

/// Removes the per-request temp file after a response has been dispatched.
/// Best effort; a missing file is not an error.
pub async fn cleanup_file(path: &Path) {
    match tokio::fs::remove_file(path).await {
        Ok(()) => info!("Cleaned up file: {}", path.display()),
        Err(error) if error.kind() == ErrorKind::NotFound => {}
        Err(error) => warn!("Could not clean up {}: {error}", path.display()),
    }
}

/// Background task: periodically deletes stale files from the shared
/// download directory.
pub async fn sweep_loop(temp_dir: std::path::PathBuf) {
    let mut ticker = tokio::time::interval(SWEEP_INTERVAL);
    loop {
        ticker.tick().await;
        sweep_stale_files(&temp_dir, STALE_FILE_AGE).await;
    }
}

/// Deletes anything in `temp_dir` whose modification time is older than
/// `max_age`. Subdirectories are removed recursively.
pub async fn sweep_stale_files(temp_dir: &Path, max_age: Duration) {
    let mut entries = match tokio::fs::read_dir(temp_dir).await {
        Ok(entries) => entries,
        Err(error) => {
            if error.kind() != ErrorKind::NotFound {
                warn!("Could not open temp dir for sweep: {error}");
            }
            return;
        }
    };

    let now = std::time::SystemTime::now();

    loop {
        let maybe_entry = match entries.next_entry().await {
            Ok(value) => value,
            Err(error) => {
                warn!("Could not iterate temp dir during sweep: {error}");
                break;
            }
        };

        let Some(entry) = maybe_entry else {
            break;
        };

        let path = entry.path();
        let metadata = match entry.metadata().await {
            Ok(metadata) => metadata,
            Err(error) => {
                warn!("Could not read metadata of {}: {error}", path.display());
                continue;
            }
        };

        let modified_at = match metadata.modified() {
            Ok(value) => value,
            Err(error) => {
                warn!("Could not read mtime of {}: {error}", path.display());
                continue;
            }
        };

        let age = now.duration_since(modified_at).unwrap_or(Duration::ZERO);
        if age < max_age {
            continue;
        }

        let removed = if metadata.is_dir() {
            tokio::fs::remove_dir_all(&path).await
        } else {
            tokio::fs::remove_file(&path).await
        };
        match removed {
            Ok(()) => info!("Swept stale temp entry: {}", path.display()),
            Err(error) if error.kind() == ErrorKind::NotFound => {}
            Err(error) => warn!("Could not sweep {}: {error}", path.display()),
        }
    }
}
