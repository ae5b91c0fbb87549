//! User-visible notifications. Setup failures are easy to miss in a
//! daemon's log, so in addition to logging them we leave a note in
//! the storage directory telling the user what broke and that the
//! daemon needs a restart once it's fixed.

use arlo_api::Error;
use std::path::Path;
use tracing::{error, warn};

const NOTIFICATION_FILE: &str = "notification.txt";

pub async fn setup_failed(storage_dir: &Path, err: &Error) {
    error!("unable to connect to the cloud service -- {}", err);

    let note = format!(
        "Error: {}\nYou will need to restart arlod after fixing this.\n",
        err
    );

    if let Err(e) = tokio::fs::create_dir_all(storage_dir).await {
        warn!(
            "couldn't create storage directory {} -- {}",
            storage_dir.display(),
            e
        );
        return;
    }

    let path = storage_dir.join(NOTIFICATION_FILE);

    if let Err(e) = tokio::fs::write(&path, note).await {
        warn!("couldn't record notification {} -- {}", path.display(), e)
    }
}

/// Clears a stale note once a setup has gone through.

pub async fn clear(storage_dir: &Path) {
    let path = storage_dir.join(NOTIFICATION_FILE);

    if tokio::fs::try_exists(&path).await.unwrap_or(false) {
        if let Err(e) = tokio::fs::remove_file(&path).await {
            warn!("couldn't clear notification {} -- {}", path.display(), e)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_notification_lifecycle() {
        let dir = tempfile::tempdir().unwrap();
        let storage = dir.path().join("state");
        let err = Error::TimeoutError;

        // The note lands even when the storage directory doesn't
        // exist yet.

        setup_failed(&storage, &err).await;

        let note = tokio::fs::read_to_string(
            storage.join(NOTIFICATION_FILE),
        )
        .await
        .unwrap();

        assert!(note.contains("timeout"));
        assert!(note.contains("restart"));

        clear(&storage).await;

        assert!(!storage.join(NOTIFICATION_FILE).exists());

        // Clearing again is a no-op.

        clear(&storage).await;
    }
}
