//! Garbage collection of abandoned uploads.
//!
//! Uploads are normally rolled back by the gateway as soon as they fail. Rollbacks that fail
//! themselves, uploads interrupted by a crash and uploads that simply stall are left in the
//! catalog as `Writing` or `Aborted` entries. The [`UploadReaper`] periodically purges those.

use std::time::{Duration, SystemTime};

use crate::catalog::UploadState;
use crate::chunks::ChunkStore;
use crate::error::Result;

/// Default time without progress after which a `Writing` upload is considered abandoned.
pub const DEFAULT_UPLOAD_TIMEOUT: Duration = Duration::from_secs(60 * 60);

/// Default interval between two reaper runs.
pub const DEFAULT_REAPER_INTERVAL: Duration = Duration::from_secs(60);

/// Purges stale uploads from a [`ChunkStore`].
#[derive(Clone, Debug)]
pub struct UploadReaper {
    chunks: ChunkStore,
    timeout: Duration,
}

impl UploadReaper {
    /// Creates a reaper that considers `Writing` uploads abandoned once no chunk has been written
    /// for `timeout`.
    pub fn new(chunks: ChunkStore, timeout: Duration) -> Self {
        Self { chunks, timeout }
    }

    /// Purges all stale uploads once, returning how many were removed.
    ///
    /// Failing to purge an individual upload is logged and does not stop the run.
    pub async fn reap_once(&self) -> Result<usize> {
        let cutoff = SystemTime::now()
            .checked_sub(self.timeout)
            .unwrap_or(SystemTime::UNIX_EPOCH);
        let stale = self.chunks.catalog().list_stale(cutoff).await?;

        let mut reaped = 0;
        for object in stale {
            let result = match object.state {
                UploadState::Writing => self.chunks.abort_upload(&object.id).await,
                _ => self.chunks.delete_object(&object.id).await,
            };

            match result {
                Ok(()) => reaped += 1,
                Err(error) => tracing::warn!(
                    object_id = %object.id,
                    error = &error as &dyn std::error::Error,
                    "failed to reap upload"
                ),
            }
        }

        if reaped > 0 {
            tracing::info!(reaped, "reaped stale uploads");
        }
        Ok(reaped)
    }

    /// Runs the reaper every `interval`, forever.
    ///
    /// This future is intended to be spawned as a background task alongside the service.
    pub async fn run(self, interval: Duration) {
        let mut ticker = tokio::time::interval(interval);
        ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);

        loop {
            ticker.tick().await;
            tracing::trace!("reaping stale uploads");
            if let Err(error) = self.reap_once().await {
                tracing::error!(
                    error = &error as &dyn std::error::Error,
                    "failed to list stale uploads"
                );
            }
        }
    }
}
