use std::sync::Arc;

use clipstore_service::admin::AdminRepository;
use clipstore_service::gateway::StreamingGateway;
use clipstore_service::reaper::UploadReaper;
use clipstore_service::{StorageConfig, StorageEngine};

use crate::config::{Config, Storage};

/// Shared reference to the clipstore [service state](Services).
pub type ServiceState = Arc<Services>;

/// Reference to the clipstore business logic.
///
/// This structure is created during server startup and shared with all HTTP request handlers.
/// All components share the single [`StorageEngine`] created here.
///
/// In request handlers, use `axum::extract::State<ServiceState>` to retrieve a shared reference
/// to this structure.
#[derive(Debug)]
pub struct Services {
    /// The server configuration.
    pub config: Config,
    /// Uploads, downloads and video records.
    pub gateway: StreamingGateway,
    /// Administrator profiles.
    pub admin: AdminRepository,
}

impl Services {
    /// Opens the storage engine and spawns all background tasks.
    pub async fn spawn(config: Config) -> anyhow::Result<ServiceState> {
        let engine = StorageEngine::new(map_storage_config(&config.storage)).await?;

        let gateway = StreamingGateway::new(engine.clone(), config.gateway_options());
        let admin = AdminRepository::new(engine);

        let reaper = UploadReaper::new(gateway.chunks().clone(), config.upload.timeout);
        tokio::spawn(reaper.run(config.upload.reaper_interval));

        Ok(Arc::new(Self {
            config,
            gateway,
            admin,
        }))
    }

    /// Returns the playback URL of a stored video.
    pub fn playback_url(&self, object_id: &clipstore_service::id::ObjectId) -> String {
        let base = self.config.public_url.trim_end_matches('/');
        format!("{base}/videos/{object_id}")
    }
}

fn map_storage_config(config: &'_ Storage) -> StorageConfig<'_> {
    match config {
        Storage::FileSystem { path } => StorageConfig::FileSystem { path },
        Storage::Memory => StorageConfig::Memory,
    }
}
