use crate::backends;
use crate::config::AppConfig;
use crate::profiles::services::ProfileService;
use crate::storage::{ArtifactStore, LocalArtifacts};
use std::sync::Arc;

#[derive(Clone)]
pub struct AppState {
    pub profiles: ProfileService,
    pub config: Arc<AppConfig>,
}

impl AppState {
    /// Connects the configured backend. Fails if the store is unreachable.
    pub async fn init(config: AppConfig) -> anyhow::Result<Self> {
        let config = Arc::new(config);
        let repo = backends::connect(&config).await?;
        let files = Arc::new(LocalArtifacts::new(
            config.images_dir.clone(),
            config.pages_dir.clone(),
        )) as Arc<dyn ArtifactStore>;

        Ok(Self {
            profiles: ProfileService::new(repo, files, config.store_timeout),
            config,
        })
    }

    /// In-memory store with artifacts under `dir`.
    #[cfg(test)]
    pub fn fake(dir: &std::path::Path) -> Self {
        use crate::backends::memory::InMemoryProfileRepository;

        let mut config = AppConfig::from_lookup(|_| None).expect("default config");
        config.images_dir = dir.join("images");
        config.pages_dir = dir.join("html_pages");

        let repo = Arc::new(InMemoryProfileRepository::new());
        let files = Arc::new(LocalArtifacts::new(
            config.images_dir.clone(),
            config.pages_dir.clone(),
        )) as Arc<dyn ArtifactStore>;

        Self {
            profiles: ProfileService::new(repo, files, config.store_timeout),
            config: Arc::new(config),
        }
    }
}
