pub mod document;
#[cfg(test)]
pub(crate) mod memory;
pub mod relational;
pub mod wide_column;

use anyhow::Context;
use std::sync::Arc;
use tracing::info;

use crate::config::{AppConfig, Backend};
use crate::profiles::repo::ProfileRepository;

pub use document::DocumentStoreRepository;
pub use relational::RelationalRepository;
pub use wide_column::WideColumnRepository;

/// Opens the configured backend. Called once at startup; any error here
/// should abort the process.
pub async fn connect(config: &AppConfig) -> anyhow::Result<Arc<dyn ProfileRepository>> {
    let timeout = config.connect_timeout;
    info!(backend = ?config.backend, ?timeout, "connecting profile store");

    let connecting = async {
        let repo: Arc<dyn ProfileRepository> = match config.backend {
            Backend::Document => {
                Arc::new(DocumentStoreRepository::connect(&config.document, timeout).await?)
            }
            Backend::WideColumn => {
                Arc::new(WideColumnRepository::connect(&config.wide_column, timeout).await?)
            }
            Backend::Relational => {
                Arc::new(RelationalRepository::connect(&config.relational, timeout).await?)
            }
        };
        anyhow::Ok(repo)
    };

    // whole bootstrap: connect, schema checks, statement preparation
    tokio::time::timeout(timeout * 3, connecting)
        .await
        .with_context(|| format!("profile store did not come up within {:?}", timeout * 3))?
}
