//! Wiring shared by every command that touches runs.
//!
//! A command builds one [`Coordinator`] per invocation: the metadata store
//! from the configured database URL, plus the Fabric job client and OneLake
//! reader with their bearer tokens.

use crate::cli::config::PortalConfig;
use crate::cli::error::HelpfulError;
use portal_coordinator::Coordinator;
use portal_db::{DbConfig, PortalDb};
use portal_jobs::{FabricJobClient, OneLakeArtifactReader, StaticToken};
use std::sync::Arc;
use tracing::debug;

/// Open the metadata store named by the config.
pub async fn open_store(config: &PortalConfig) -> Result<PortalDb, HelpfulError> {
    let url = config.database_url();
    if config.database.url.is_none() {
        // The default database lives in the portal home, which may not exist yet.
        std::fs::create_dir_all(&config.home)
            .map_err(|e| HelpfulError::store_unavailable(&url, &e.to_string()))?;
    }

    let mut db_config = DbConfig::from_url(url.as_str())
        .map_err(|e| HelpfulError::store_unavailable(&url, &e.to_string()))?;
    if let Some(max) = config.database.max_connections {
        db_config = db_config.with_max_connections(max);
    }

    debug!(database = %url, "Opening metadata store");
    PortalDb::connect(&db_config)
        .await
        .map_err(|e| HelpfulError::store_unavailable(&url, &e.to_string()))
}

/// Build the coordinator for this invocation.
pub async fn coordinator(config: &PortalConfig) -> Result<Coordinator, HelpfulError> {
    let db = open_store(config).await?;

    let api_token = Arc::new(StaticToken::from_option(
        "api",
        config.fabric.access_token.clone(),
    ));
    let storage_token = Arc::new(StaticToken::from_option(
        "storage",
        config.onelake.storage_token.clone(),
    ));
    let jobs = Arc::new(FabricJobClient::new(config.fabric_settings(), api_token));
    let artifacts = Arc::new(OneLakeArtifactReader::new(
        config.onelake_settings(),
        storage_token,
    ));

    Ok(Coordinator::new(db, jobs, artifacts).with_app_version(config.app_version()))
}

/// One current-thread runtime per command.
pub fn runtime() -> anyhow::Result<tokio::runtime::Runtime> {
    Ok(tokio::runtime::Builder::new_current_thread()
        .enable_all()
        .build()?)
}
