use crate::app::config::{FirestoreConfig, StorageBackend};
use crate::app::lifecycle::context::StartupContext;
use crate::core::pipeline::AsyncTask;
use crate::core::store::{FirestoreStore, LocalStore, Store};
use anyhow::{Error, anyhow, bail};
use async_trait::async_trait;
use firestore::{FirestoreDb, FirestoreDbOptions};
use std::sync::Arc;
use tracing::info;

async fn connect_firestore(config: &FirestoreConfig) -> Result<FirestoreDb, Error> {
    let mut options = FirestoreDbOptions::new(config.project_id.clone());

    if let Some(db_id) = &config.database_id {
        options = options.with_database_id(db_id.clone());
    }

    if let Some(host) = &config.emulator_host {
        options = options.with_firebase_api_url(format!("http://{}", host));
    }

    let db = if let Some(path) = &config.credentials_path {
        FirestoreDb::with_options_service_account_key_file(options, path.clone().into()).await?
    } else {
        FirestoreDb::with_options(options).await?
    };

    Ok(db)
}

/// Picks and connects the persistence backend.
pub struct StoreInitTask;

#[async_trait]
impl AsyncTask<StartupContext, Error> for StoreInitTask {
    async fn run(&self, context: &StartupContext) -> Result<(), Error> {
        let config = context.config.get().ok_or(anyhow!("Config missing during store init"))?;

        let store: Arc<dyn Store> = match config.storage.backend {
            StorageBackend::Local => {
                info!("Using in-memory store");
                Arc::new(LocalStore::new())
            }
            StorageBackend::Firestore => {
                let Some(firestore_config) = &config.storage.firestore else {
                    bail!("storage.backend is firestore but no firestore config present");
                };

                let db = connect_firestore(firestore_config).await?;
                info!("Connected to Firestore project {}", firestore_config.project_id);
                Arc::new(FirestoreStore::new(db))
            }
        };

        context
            .store
            .set(store)
            .map_err(|_| anyhow!("Store already set on startup context"))?;

        Ok(())
    }
}
