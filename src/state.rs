use std::sync::Arc;

use anyhow::Context;
use sqlx::PgPool;

use crate::config::{AppConfig, StoreBackend};
#[cfg(test)]
use crate::config::{GenerationConfig, IdentityConfig, StoreConfig};
use crate::documents::{
    memory::MemoryRecordStore, repo::PgRecordStore, store::RecordStore, tracker::RecordTracker,
};
use crate::generation::{gemini::GeminiClient, GenerationClient};

#[derive(Clone)]
pub struct AppState {
    pub config: Arc<AppConfig>,
    pub store: Arc<dyn RecordStore>,
    pub tracker: RecordTracker,
    pub generator: Arc<dyn GenerationClient>,
    /// Present for the postgres backend; used for migrations.
    pub db: Option<PgPool>,
}

impl AppState {
    pub async fn init() -> anyhow::Result<Self> {
        let config = Arc::new(AppConfig::from_env()?);

        let (store, db) = match config.store.backend {
            StoreBackend::Postgres => {
                let url = config
                    .store
                    .database_url
                    .as_deref()
                    .context("DATABASE_URL is not set")?;
                let db = sqlx::postgres::PgPoolOptions::new()
                    .max_connections(config.store.max_connections)
                    .connect(url)
                    .await
                    .context("connect to database")?;
                let store = Arc::new(PgRecordStore::new(
                    db.clone(),
                    config.store.require_ordered_index,
                )) as Arc<dyn RecordStore>;
                (store, Some(db))
            }
            StoreBackend::Memory => {
                tracing::warn!("using the in-memory record store; records are not persisted");
                (Arc::new(MemoryRecordStore::new()) as Arc<dyn RecordStore>, None)
            }
        };

        if config.generation.api_key.is_none() {
            tracing::warn!("GEMINI_API_KEY is not set; generate and simplify are disabled");
        }
        let generator = Arc::new(
            GeminiClient::new(&config.generation).context("build generation client")?,
        ) as Arc<dyn GenerationClient>;

        Ok(Self::from_parts(config, store, generator, db))
    }

    pub fn from_parts(
        config: Arc<AppConfig>,
        store: Arc<dyn RecordStore>,
        generator: Arc<dyn GenerationClient>,
        db: Option<PgPool>,
    ) -> Self {
        let tracker = RecordTracker::new(store.clone());
        Self {
            config,
            store,
            tracker,
            generator,
            db,
        }
    }
}

#[cfg(test)]
impl AppState {
    /// Test state over the given store; generation is unconfigured.
    pub fn with_store(store: Arc<dyn RecordStore>) -> Self {
        let generator = crate::generation::fake::ScriptedGenerator::new();
        Self::with_parts(store, Arc::new(generator))
    }

    pub fn with_parts(store: Arc<dyn RecordStore>, generator: Arc<dyn GenerationClient>) -> Self {
        let config = Arc::new(AppConfig {
            store: StoreConfig {
                backend: StoreBackend::Memory,
                database_url: None,
                max_connections: 1,
                require_ordered_index: true,
            },
            identity: IdentityConfig {
                secret: "test".into(),
                issuer: "test-issuer".into(),
                audience: "test-aud".into(),
            },
            generation: GenerationConfig::default(),
            recent_scanned_limit: 5,
        });
        Self::from_parts(config, store, generator, None)
    }

    pub fn fake() -> Self {
        Self::with_store(Arc::new(MemoryRecordStore::new()))
    }
}
