use std::sync::Arc;

use crate::config::{AppConfig, JwtConfig};
use crate::email::{LogMailer, Mailer, SmtpMailer};
use crate::store::{mem::MemStore, pg::PgStore, Store};

#[derive(Clone)]
pub struct AppState {
    pub store: Arc<dyn Store>,
    pub mailer: Arc<dyn Mailer>,
    pub config: Arc<AppConfig>,
}

impl AppState {
    /// Composition root: connects the store, applies migrations, and picks
    /// the mailer. The store handle lives here and is passed by reference;
    /// no module-level connection exists.
    pub async fn init() -> anyhow::Result<Self> {
        let config = Arc::new(AppConfig::from_env()?);

        let store = PgStore::connect(&config.database_url).await?;
        if let Err(e) = store.migrate().await {
            tracing::warn!(error = %e, "migration failed; continuing");
        }

        let mailer: Arc<dyn Mailer> = match &config.smtp {
            Some(smtp) => Arc::new(SmtpMailer::new(smtp)?),
            None => {
                tracing::info!("SMTP not configured; emails will be logged only");
                Arc::new(LogMailer)
            }
        };

        Ok(Self {
            store: Arc::new(store),
            mailer,
            config,
        })
    }

    pub fn from_parts(
        store: Arc<dyn Store>,
        mailer: Arc<dyn Mailer>,
        config: Arc<AppConfig>,
    ) -> Self {
        Self {
            store,
            mailer,
            config,
        }
    }

    /// State wired to the in-memory store and log-only mailer; used by tests.
    pub fn in_memory() -> Self {
        let config = Arc::new(AppConfig {
            database_url: "unused".into(),
            jwt: JwtConfig {
                secret: "test-secret".into(),
                issuer: "test-issuer".into(),
                audience: "test-aud".into(),
                ttl_minutes: 60 * 24,
            },
            smtp: None,
        });
        Self {
            store: Arc::new(MemStore::new()),
            mailer: Arc::new(LogMailer),
            config,
        }
    }
}
