//! ClickHouse client wrapper.

use clickhouse::Client;
use tracing::info;

use beacon_core::Result;

use crate::config::ClickHouseConfig;
use crate::schema;

/// ClickHouse client wrapper.
#[derive(Clone)]
pub struct ClickHouseClient {
    inner: Client,
    config: ClickHouseConfig,
}

impl ClickHouseClient {
    /// Creates a new ClickHouse client.
    pub fn new(config: ClickHouseConfig) -> Result<Self> {
        let mut client = Client::default()
            .with_url(&config.url)
            .with_database(&config.database);

        if let Some(ref user) = config.username {
            client = client.with_user(user);
        }

        if let Some(ref pass) = config.password {
            client = client.with_password(pass);
        }

        info!(
            url = %config.url,
            database = %config.database,
            "Created ClickHouse client"
        );

        Ok(Self {
            inner: client,
            config,
        })
    }

    /// Returns the inner clickhouse client.
    pub fn inner(&self) -> &Client {
        &self.inner
    }

    /// Returns the configuration.
    pub fn config(&self) -> &ClickHouseConfig {
        &self.config
    }

    /// Creates the database and tables if they do not exist.
    pub async fn init_schema(&self) -> Result<()> {
        for ddl in schema::ALL_TABLES {
            self.inner
                .query(ddl)
                .execute()
                .await
                .map_err(|e| beacon_core::Error::storage(format!("Schema init error: {}", e)))?;
        }

        info!(database = %self.config.database, "ClickHouse schema initialized");
        Ok(())
    }
}
