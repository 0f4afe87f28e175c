use std::sync::Arc;
use std::time::Duration;

use tokio::sync::RwLock;
use tokio_postgres::{Client, NoTls, Row};

use crate::eventstore::StoreError;

/// Shared PostgreSQL session that connects on first use and reconnects on
/// the next call after the backend connection has gone away.
#[derive(Clone)]
pub struct PostgresClient {
    pg_url: Arc<str>,
    connect_timeout: Duration,
    bootstrap_sql: Arc<str>,
    client: Arc<RwLock<Option<Arc<Client>>>>,
}

impl PostgresClient {
    pub fn new(pg_url: &str, connect_timeout: Duration) -> Self {
        Self {
            pg_url: Arc::from(pg_url),
            connect_timeout,
            bootstrap_sql: Arc::from(""),
            client: Arc::new(RwLock::new(None)),
        }
    }

    /// SQL batch executed on every freshly opened session (schema setup).
    pub fn with_bootstrap(mut self, sql: impl Into<String>) -> Self {
        self.bootstrap_sql = Arc::from(sql.into());
        self
    }

    async fn open(&self) -> Result<Arc<Client>, StoreError> {
        let (client, connection) =
            tokio::time::timeout(self.connect_timeout, tokio_postgres::connect(&self.pg_url, NoTls))
                .await
                .map_err(|_| StoreError::ConnectTimeout(self.connect_timeout))??;

        // Drive the connection in the background
        tokio::spawn(async move {
            if let Err(e) = connection.await {
                tracing::error!("Postgres connection error: {e}");
            }
        });

        if !self.bootstrap_sql.is_empty() {
            client.batch_execute(&self.bootstrap_sql).await?;
        }

        tracing::info!("Postgres session opened");
        Ok(Arc::new(client))
    }

    /// Current live client, opening a new session if there is none.
    pub async fn session(&self) -> Result<Arc<Client>, StoreError> {
        if let Some(client) = self.client.read().await.as_ref() {
            if !client.is_closed() {
                return Ok(client.clone());
            }
        }

        let mut guard = self.client.write().await;
        // Another request may have reconnected while we waited for the lock.
        if let Some(client) = guard.as_ref() {
            if !client.is_closed() {
                return Ok(client.clone());
            }
            tracing::warn!("Postgres session closed, reconnecting");
        }

        let client = self.open().await?;
        *guard = Some(client.clone());
        Ok(client)
    }

    pub async fn query_one(
        &self,
        sql: &str,
        params: &[&(dyn tokio_postgres::types::ToSql + Sync)],
    ) -> Result<Row, StoreError> {
        let client = self.session().await?;
        Ok(client.query_one(sql, params).await?)
    }
}
