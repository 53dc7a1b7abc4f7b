//! Connector for PostgreSQL.

use crate::dequeuer::PgDequeuer;
use crate::enqueuer::PgEnqueuer;
use crate::error::classify;
use crate::message::PgMessage;
use crate::options::PgSettings;
use async_trait::async_trait;
use sqlx::postgres::{PgConnectOptions, PgPool, PgPoolOptions};
use std::time::Duration;
use tracing::{debug, info};
use txqueue::{Capabilities, Connector, QueueConfig, QueueError};

const ACQUIRE_TIMEOUT: Duration = Duration::from_secs(30);

/// Opens one connection pool per capability.
///
/// The queue must already be declared with [`crate::declare_queue`] and the
/// schema installed with [`crate::install_schema`].
#[derive(Debug, Clone, Default)]
pub struct PgConnector;

impl PgConnector {
    pub fn new() -> Self {
        Self
    }
}

/// Open a pool and check it can reach the server
async fn open_pool(
    options: &PgConnectOptions,
    max_connections: u32,
    role: &'static str,
) -> Result<PgPool, QueueError> {
    let pool = PgPoolOptions::new()
        .max_connections(max_connections)
        .acquire_timeout(ACQUIRE_TIMEOUT)
        .connect_with(options.clone())
        .await
        .map_err(|e| QueueError::connection(format!("{role} pool: {e}")))?;

    if let Err(err) = sqlx::query("SELECT 1").execute(&pool).await {
        pool.close().await;
        return Err(match classify(err) {
            QueueError::ConnectionFailed { message } => {
                QueueError::connection(format!("{role} ping: {message}"))
            }
            other => other,
        });
    }

    Ok(pool)
}

#[async_trait]
impl Connector for PgConnector {
    type Message = PgMessage;

    fn backend(&self) -> &'static str {
        "postgres"
    }

    async fn connect(&self, config: &QueueConfig) -> Result<Capabilities<PgMessage>, QueueError> {
        let settings = PgSettings::from_config(config)?;
        let queue = config.queue_name().clone();

        info!(
            queue = %queue,
            host = settings.connect_options.get_host(),
            max_connections = settings.max_connections,
            "Connecting to PostgreSQL"
        );

        let producer = open_pool(&settings.connect_options, settings.max_connections, "enqueuer").await?;
        let consumer =
            match open_pool(&settings.connect_options, settings.max_connections, "dequeuer").await {
                Ok(pool) => pool,
                Err(err) => {
                    producer.close().await;
                    return Err(err);
                }
            };

        debug!(queue = %queue, "PostgreSQL pools ready");
        Ok((
            Box::new(PgEnqueuer::new(producer, queue.clone())),
            Box::new(PgDequeuer::new(
                consumer,
                queue,
                settings.poll_interval,
                settings.connect_options,
            )),
        ))
    }
}
