use anyhow::{Context, Result};
use redis::aio::ConnectionManager;
use redis::Client;
use std::sync::Arc;
use tokio::sync::Mutex;
use tracing::info;

/// Shared Redis connection manager guarded by a Tokio mutex.
///
/// The manager itself is cheap to clone; callers lock the mutex only long
/// enough to clone it out, then issue commands on their own copy.
pub type SharedConnectionManager = Arc<Mutex<ConnectionManager>>;

/// Async Redis connection pool.
pub struct RedisPool {
    manager: SharedConnectionManager,
}

impl RedisPool {
    /// Connect to Redis and initialize the shared connection manager.
    ///
    /// The connection manager reconnects transparently after transient
    /// failures, so a single pool can be shared for the lifetime of the
    /// process.
    pub async fn connect(redis_url: &str) -> Result<Self> {
        let client =
            Client::open(redis_url).context("failed to parse REDIS_URL connection string")?;
        let connection_manager = ConnectionManager::new(client)
            .await
            .context("failed to initialize Redis connection manager")?;

        info!("Redis connection manager initialized");

        Ok(Self {
            manager: Arc::new(Mutex::new(connection_manager)),
        })
    }

    pub fn manager(&self) -> SharedConnectionManager {
        self.manager.clone()
    }
}

/// Clone a command-ready connection out of the shared manager.
pub async fn connection(manager: &SharedConnectionManager) -> ConnectionManager {
    let guard = manager.lock().await;
    guard.clone()
}
