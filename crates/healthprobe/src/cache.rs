//! Lazily created, explicitly released client slot for checks that hold a connection.

use async_trait::async_trait;
use tokio::sync::Mutex;
use tracing::debug;

/// Creates and tears down the client a check talks to its backend through.
#[async_trait]
pub trait Connector: Send + Sync {
    type Client: Clone + Send + Sync + 'static;

    /// Build a new client
    async fn connect(&self) -> anyhow::Result<Self::Client>;

    /// Close a client previously returned by [`Connector::connect`]
    async fn close(&self, client: Self::Client) -> anyhow::Result<()> {
        drop(client);
        Ok(())
    }
}

/// Single-client cache owned by one check instance.
///
/// The client is created on first use and reused until [`ClientCache::release`]
/// or [`ClientCache::invalidate`] empties the slot. The slot is locked while
/// a client is being created, so concurrent first use builds one client.
pub struct ClientCache<C: Connector> {
    connector: C,
    slot: Mutex<Option<C::Client>>,
}

impl<C: Connector> ClientCache<C> {
    pub fn new(connector: C) -> Self {
        Self {
            connector,
            slot: Mutex::new(None),
        }
    }

    /// Return the cached client, creating it if the slot is empty.
    pub async fn get_or_create(&self) -> anyhow::Result<C::Client> {
        let mut slot = self.slot.lock().await;
        if let Some(client) = slot.as_ref() {
            return Ok(client.clone());
        }

        let client = self.connector.connect().await?;
        debug!("Created cached client");
        *slot = Some(client.clone());
        Ok(client)
    }

    /// Close and clear the cached client. A no-op when the slot is empty.
    pub async fn release(&self) -> anyhow::Result<()> {
        let client = self.slot.lock().await.take();
        match client {
            Some(client) => {
                debug!("Releasing cached client");
                self.connector.close(client).await
            }
            None => Ok(()),
        }
    }

    /// Drop the cached client after an error, ignoring close failures.
    pub async fn invalidate(&self) {
        if let Err(e) = self.release().await {
            debug!(error = %e, "Failed to close invalidated client");
        }
    }

    /// Whether a client is currently cached
    pub async fn is_cached(&self) -> bool {
        self.slot.lock().await.is_some()
    }

    pub fn connector(&self) -> &C {
        &self.connector
    }
}
