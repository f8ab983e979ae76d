use std::sync::Arc;

use futures::StreamExt;
use tokio::task::JoinHandle;
use uuid::Uuid;

use crate::link::{GattLink, RemoteCharacteristic};
use crate::GattError;

/// Uniform access to one remote characteristic
#[derive(Clone)]
pub struct CharacteristicHandle {
    remote: RemoteCharacteristic,
    link: Arc<dyn GattLink>,
}

impl std::fmt::Debug for CharacteristicHandle {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CharacteristicHandle")
            .field("uuid", &self.remote.uuid)
            .field("service", &self.remote.service_uuid)
            .finish()
    }
}

impl CharacteristicHandle {
    pub fn new(remote: RemoteCharacteristic, link: Arc<dyn GattLink>) -> Self {
        Self { remote, link }
    }

    pub fn uuid(&self) -> Uuid {
        self.remote.uuid
    }

    pub fn service_uuid(&self) -> Uuid {
        self.remote.service_uuid
    }

    pub fn remote(&self) -> &RemoteCharacteristic {
        &self.remote
    }

    pub async fn read_bytes(&self) -> Result<Vec<u8>, GattError> {
        let value = self.link.read(&self.remote).await?;
        tracing::debug!(uuid = %self.remote.uuid, len = value.len(), "read");
        Ok(value)
    }

    /// Read and decode as UTF-8. Invalid sequences become U+FFFD.
    pub async fn read_text(&self) -> Result<String, GattError> {
        let value = self.read_bytes().await?;
        Ok(String::from_utf8_lossy(&value).into_owned())
    }

    /// Write as is. The transport enforces the PDU ceiling, not this call.
    pub async fn write_bytes(&self, value: &[u8]) -> Result<(), GattError> {
        tracing::debug!(uuid = %self.remote.uuid, len = value.len(), "write");
        self.link.write(&self.remote, value).await
    }

    /// UTF-8 encode and write. Empty text issues no write at all.
    pub async fn write_text(&self, text: &str) -> Result<(), GattError> {
        if text.is_empty() {
            return Ok(());
        }
        self.write_bytes(text.as_bytes()).await
    }

    /// Enable notifications and run `handler` once per notification.
    ///
    /// Delivery stops when the returned [`Subscription`] is dropped.
    pub async fn subscribe<F>(&self, mut handler: F) -> Result<Subscription, GattError>
    where
        F: FnMut(Vec<u8>) + Send + 'static,
    {
        // take the stream first so nothing sent right after enabling is lost
        let mut stream = self.link.notifications().await?;
        self.link.subscribe(&self.remote).await?;
        tracing::debug!(uuid = %self.remote.uuid, "subscribed");

        let uuid = self.remote.uuid;
        let task = tokio::spawn(async move {
            while let Some(notification) = stream.next().await {
                if notification.uuid == uuid {
                    tracing::trace!(%uuid, len = notification.value.len(), "notification");
                    handler(notification.value);
                }
            }
        });

        Ok(Subscription { uuid, task })
    }
}

/// Notification delivery for one characteristic
#[derive(Debug)]
pub struct Subscription {
    uuid: Uuid,
    task: JoinHandle<()>,
}

impl Subscription {
    pub fn uuid(&self) -> Uuid {
        self.uuid
    }

    pub fn cancel(self) {
        self.task.abort();
    }
}

impl Drop for Subscription {
    fn drop(&mut self) {
        self.task.abort();
    }
}
