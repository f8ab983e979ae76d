use std::sync::Arc;

use futures::future::try_join_all;
use uuid::Uuid;

use crate::characteristic::CharacteristicHandle;
use crate::link::{GattLink, RemoteService};
use crate::GattError;

/// One remote service and the characteristics declared for it
pub struct ServiceHandle {
    remote: RemoteService,
    declared: Vec<Uuid>,
    characteristics: Vec<CharacteristicHandle>,
}

impl ServiceHandle {
    /// Resolve every declared characteristic of `remote`.
    pub async fn resolve(
        link: Arc<dyn GattLink>,
        remote: RemoteService,
        declared: Vec<Uuid>,
    ) -> Result<Self, GattError> {
        let characteristics = resolve_characteristics(&link, &remote, &declared).await?;
        tracing::debug!(
            uuid = %remote.uuid,
            count = characteristics.len(),
            "resolved characteristics"
        );
        Ok(Self { remote, declared, characteristics })
    }

    pub fn uuid(&self) -> Uuid {
        self.remote.uuid
    }

    /// Declared characteristic UUIDs, in profile order
    pub fn declared(&self) -> &[Uuid] {
        &self.declared
    }

    /// Live characteristics, in the same order as [`Self::declared`]
    pub fn characteristics(&self) -> &[CharacteristicHandle] {
        &self.characteristics
    }

    pub fn characteristic(&self, uuid: Uuid) -> Option<&CharacteristicHandle> {
        self.characteristics.iter().find(|c| c.uuid() == uuid)
    }
}

impl std::fmt::Debug for ServiceHandle {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ServiceHandle")
            .field("uuid", &self.remote.uuid)
            .field("characteristics", &self.characteristics)
            .finish()
    }
}

/// Look up all `declared` characteristics concurrently. The result keeps the
/// declared order.
async fn resolve_characteristics(
    link: &Arc<dyn GattLink>,
    remote: &RemoteService,
    declared: &[Uuid],
) -> Result<Vec<CharacteristicHandle>, GattError> {
    if let Some(blocked) = declared.iter().find(|u| microbit_proto::is_blocklisted(u)) {
        return Err(GattError::Blocklisted(*blocked));
    }

    let lookups = declared.iter().map(|uuid| link.characteristic(remote, *uuid));
    let found = try_join_all(lookups).await?;

    Ok(found
        .into_iter()
        .map(|c| CharacteristicHandle::new(c, link.clone()))
        .collect())
}
