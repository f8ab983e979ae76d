use std::collections::HashMap;
use std::collections::hash_map::Entry;
use std::sync::Arc;

use futures::future::try_join_all;
use microbit_proto::ServiceDescriptor;
use uuid::Uuid;

use crate::characteristic::CharacteristicHandle;
use crate::link::{GattLink, RemoteService};
use crate::service::ServiceHandle;
use crate::GattError;

/// Where a UUID lives in the two-level service/characteristic tree
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Location {
    Service(usize),
    Characteristic { service: usize, index: usize },
}

/// Flat UUID index over the service tree.
///
/// Every UUID may be registered once; a second registration is an error
/// rather than silently replacing the first.
#[derive(Debug, Default)]
pub struct FacadeIndex {
    entries: HashMap<Uuid, Location>,
}

impl FacadeIndex {
    pub fn register_service(&mut self, uuid: Uuid, service: usize) -> Result<(), GattError> {
        self.insert(uuid, Location::Service(service))
    }

    pub fn register_characteristic(
        &mut self,
        uuid: Uuid,
        service: usize,
        index: usize,
    ) -> Result<(), GattError> {
        self.insert(uuid, Location::Characteristic { service, index })
    }

    pub fn get(&self, uuid: &Uuid) -> Option<Location> {
        self.entries.get(uuid).copied()
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    fn insert(&mut self, uuid: Uuid, location: Location) -> Result<(), GattError> {
        match self.entries.entry(uuid) {
            Entry::Occupied(_) => Err(GattError::DuplicateUuid(uuid)),
            Entry::Vacant(slot) => {
                slot.insert(location);
                Ok(())
            }
        }
    }
}

/// The connected GATT server, with every declared service and
/// characteristic resolved and indexed by UUID.
pub struct GattServerFacade {
    link: Arc<dyn GattLink>,
    services: Vec<ServiceHandle>,
    index: FacadeIndex,
}

impl GattServerFacade {
    /// Resolve `profile` against a live connection.
    ///
    /// All primary service lookups settle before any characteristic lookup
    /// starts. Any missing service or characteristic fails the whole call.
    pub async fn resolve(
        link: Arc<dyn GattLink>,
        profile: &[ServiceDescriptor],
    ) -> Result<Self, GattError> {
        let declared = parse_profile(profile)?;
        let service_uuids: Vec<Uuid> = declared.iter().map(|(s, _)| *s).collect();

        let remotes = resolve_primary_services(&link, &service_uuids).await?;
        tracing::debug!(count = remotes.len(), "resolved primary services");

        let services = try_join_all(
            remotes
                .into_iter()
                .zip(declared)
                .map(|(remote, (_, chars))| ServiceHandle::resolve(link.clone(), remote, chars)),
        )
        .await?;

        let index = build_index(&services)?;
        Ok(Self { link, services, index })
    }

    pub fn link(&self) -> &Arc<dyn GattLink> {
        &self.link
    }

    pub fn services(&self) -> &[ServiceHandle] {
        &self.services
    }

    pub fn index(&self) -> &FacadeIndex {
        &self.index
    }

    pub fn service(&self, uuid: Uuid) -> Option<&ServiceHandle> {
        match self.index.get(&uuid)? {
            Location::Service(i) => self.services.get(i),
            Location::Characteristic { .. } => None,
        }
    }

    pub fn characteristic(&self, uuid: Uuid) -> Option<&CharacteristicHandle> {
        match self.index.get(&uuid)? {
            Location::Characteristic { service, index } => {
                self.services.get(service)?.characteristics().get(index)
            }
            Location::Service(_) => None,
        }
    }

    /// Lookup by registry string, e.g. `profile::LED_TEXT`
    pub fn characteristic_by_str(&self, uuid: &str) -> Option<&CharacteristicHandle> {
        self.characteristic(Uuid::parse_str(uuid).ok()?)
    }

    /// Every characteristic, flattened in (service, characteristic) profile order
    pub fn resolve_all_characteristics(&self) -> impl Iterator<Item = &CharacteristicHandle> {
        self.services.iter().flat_map(|s| s.characteristics())
    }

    pub async fn is_connected(&self) -> bool {
        match self.link.is_connected().await {
            Ok(connected) => connected,
            Err(e) => {
                tracing::warn!("failed to query connection state: {e}");
                false
            }
        }
    }

    pub async fn disconnect(&self) -> Result<(), GattError> {
        self.link.disconnect().await
    }
}

impl std::fmt::Debug for GattServerFacade {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("GattServerFacade")
            .field("device", &self.link.name())
            .field("services", &self.services)
            .finish()
    }
}

fn parse_profile(profile: &[ServiceDescriptor]) -> Result<Vec<(Uuid, Vec<Uuid>)>, GattError> {
    profile
        .iter()
        .map(|d| {
            let service = Uuid::parse_str(d.service)?;
            let chars = d
                .characteristics
                .iter()
                .map(|c| Uuid::parse_str(c))
                .collect::<Result<Vec<_>, _>>()?;
            Ok((service, chars))
        })
        .collect()
}

/// Look up every service concurrently, keeping the declared order
async fn resolve_primary_services(
    link: &Arc<dyn GattLink>,
    uuids: &[Uuid],
) -> Result<Vec<RemoteService>, GattError> {
    try_join_all(uuids.iter().map(|uuid| link.primary_service(*uuid))).await
}

fn build_index(services: &[ServiceHandle]) -> Result<FacadeIndex, GattError> {
    let mut index = FacadeIndex::default();
    for (i, service) in services.iter().enumerate() {
        index.register_service(service.uuid(), i)?;
        for (j, c) in service.characteristics().iter().enumerate() {
            index.register_characteristic(c.uuid(), i, j)?;
        }
    }
    Ok(index)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn index_rejects_second_registration() {
        let uuid = Uuid::from_u128(0x2a24);
        let mut index = FacadeIndex::default();
        index.register_service(Uuid::from_u128(0x180a), 0).unwrap();
        index.register_characteristic(uuid, 0, 0).unwrap();
        assert!(matches!(
            index.register_characteristic(uuid, 0, 1),
            Err(GattError::DuplicateUuid(u)) if u == uuid
        ));
        assert_eq!(index.get(&uuid), Some(Location::Characteristic { service: 0, index: 0 }));
        assert_eq!(index.len(), 2);
    }

    #[test]
    fn profile_parses() {
        let parsed = parse_profile(microbit_proto::PROFILE).unwrap();
        assert_eq!(parsed.len(), 4);
        assert_eq!(parsed[0].1.len(), 2);
        assert_eq!(parsed[2].1.len(), 3);
    }

    #[test]
    fn bad_profile_uuid_is_reported() {
        let profile = [ServiceDescriptor { service: "not-a-uuid", characteristics: &[] }];
        assert!(matches!(parse_profile(&profile), Err(GattError::InvalidUuid(_))));
    }
}
