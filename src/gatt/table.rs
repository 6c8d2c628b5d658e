use parking_lot::Mutex;
use tracing::{debug, info};

use crate::{Descriptor, Uuid};

use super::*;

/// Service kind ([Vol 3] Part G, Section 3.1).
#[derive(Clone, Copy, Debug, Default, Eq, Hash, PartialEq, serde::Serialize)]
#[serde(rename_all = "camelCase")]
pub enum ServiceKind {
    #[default]
    Primary,
    Secondary,
}

/// Registered service.
#[derive(Clone, Debug, Eq, PartialEq)]
pub struct ServiceDef {
    pub uuid: Uuid,
    pub kind: ServiceKind,
    pub characteristics: Vec<CharacteristicDef>,
}

impl ServiceDef {
    /// Returns the service UUID.
    #[inline(always)]
    #[must_use]
    pub const fn uuid(&self) -> Uuid {
        self.uuid
    }

    /// Returns the characteristic with the specified UUID.
    #[must_use]
    pub fn characteristic(&self, uuid: Uuid) -> Option<&CharacteristicDef> {
        self.characteristics.iter().find(|c| c.uuid == uuid)
    }

    #[inline]
    fn characteristic_mut(&mut self, uuid: Uuid) -> Option<&mut CharacteristicDef> {
        self.characteristics.iter_mut().find(|c| c.uuid == uuid)
    }
}

/// Registered characteristic. Every characteristic owns exactly one Client
/// Characteristic Configuration descriptor.
#[derive(Clone, Debug, Eq, PartialEq)]
pub struct CharacteristicDef {
    pub uuid: Uuid,
    pub props: Prop,
    pub perms: Perm,
    pub value: Vec<u8>,
    pub descriptors: Vec<DescriptorDef>,
}

impl CharacteristicDef {
    /// Creates a characteristic with an auto-attached CCCD.
    #[must_use]
    pub fn new(uuid: Uuid, props: Prop, perms: Perm, value: Vec<u8>) -> Self {
        let cccd = DescriptorDef {
            uuid: Descriptor::ClientCharacteristicConfiguration.uuid(),
            perms: Perm::READ_WRITE,
            value: Cccd::Indicate.value().to_vec(),
        };
        Self {
            uuid,
            props,
            perms,
            value,
            descriptors: vec![cccd],
        }
    }

    /// Attaches a Characteristic User Description descriptor
    /// ([Vol 3] Part G, Section 3.3.3.2).
    #[must_use]
    pub fn with_description(mut self, s: &str) -> Self {
        let uuid = Descriptor::CharacteristicUserDescription.uuid();
        self.descriptors.retain(|d| d.uuid != uuid);
        self.descriptors.push(DescriptorDef {
            uuid,
            perms: Perm::READ_WRITE,
            value: s.as_bytes().to_vec(),
        });
        self
    }

    /// Returns the descriptor with the specified UUID.
    #[must_use]
    pub fn descriptor(&self, uuid: Uuid) -> Option<&DescriptorDef> {
        self.descriptors.iter().find(|d| d.uuid == uuid)
    }

    /// Returns the Client Characteristic Configuration descriptor.
    #[inline]
    #[must_use]
    pub fn cccd(&self) -> Option<&DescriptorDef> {
        self.descriptor(Descriptor::ClientCharacteristicConfiguration.uuid())
    }

    #[inline]
    fn descriptor_mut(&mut self, uuid: Uuid) -> Option<&mut DescriptorDef> {
        self.descriptors.iter_mut().find(|d| d.uuid == uuid)
    }
}

/// Registered descriptor.
#[derive(Clone, Debug, Eq, PartialEq)]
pub struct DescriptorDef {
    pub uuid: Uuid,
    pub perms: Perm,
    pub value: Vec<u8>,
}

impl DescriptorDef {
    /// Returns whether this is a Client Characteristic Configuration
    /// descriptor.
    #[inline]
    #[must_use]
    pub fn is_cccd(&self) -> bool {
        Descriptor::of(self.uuid) == Some(Descriptor::ClientCharacteristicConfiguration)
    }
}

/// Registry of services in registration order. Characteristics are addressed
/// by [`CharRef`] keys that are resolved on every access.
#[derive(Debug, Default)]
pub struct AttributeTable {
    services: Mutex<Vec<ServiceDef>>,
}

impl AttributeTable {
    /// Creates an empty table.
    #[inline]
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Validates and registers a service. Registering a UUID that is already
    /// present succeeds without changing the table.
    pub fn add_service(&self, d: &ServiceDescriptor) -> Result<()> {
        self.insert(d.parse()?);
        Ok(())
    }

    /// Registers a parsed service. Returns `false` if a service with the same
    /// UUID is already present.
    pub fn insert(&self, svc: ServiceDef) -> bool {
        let mut services = self.services.lock();
        if services.iter().any(|s| s.uuid == svc.uuid) {
            debug!("Service {} already registered", svc.uuid);
            return false;
        }
        info!(
            "Registered service {} with {} characteristic(s)",
            svc.uuid,
            svc.characteristics.len()
        );
        services.push(svc);
        true
    }

    /// Removes a service.
    pub fn remove_service(&self, uuid: Uuid) -> Option<ServiceDef> {
        let mut services = self.services.lock();
        let i = services.iter().position(|s| s.uuid == uuid)?;
        debug!("Removed service {uuid}");
        Some(services.remove(i))
    }

    /// Removes all services, returning them in registration order.
    pub fn remove_all_services(&self) -> Vec<ServiceDef> {
        std::mem::take(&mut *self.services.lock())
    }

    /// Finds a characteristic by UUID across all services. If the UUID is
    /// used in more than one service, the first registered one wins.
    #[must_use]
    pub fn lookup_characteristic(&self, uuid: Uuid) -> Option<CharRef> {
        (self.services.lock().iter()).find_map(|s| {
            (s.characteristic(uuid)).map(|c| CharRef::new(s.uuid, c.uuid))
        })
    }

    /// Returns a copy of all services in registration order.
    #[must_use]
    pub fn snapshot(&self) -> Vec<ServiceDef> {
        self.services.lock().clone()
    }

    /// Returns a copy of the specified service.
    #[must_use]
    pub fn service(&self, uuid: Uuid) -> Option<ServiceDef> {
        (self.services.lock().iter()).find(|s| s.uuid == uuid).cloned()
    }

    /// Returns whether the service is registered.
    #[must_use]
    pub fn contains(&self, uuid: Uuid) -> bool {
        self.services.lock().iter().any(|s| s.uuid == uuid)
    }

    /// Returns whether the table is empty.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.services.lock().is_empty()
    }

    /// Returns the number of registered services.
    #[must_use]
    pub fn len(&self) -> usize {
        self.services.lock().len()
    }

    /// Returns a copy of the referenced characteristic.
    #[must_use]
    pub fn characteristic(&self, r: CharRef) -> Option<CharacteristicDef> {
        self.update(r, |c| c.clone())
    }

    /// Calls `f` with the referenced characteristic while holding the table
    /// lock. Returns [`None`] if the characteristic no longer exists.
    pub fn update<T>(&self, r: CharRef, f: impl FnOnce(&mut CharacteristicDef) -> T) -> Option<T> {
        let mut services = self.services.lock();
        let s = services.iter_mut().find(|s| s.uuid == r.service)?;
        s.characteristic_mut(r.characteristic).map(f)
    }

    /// Returns the current characteristic value.
    #[must_use]
    pub fn value(&self, r: CharRef) -> Option<Vec<u8>> {
        self.update(r, |c| c.value.clone())
    }

    /// Replaces the characteristic value. Returns `false` if the
    /// characteristic no longer exists.
    pub fn set_value(&self, r: CharRef, v: Vec<u8>) -> bool {
        self.update(r, |c| c.value = v).is_some()
    }

    /// Returns a copy of the referenced descriptor.
    #[must_use]
    pub fn descriptor(&self, r: DescRef) -> Option<DescriptorDef> {
        (self.update(r.characteristic, |c| c.descriptor(r.descriptor).cloned())).flatten()
    }

    /// Replaces the descriptor value. Returns `false` if the descriptor no
    /// longer exists.
    pub fn set_descriptor_value(&self, r: DescRef, v: Vec<u8>) -> bool {
        (self.update(r.characteristic, |c| {
            c.descriptor_mut(r.descriptor).map(|d| d.value = v)
        }))
        .flatten()
        .is_some()
    }
}
