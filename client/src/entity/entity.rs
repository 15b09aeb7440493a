use std::collections::{BTreeMap, BTreeSet};

use replicant_shared::{ChannelAddress, EntityData, EntityId, EntityTypeId, SystemId};

/// Identity of a replicated entity
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct EntityKey {
    pub system_id: SystemId,
    pub type_id: EntityTypeId,
    pub id: EntityId,
}

impl EntityKey {
    pub fn new(system_id: SystemId, type_id: EntityTypeId, id: EntityId) -> Self {
        Self {
            system_id,
            type_id,
            id,
        }
    }
}

/// Local replica of a server entity. Lives exactly as long as at least one
/// subscription references it.
#[derive(Debug, Clone, PartialEq)]
pub struct Entity {
    key: EntityKey,
    data: EntityData,
    subscriptions: BTreeSet<ChannelAddress>,
    references: BTreeMap<String, EntityKey>,
}

impl Entity {
    pub(crate) fn new(key: EntityKey, data: EntityData) -> Self {
        Self {
            key,
            data,
            subscriptions: BTreeSet::new(),
            references: BTreeMap::new(),
        }
    }

    pub fn key(&self) -> &EntityKey {
        &self.key
    }

    pub fn data(&self) -> &EntityData {
        &self.data
    }

    pub fn subscriptions(&self) -> impl Iterator<Item = &ChannelAddress> {
        self.subscriptions.iter()
    }

    pub fn is_subscribed_to(&self, address: &ChannelAddress) -> bool {
        self.subscriptions.contains(address)
    }

    /// Resolved relationship references, by field name
    pub fn reference(&self, field: &str) -> Option<&EntityKey> {
        self.references.get(field)
    }

    pub(crate) fn set_data(&mut self, data: EntityData) {
        self.data = data;
    }

    pub(crate) fn set_references(&mut self, references: BTreeMap<String, EntityKey>) {
        self.references = references;
    }

    pub(crate) fn link_subscription(&mut self, address: ChannelAddress) {
        self.subscriptions.insert(address);
    }

    /// Returns true if no subscription references the entity any more
    pub(crate) fn unlink_subscription(&mut self, address: &ChannelAddress) -> bool {
        self.subscriptions.remove(address);
        self.subscriptions.is_empty()
    }

    pub(crate) fn subscription_addresses(&self) -> Vec<ChannelAddress> {
        self.subscriptions.iter().copied().collect()
    }
}
