use std::collections::BTreeSet;

use replicant_shared::{ChannelAddress, Filter};

use crate::entity::EntityKey;

/// A channel the server has confirmed as subscribed
#[derive(Debug, Clone, PartialEq)]
pub struct Subscription {
    address: ChannelAddress,
    filter: Option<Filter>,
    /// Requested directly rather than implied by a followed link
    explicit: bool,
    entities: BTreeSet<EntityKey>,
}

impl Subscription {
    pub(crate) fn new(address: ChannelAddress, filter: Option<Filter>, explicit: bool) -> Self {
        Self {
            address,
            filter,
            explicit,
            entities: BTreeSet::new(),
        }
    }

    pub fn address(&self) -> &ChannelAddress {
        &self.address
    }

    pub fn filter(&self) -> Option<&Filter> {
        self.filter.as_ref()
    }

    pub fn is_explicit(&self) -> bool {
        self.explicit
    }

    pub fn entities(&self) -> impl Iterator<Item = &EntityKey> {
        self.entities.iter()
    }

    pub fn contains_entity(&self, entity: &EntityKey) -> bool {
        self.entities.contains(entity)
    }

    pub(crate) fn set_filter(&mut self, filter: Option<Filter>) {
        self.filter = filter;
    }

    pub(crate) fn set_explicit(&mut self, explicit: bool) {
        self.explicit = explicit;
    }

    pub(crate) fn link_entity(&mut self, entity: EntityKey) {
        self.entities.insert(entity);
    }

    pub(crate) fn unlink_entity(&mut self, entity: &EntityKey) {
        self.entities.remove(entity);
    }

    pub(crate) fn take_entities(&mut self) -> BTreeSet<EntityKey> {
        std::mem::take(&mut self.entities)
    }
}
