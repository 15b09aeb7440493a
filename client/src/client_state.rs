use std::collections::BTreeMap;

use log::debug;

use replicant_shared::{ChannelAddress, EntityData, Filter, SystemId};

use crate::{
    area_of_interest::{AreaOfInterest, AreaOfInterestStatus},
    entity::{EntityKey, EntityRegistry, EntityRepository},
    spy::{Spy, SpyEvent},
    subscription::Subscription,
    ClientError,
};

/// Desired and actual subscription state plus the entities it references.
/// Every mutation that could change what the converger decides raises
/// `converge_requested`.
pub struct ClientState {
    areas_of_interest: BTreeMap<ChannelAddress, AreaOfInterest>,
    subscriptions: BTreeMap<ChannelAddress, Subscription>,
    entities: EntityRepository,
    entity_registry: EntityRegistry,
    spy: Spy,
    converge_requested: bool,
}

impl ClientState {
    pub fn new(entity_registry: EntityRegistry, spy: Spy) -> Self {
        Self {
            areas_of_interest: BTreeMap::new(),
            subscriptions: BTreeMap::new(),
            entities: EntityRepository::new(),
            entity_registry,
            spy,
            converge_requested: false,
        }
    }

    pub fn spy(&self) -> &Spy {
        &self.spy
    }

    pub fn entities(&self) -> &EntityRepository {
        &self.entities
    }

    pub(crate) fn entity_registry(&self) -> &EntityRegistry {
        &self.entity_registry
    }

    pub(crate) fn request_converge(&mut self) {
        self.converge_requested = true;
    }

    pub(crate) fn take_converge_request(&mut self) -> bool {
        std::mem::replace(&mut self.converge_requested, false)
    }

    pub fn is_converge_requested(&self) -> bool {
        self.converge_requested
    }

    // Areas of interest

    pub fn area_of_interest(&self, address: &ChannelAddress) -> Option<&AreaOfInterest> {
        self.areas_of_interest.get(address)
    }

    pub fn areas_of_interest(&self) -> impl Iterator<Item = &AreaOfInterest> {
        self.areas_of_interest.values()
    }

    pub(crate) fn area_of_interest_addresses(&self) -> Vec<ChannelAddress> {
        self.areas_of_interest.keys().copied().collect()
    }

    pub(crate) fn has_area_of_interest(&self, address: &ChannelAddress) -> bool {
        self.areas_of_interest.contains_key(address)
    }

    /// Create the area of interest, or retarget the existing one to `filter`
    pub(crate) fn find_or_create_area_of_interest(
        &mut self,
        address: ChannelAddress,
        filter: Option<Filter>,
    ) -> &AreaOfInterest {
        self.converge_requested = true;
        let area_of_interest = self
            .areas_of_interest
            .entry(address)
            .or_insert_with(|| AreaOfInterest::new(address, None));
        area_of_interest.set_filter(filter);
        area_of_interest
    }

    pub(crate) fn set_area_of_interest_filter(
        &mut self,
        address: &ChannelAddress,
        filter: Option<Filter>,
    ) -> bool {
        match self.areas_of_interest.get_mut(address) {
            Some(area_of_interest) => {
                area_of_interest.set_filter(filter);
                self.converge_requested = true;
                true
            }
            None => false,
        }
    }

    pub(crate) fn remove_area_of_interest(&mut self, address: &ChannelAddress) -> Option<AreaOfInterest> {
        let removed = self.areas_of_interest.remove(address);
        if removed.is_some() {
            self.converge_requested = true;
        }
        removed
    }

    pub(crate) fn update_area_of_interest(
        &mut self,
        address: &ChannelAddress,
        status: AreaOfInterestStatus,
        error: Option<String>,
    ) {
        let Some(area_of_interest) = self.areas_of_interest.get_mut(address) else {
            return;
        };
        if AreaOfInterestStatus::Deleted == area_of_interest.status()
            && AreaOfInterestStatus::Deleted != status
        {
            return;
        }
        debug!("Area of interest {:?} -> {:?}", address, status);
        area_of_interest.set_status(status, error);
        self.converge_requested = true;
        self.spy.report(SpyEvent::AreaOfInterestStatusUpdated {
            address: *address,
            status,
        });
    }

    /// Failed areas of interest of a system become eligible for retry
    pub(crate) fn reset_failed_areas_of_interest(&mut self, system_id: SystemId) {
        let failed: Vec<ChannelAddress> = self
            .areas_of_interest
            .values()
            .filter(|area| area.address().system_id() == system_id && area.status().is_failed())
            .map(|area| *area.address())
            .collect();
        for address in failed {
            self.update_area_of_interest(&address, AreaOfInterestStatus::NotAsked, None);
        }
    }

    // Subscriptions

    pub fn subscription(&self, address: &ChannelAddress) -> Option<&Subscription> {
        self.subscriptions.get(address)
    }

    pub fn subscriptions(&self) -> impl Iterator<Item = &Subscription> {
        self.subscriptions.values()
    }

    /// Create the subscription, or merge into the existing one: the filter is
    /// replaced and explicitness is only ever gained
    pub(crate) fn subscribe(
        &mut self,
        address: ChannelAddress,
        filter: Option<Filter>,
        explicit: bool,
    ) {
        self.converge_requested = true;
        match self.subscriptions.get_mut(&address) {
            Some(subscription) => {
                subscription.set_filter(filter);
                if explicit {
                    subscription.set_explicit(true);
                }
                self.spy.report(SpyEvent::SubscriptionUpdated { address });
            }
            None => {
                debug!("Subscription created {:?} explicit={}", address, explicit);
                self.subscriptions
                    .insert(address, Subscription::new(address, filter, explicit));
                self.spy
                    .report(SpyEvent::SubscriptionCreated { address, explicit });
            }
        }
    }

    pub(crate) fn mark_subscription_explicit(&mut self, address: &ChannelAddress) {
        if let Some(subscription) = self.subscriptions.get_mut(address) {
            if !subscription.is_explicit() {
                subscription.set_explicit(true);
                self.converge_requested = true;
            }
        }
    }

    /// The server kept the subscription only because other channels imply it
    pub(crate) fn demote_subscription(&mut self, address: &ChannelAddress) {
        if let Some(subscription) = self.subscriptions.get_mut(address) {
            if subscription.is_explicit() {
                subscription.set_explicit(false);
                self.converge_requested = true;
            }
        }
    }

    pub(crate) fn update_subscription_filter(
        &mut self,
        address: &ChannelAddress,
        filter: Option<Filter>,
    ) -> Result<(), ClientError> {
        let subscription = self
            .subscriptions
            .get_mut(address)
            .ok_or(ClientError::MissingSubscription { address: *address })?;
        subscription.set_filter(filter);
        self.converge_requested = true;
        self.spy
            .report(SpyEvent::SubscriptionUpdated { address: *address });
        Ok(())
    }

    /// Remove the subscription and unlink its entities, disposing any entity
    /// left without subscriptions
    pub(crate) fn unsubscribe(&mut self, address: &ChannelAddress) -> Result<(), ClientError> {
        let mut subscription = self
            .subscriptions
            .remove(address)
            .ok_or(ClientError::MissingSubscription { address: *address })?;
        for entity in subscription.take_entities() {
            self.unlink_entity_side(&entity, address);
        }
        debug!("Subscription disposed {:?}", address);
        self.converge_requested = true;
        self.spy
            .report(SpyEvent::SubscriptionDisposed { address: *address });
        Ok(())
    }

    /// Drop every subscription of a system, as happens when its connection
    /// goes away
    pub(crate) fn purge_subscriptions(&mut self, system_id: SystemId) {
        let addresses: Vec<ChannelAddress> = self
            .subscriptions
            .keys()
            .filter(|address| address.system_id() == system_id)
            .copied()
            .collect();
        for address in addresses {
            // Present by construction
            let _ = self.unsubscribe(&address);
        }
    }

    // Entities

    /// Create or update an entity and link it to each of `channels`
    pub(crate) fn update_entity(
        &mut self,
        key: EntityKey,
        data: EntityData,
        channels: &[ChannelAddress],
    ) -> Result<(), ClientError> {
        for address in channels {
            if !self.subscriptions.contains_key(address) {
                return Err(ClientError::MissingSubscription { address: *address });
            }
        }
        let entity = self.entities.upsert(key, data);
        for address in channels {
            entity.link_subscription(*address);
        }
        for address in channels {
            if let Some(subscription) = self.subscriptions.get_mut(address) {
                subscription.link_entity(key);
            }
        }
        Ok(())
    }

    /// Unlink an entity from `channels`, or from every subscription when
    /// `channels` is empty. Returns true if the entity was disposed.
    pub(crate) fn remove_entity(&mut self, key: &EntityKey, channels: &[ChannelAddress]) -> bool {
        let Some(entity) = self.entities.get(key) else {
            return false;
        };
        let addresses = if channels.is_empty() {
            entity.subscription_addresses()
        } else {
            channels.to_vec()
        };
        let mut disposed = false;
        for address in &addresses {
            if let Some(subscription) = self.subscriptions.get_mut(address) {
                subscription.unlink_entity(key);
            }
            disposed |= self.unlink_entity_side(key, address);
        }
        disposed
    }

    pub(crate) fn set_entity_references(
        &mut self,
        key: &EntityKey,
        references: BTreeMap<String, EntityKey>,
    ) {
        if let Some(entity) = self.entities.get_mut(key) {
            entity.set_references(references);
        }
    }

    fn unlink_entity_side(&mut self, key: &EntityKey, address: &ChannelAddress) -> bool {
        let Some(entity) = self.entities.get_mut(key) else {
            return false;
        };
        if entity.unlink_subscription(address) {
            self.entities.dispose(key);
            self.spy.report(SpyEvent::EntityDisposed { entity: *key });
            return true;
        }
        false
    }
}
