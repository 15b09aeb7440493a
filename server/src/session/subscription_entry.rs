use std::collections::BTreeSet;

use replicant_shared::{ChannelAddress, Filter};

/// One channel a session is subscribed to. Inward addresses are the entries
/// whose links caused this one to exist; outward addresses are the entries
/// this one caused to exist.
#[derive(Debug, Clone, PartialEq)]
pub struct SubscriptionEntry {
    address: ChannelAddress,
    filter: Option<Filter>,
    explicit: bool,
    inward: BTreeSet<ChannelAddress>,
    outward: BTreeSet<ChannelAddress>,
}

impl SubscriptionEntry {
    pub(crate) fn new(address: ChannelAddress, filter: Option<Filter>, explicit: bool) -> Self {
        Self {
            address,
            filter,
            explicit,
            inward: BTreeSet::new(),
            outward: BTreeSet::new(),
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

    pub fn inward(&self) -> impl Iterator<Item = &ChannelAddress> {
        self.inward.iter()
    }

    pub fn outward(&self) -> impl Iterator<Item = &ChannelAddress> {
        self.outward.iter()
    }

    pub fn has_inward(&self) -> bool {
        !self.inward.is_empty()
    }

    pub fn is_linked_to(&self, target: &ChannelAddress) -> bool {
        self.outward.contains(target)
    }

    /// Neither requested nor implied by anything; must be unsubscribed
    pub fn is_orphaned(&self) -> bool {
        !self.explicit && self.inward.is_empty()
    }

    pub(crate) fn set_filter(&mut self, filter: Option<Filter>) {
        self.filter = filter;
    }

    pub(crate) fn set_explicit(&mut self, explicit: bool) {
        self.explicit = explicit;
    }

    pub(crate) fn add_inward(&mut self, source: ChannelAddress) -> bool {
        self.inward.insert(source)
    }

    pub(crate) fn remove_inward(&mut self, source: &ChannelAddress) -> bool {
        self.inward.remove(source)
    }

    pub(crate) fn add_outward(&mut self, target: ChannelAddress) -> bool {
        self.outward.insert(target)
    }

    pub(crate) fn remove_outward(&mut self, target: &ChannelAddress) -> bool {
        self.outward.remove(target)
    }

    pub(crate) fn take_inward(&mut self) -> BTreeSet<ChannelAddress> {
        std::mem::take(&mut self.inward)
    }

    pub(crate) fn take_outward(&mut self) -> BTreeSet<ChannelAddress> {
        std::mem::take(&mut self.outward)
    }
}
