use std::{
    collections::BTreeMap,
    sync::{Mutex, MutexGuard, PoisonError},
    time::{Duration, Instant},
};

use log::debug;

use replicant_shared::{
    ChangeSetMessage, ChannelActionMessage, ChannelActionType, ChannelAddress, Filter, Sequence,
};

use crate::{session::SubscriptionEntry, ServerError};

/// Subscription graph and cache bookkeeping of one session. Only reachable
/// through [`ReplicantSession::lock`], so every read-modify-write sequence on
/// it is atomic.
#[derive(Debug, Clone, Default)]
pub struct SessionState {
    subscriptions: BTreeMap<ChannelAddress, SubscriptionEntry>,
    /// The client's last known cache token per channel
    etags: BTreeMap<ChannelAddress, String>,
    auth_token: Option<String>,
    last_sequence: Sequence,
}

impl SessionState {
    pub fn subscription_entry(&self, address: &ChannelAddress) -> Option<&SubscriptionEntry> {
        self.subscriptions.get(address)
    }

    pub(crate) fn subscription_entry_mut(
        &mut self,
        address: &ChannelAddress,
    ) -> Option<&mut SubscriptionEntry> {
        self.subscriptions.get_mut(address)
    }

    pub fn subscription_entries(&self) -> impl Iterator<Item = &SubscriptionEntry> {
        self.subscriptions.values()
    }

    pub fn is_subscribed(&self, address: &ChannelAddress) -> bool {
        self.subscriptions.contains_key(address)
    }

    pub(crate) fn create_subscription_entry(
        &mut self,
        address: ChannelAddress,
        filter: Option<Filter>,
        explicit: bool,
    ) -> Result<&mut SubscriptionEntry, ServerError> {
        if self.subscriptions.contains_key(&address) {
            return Err(ServerError::DuplicateSubscription { address });
        }
        debug!("Subscription entry created {:?} explicit={}", address, explicit);
        Ok(self
            .subscriptions
            .entry(address)
            .or_insert_with(|| SubscriptionEntry::new(address, filter, explicit)))
    }

    /// Record that `source` caused `target` to exist. Linking the same pair
    /// twice is an error.
    pub(crate) fn link_subscription_entries(
        &mut self,
        source: &ChannelAddress,
        target: &ChannelAddress,
    ) -> Result<(), ServerError> {
        if !self.subscriptions.contains_key(target) {
            return Err(ServerError::MissingSubscription { address: *target });
        }
        let source_entry = self
            .subscriptions
            .get_mut(source)
            .ok_or(ServerError::MissingSubscription { address: *source })?;
        if !source_entry.add_outward(*target) {
            return Err(ServerError::DuplicateLink {
                source_address: *source,
                target: *target,
            });
        }
        if let Some(target_entry) = self.subscriptions.get_mut(target) {
            target_entry.add_inward(*source);
        }
        Ok(())
    }

    pub(crate) fn delink_subscription_entries(
        &mut self,
        source: &ChannelAddress,
        target: &ChannelAddress,
    ) {
        if let Some(source_entry) = self.subscriptions.get_mut(source) {
            source_entry.remove_outward(target);
        }
        if let Some(target_entry) = self.subscriptions.get_mut(target) {
            target_entry.remove_inward(source);
        }
    }

    /// Drop the explicit flag if `explicitly_requested`, then remove the entry
    /// if nothing keeps it alive, cascading into the entries it alone implied.
    /// Returns true if the entry was removed.
    pub(crate) fn unsubscribe(
        &mut self,
        address: &ChannelAddress,
        explicitly_requested: bool,
        change_set: &mut ChangeSetMessage,
    ) -> Result<bool, ServerError> {
        let entry = self
            .subscriptions
            .get_mut(address)
            .ok_or(ServerError::MissingSubscription { address: *address })?;
        if explicitly_requested {
            if !entry.is_explicit() && entry.has_inward() {
                return Err(ServerError::EntryStillReferenced {
                    address: *address,
                    inward_count: entry.inward().count(),
                });
            }
            entry.set_explicit(false);
        }
        if !entry.is_orphaned() {
            return Ok(false);
        }
        self.remove_subscription_entry(address, ChannelActionType::Remove, change_set);
        Ok(true)
    }

    /// Remove the entry regardless of who references it, as when its channel
    /// no longer exists. Returns false if there was no entry.
    pub(crate) fn delete(&mut self, address: &ChannelAddress, change_set: &mut ChangeSetMessage) -> bool {
        if !self.subscriptions.contains_key(address) {
            return false;
        }
        self.remove_subscription_entry(address, ChannelActionType::Delete, change_set);
        true
    }

    fn remove_subscription_entry(
        &mut self,
        address: &ChannelAddress,
        action: ChannelActionType,
        change_set: &mut ChangeSetMessage,
    ) {
        let Some(mut entry) = self.subscriptions.remove(address) else {
            return;
        };
        debug!("Subscription entry removed {:?}", address);
        for source in entry.take_inward() {
            if let Some(source_entry) = self.subscriptions.get_mut(&source) {
                source_entry.remove_outward(address);
            }
        }
        change_set
            .channel_actions
            .push(ChannelActionMessage::new(address, action, None));
        for target in entry.take_outward() {
            let Some(target_entry) = self.subscriptions.get_mut(&target) else {
                continue;
            };
            target_entry.remove_inward(address);
            if target_entry.is_orphaned() {
                self.remove_subscription_entry(&target, ChannelActionType::Remove, change_set);
            }
        }
    }

    // Cache tokens

    pub fn etag(&self, address: &ChannelAddress) -> Option<&str> {
        self.etags.get(address).map(String::as_str)
    }

    pub(crate) fn set_etag(&mut self, address: ChannelAddress, etag: String) {
        self.etags.insert(address, etag);
    }

    pub(crate) fn replace_etags(&mut self, etags: BTreeMap<ChannelAddress, String>) {
        self.etags = etags;
    }

    pub fn auth_token(&self) -> Option<&str> {
        self.auth_token.as_deref()
    }

    pub(crate) fn set_auth_token(&mut self, token: Option<String>) {
        self.auth_token = token;
    }

    pub fn last_sequence(&self) -> Sequence {
        self.last_sequence
    }

    pub(crate) fn next_sequence(&mut self) -> Sequence {
        self.last_sequence += 1;
        self.last_sequence
    }
}

/// Server half of one client connection
pub struct ReplicantSession {
    id: String,
    state: Mutex<SessionState>,
    last_accessed: Mutex<Instant>,
}

impl ReplicantSession {
    pub fn new(id: String, now: Instant) -> Self {
        Self {
            id,
            state: Mutex::new(SessionState::default()),
            last_accessed: Mutex::new(now),
        }
    }

    pub fn id(&self) -> &str {
        &self.id
    }

    /// Lock the session's state. Hold the guard for the whole of any sequence
    /// that must appear atomic, such as subscribe-then-link.
    pub fn lock(&self) -> MutexGuard<'_, SessionState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    pub fn touch(&self, now: Instant) {
        *self
            .last_accessed
            .lock()
            .unwrap_or_else(PoisonError::into_inner) = now;
    }

    pub fn last_accessed(&self) -> Instant {
        *self
            .last_accessed
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
    }

    pub fn is_idle(&self, now: Instant, timeout: Duration) -> bool {
        now.saturating_duration_since(self.last_accessed()) >= timeout
    }
}
