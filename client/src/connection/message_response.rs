use std::collections::BTreeSet;

use replicant_shared::{ChangeSetMessage, EntityChangeMessage, RequestId, Sequence};

use crate::entity::EntityKey;

/// A parsed change set together with the cursor tracking how far it has been
/// applied
#[derive(Debug, Clone)]
pub struct MessageResponse {
    change_set: ChangeSetMessage,
    /// Raw payload, kept so that cacheable responses can be stored verbatim
    raw: String,
    out_of_band: bool,
    channel_actions_processed: bool,
    entity_change_index: usize,
    updated_entities: Vec<EntityKey>,
    removed_entities: BTreeSet<EntityKey>,
    linked: bool,
}

impl MessageResponse {
    pub fn sequenced(change_set: ChangeSetMessage, raw: String) -> Self {
        Self::new(change_set, raw, false)
    }

    pub fn out_of_band(change_set: ChangeSetMessage, raw: String) -> Self {
        Self::new(change_set, raw, true)
    }

    fn new(change_set: ChangeSetMessage, raw: String, out_of_band: bool) -> Self {
        Self {
            change_set,
            raw,
            out_of_band,
            channel_actions_processed: false,
            entity_change_index: 0,
            updated_entities: Vec::new(),
            removed_entities: BTreeSet::new(),
            linked: false,
        }
    }

    pub fn change_set(&self) -> &ChangeSetMessage {
        &self.change_set
    }

    pub fn raw(&self) -> &str {
        &self.raw
    }

    pub fn is_out_of_band(&self) -> bool {
        self.out_of_band
    }

    pub fn sequence(&self) -> Sequence {
        self.change_set.last_id
    }

    /// Out-of-band responses replay cached content and answer no request
    pub fn request_id(&self) -> Option<RequestId> {
        if self.out_of_band {
            None
        } else {
            self.change_set.request_id
        }
    }

    pub fn etag(&self) -> Option<&str> {
        self.change_set.etag.as_deref()
    }

    pub(crate) fn are_channel_actions_processed(&self) -> bool {
        self.channel_actions_processed
    }

    pub(crate) fn mark_channel_actions_processed(&mut self) {
        self.channel_actions_processed = true;
    }

    pub(crate) fn next_entity_change(&mut self) -> Option<EntityChangeMessage> {
        let change = self.change_set.changes.get(self.entity_change_index).cloned();
        if change.is_some() {
            self.entity_change_index += 1;
        }
        change
    }

    pub(crate) fn record_updated(&mut self, entity: EntityKey) {
        self.updated_entities.push(entity);
    }

    pub(crate) fn record_removed(&mut self, entity: EntityKey) {
        self.removed_entities.insert(entity);
    }

    /// Entities updated in this batch and not also removed in it, in the order
    /// they were first updated
    pub(crate) fn entities_to_link(&self) -> Vec<EntityKey> {
        let mut seen = BTreeSet::new();
        self.updated_entities
            .iter()
            .filter(|entity| !self.removed_entities.contains(entity))
            .filter(|entity| seen.insert(**entity))
            .copied()
            .collect()
    }

    pub(crate) fn is_linked(&self) -> bool {
        self.linked
    }

    pub(crate) fn mark_linked(&mut self) {
        self.linked = true;
    }
}
