use replicant_shared::{ChannelAddress, Filter, RequestId};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum AreaOfInterestAction {
    Add,
    Remove,
    Update,
}

/// A queued or in-flight intent to change one subscription
#[derive(Debug, Clone, PartialEq)]
pub struct AreaOfInterestRequest {
    address: ChannelAddress,
    action: AreaOfInterestAction,
    filter: Option<Filter>,
    request_id: Option<RequestId>,
}

impl AreaOfInterestRequest {
    /// Remove requests never carry a filter
    pub fn new(address: ChannelAddress, action: AreaOfInterestAction, filter: Option<Filter>) -> Self {
        let filter = match action {
            AreaOfInterestAction::Remove => None,
            _ => filter,
        };
        Self {
            address,
            action,
            filter,
            request_id: None,
        }
    }

    pub fn address(&self) -> &ChannelAddress {
        &self.address
    }

    pub fn action(&self) -> AreaOfInterestAction {
        self.action
    }

    pub fn filter(&self) -> Option<&Filter> {
        self.filter.as_ref()
    }

    /// Id of the network request carrying this intent, once dispatched
    pub fn request_id(&self) -> Option<RequestId> {
        self.request_id
    }

    pub fn is_in_progress(&self) -> bool {
        self.request_id.is_some()
    }

    pub(crate) fn mark_in_progress(&mut self, request_id: RequestId) {
        self.request_id = Some(request_id);
    }

    pub fn matches(
        &self,
        action: AreaOfInterestAction,
        address: &ChannelAddress,
        filter: Option<&Filter>,
    ) -> bool {
        self.action == action
            && self.address == *address
            && (AreaOfInterestAction::Remove == action || self.filter.as_ref() == filter)
    }

    /// Whether `other` may share a network round trip with this request
    pub fn can_group_with(&self, other: &AreaOfInterestRequest) -> bool {
        self.action == other.action
            && self.address.same_channel(&other.address)
            && (AreaOfInterestAction::Remove == self.action || self.filter == other.filter)
    }
}
