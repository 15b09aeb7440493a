use replicant_shared::{ChannelAddress, Filter};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum AreaOfInterestStatus {
    NotAsked,
    Loading,
    Loaded,
    LoadFailed,
    Updating,
    Updated,
    UpdateFailed,
    Unloading,
    Unloaded,
    /// The channel instance was deleted on the server; never resubscribed
    Deleted,
}

impl AreaOfInterestStatus {
    pub fn is_failed(&self) -> bool {
        matches!(
            self,
            AreaOfInterestStatus::LoadFailed | AreaOfInterestStatus::UpdateFailed
        )
    }
}

/// Application-declared desire for a channel subscription with a given filter.
/// Only the converger and connector callbacks change `status`.
#[derive(Debug, Clone, PartialEq)]
pub struct AreaOfInterest {
    address: ChannelAddress,
    filter: Option<Filter>,
    status: AreaOfInterestStatus,
    error: Option<String>,
}

impl AreaOfInterest {
    pub(crate) fn new(address: ChannelAddress, filter: Option<Filter>) -> Self {
        Self {
            address,
            filter,
            status: AreaOfInterestStatus::NotAsked,
            error: None,
        }
    }

    pub fn address(&self) -> &ChannelAddress {
        &self.address
    }

    pub fn filter(&self) -> Option<&Filter> {
        self.filter.as_ref()
    }

    pub fn status(&self) -> AreaOfInterestStatus {
        self.status
    }

    /// Message of the last failed load or update
    pub fn error(&self) -> Option<&str> {
        self.error.as_deref()
    }

    /// Changing the filter of a failed area of interest makes it eligible for
    /// another attempt
    pub(crate) fn set_filter(&mut self, filter: Option<Filter>) {
        self.filter = filter;
        if self.status.is_failed() {
            self.status = AreaOfInterestStatus::NotAsked;
            self.error = None;
        }
    }

    pub(crate) fn set_status(&mut self, status: AreaOfInterestStatus, error: Option<String>) {
        self.status = status;
        self.error = error;
    }
}
