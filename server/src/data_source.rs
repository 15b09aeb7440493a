use replicant_shared::{ChannelAddress, EntityChangeMessage, Filter};

use crate::ServerError;

/// A derived subscription: while `source` is subscribed, `target` must be too
#[derive(Debug, Clone, PartialEq)]
pub struct ChannelLink {
    pub source: ChannelAddress,
    pub target: ChannelAddress,
    pub target_filter: Option<Filter>,
}

impl ChannelLink {
    pub fn new(source: ChannelAddress, target: ChannelAddress, target_filter: Option<Filter>) -> Self {
        Self {
            source,
            target,
            target_filter,
        }
    }
}

/// Content of a channel as computed by the data source. Links never leave the
/// server; they drive implied subscriptions.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct ChannelPayload {
    pub changes: Vec<EntityChangeMessage>,
    pub links: Vec<ChannelLink>,
}

/// The storage and business layer the server queries for channel content
pub trait DataSource: Send + Sync {
    /// Token of the dataset generation a cacheable channel's content derives
    /// from. Must change whenever that content could.
    fn cache_key(&self, address: &ChannelAddress) -> Result<String, ServerError>;

    fn collect_data_for_subscribe(
        &self,
        address: &ChannelAddress,
        filter: Option<&Filter>,
    ) -> Result<ChannelPayload, ServerError>;

    /// Content for moving an existing subscription from `original_filter` to
    /// `filter`
    fn collect_data_for_subscription_update(
        &self,
        address: &ChannelAddress,
        original_filter: Option<&Filter>,
        filter: Option<&Filter>,
    ) -> Result<ChannelPayload, ServerError>;
}
