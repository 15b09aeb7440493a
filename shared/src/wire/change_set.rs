use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use crate::{
    AddressParseError, ChannelAddress, ChannelId, EntityId, EntityTypeId, Filter, InstanceId,
    RequestId, Sequence, SystemId,
};

/// Attribute data of a replicated entity
pub type EntityData = Map<String, Value>;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ChannelActionType {
    Add,
    Remove,
    Update,
    /// The channel instance no longer exists on the server
    Delete,
}

/// `{cid, scid?, action, filter?}`
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ChannelActionMessage {
    pub cid: ChannelId,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub scid: Option<InstanceId>,
    pub action: ChannelActionType,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub filter: Option<Filter>,
}

impl ChannelActionMessage {
    pub fn new(address: &ChannelAddress, action: ChannelActionType, filter: Option<Filter>) -> Self {
        Self {
            cid: address.channel_id(),
            scid: address.instance_id(),
            action,
            filter,
        }
    }

    pub fn address(&self, system_id: SystemId) -> ChannelAddress {
        ChannelAddress::new(system_id, self.cid, self.scid)
    }
}

/// `{id, type, channels[], data?}`; absent `data` denotes removal
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EntityChangeMessage {
    pub id: EntityId,
    #[serde(rename = "type")]
    pub type_id: EntityTypeId,
    #[serde(default)]
    pub channels: Vec<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub data: Option<EntityData>,
}

impl EntityChangeMessage {
    pub fn update(
        type_id: EntityTypeId,
        id: EntityId,
        channels: &[ChannelAddress],
        data: EntityData,
    ) -> Self {
        Self {
            id,
            type_id,
            channels: channels.iter().map(ChannelAddress::descriptor).collect(),
            data: Some(data),
        }
    }

    pub fn remove(type_id: EntityTypeId, id: EntityId, channels: &[ChannelAddress]) -> Self {
        Self {
            id,
            type_id,
            channels: channels.iter().map(ChannelAddress::descriptor).collect(),
            data: None,
        }
    }

    pub fn is_update(&self) -> bool {
        self.data.is_some()
    }

    pub fn channel_addresses(
        &self,
        system_id: SystemId,
    ) -> Result<Vec<ChannelAddress>, AddressParseError> {
        self.channels
            .iter()
            .map(|descriptor| ChannelAddress::parse(system_id, descriptor))
            .collect()
    }
}

/// A sequenced batch of channel actions and entity changes
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ChangeSetMessage {
    pub last_id: Sequence,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub request_id: Option<RequestId>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub etag: Option<String>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub channel_actions: Vec<ChannelActionMessage>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub changes: Vec<EntityChangeMessage>,
}

impl ChangeSetMessage {
    pub fn is_empty(&self) -> bool {
        self.channel_actions.is_empty() && self.changes.is_empty()
    }
}
