use std::{cmp::Ordering, fmt};

use crate::{
    channel::error::AddressParseError,
    types::{ChannelId, InstanceId, SystemId},
};

/// Identifies a channel within a system. Type channels carry no instance id,
/// instance channels always carry one.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ChannelAddress {
    system_id: SystemId,
    channel_id: ChannelId,
    instance_id: Option<InstanceId>,
}

impl ChannelAddress {
    pub fn new(system_id: SystemId, channel_id: ChannelId, instance_id: Option<InstanceId>) -> Self {
        Self {
            system_id,
            channel_id,
            instance_id,
        }
    }

    pub fn type_channel(system_id: SystemId, channel_id: ChannelId) -> Self {
        Self::new(system_id, channel_id, None)
    }

    pub fn instance_channel(
        system_id: SystemId,
        channel_id: ChannelId,
        instance_id: InstanceId,
    ) -> Self {
        Self::new(system_id, channel_id, Some(instance_id))
    }

    /// Parse a wire descriptor (`"5"` or `"5.42"`). The owning system is implied
    /// by the connection the descriptor arrived on.
    pub fn parse(system_id: SystemId, descriptor: &str) -> Result<Self, AddressParseError> {
        if descriptor.is_empty() {
            return Err(AddressParseError::Empty);
        }
        let (channel_part, instance_part) = match descriptor.split_once('.') {
            Some((channel, instance)) => (channel, Some(instance)),
            None => (descriptor, None),
        };
        let channel_id = channel_part.parse::<ChannelId>().map_err(|_| {
            AddressParseError::InvalidChannelId {
                descriptor: descriptor.to_string(),
            }
        })?;
        let instance_id = match instance_part {
            Some(instance) => Some(instance.parse::<InstanceId>().map_err(|_| {
                AddressParseError::InvalidInstanceId {
                    descriptor: descriptor.to_string(),
                }
            })?),
            None => None,
        };
        Ok(Self::new(system_id, channel_id, instance_id))
    }

    pub fn system_id(&self) -> SystemId {
        self.system_id
    }

    pub fn channel_id(&self) -> ChannelId {
        self.channel_id
    }

    pub fn instance_id(&self) -> Option<InstanceId> {
        self.instance_id
    }

    pub fn is_instance_channel(&self) -> bool {
        self.instance_id.is_some()
    }

    /// The wire form of this address, without the system id
    pub fn descriptor(&self) -> String {
        self.to_string()
    }

    /// True if both addresses point at the same channel of the same system,
    /// regardless of instance
    pub fn same_channel(&self, other: &ChannelAddress) -> bool {
        self.system_id == other.system_id && self.channel_id == other.channel_id
    }
}

impl fmt::Display for ChannelAddress {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.instance_id {
            Some(instance_id) => write!(f, "{}.{}", self.channel_id, instance_id),
            None => write!(f, "{}", self.channel_id),
        }
    }
}

// Ordered by channel then instance; the system id only breaks ties so that
// ordering stays consistent with equality.
impl Ord for ChannelAddress {
    fn cmp(&self, other: &Self) -> Ordering {
        self.channel_id
            .cmp(&other.channel_id)
            .then_with(|| self.instance_id.cmp(&other.instance_id))
            .then_with(|| self.system_id.cmp(&other.system_id))
    }
}

impl PartialOrd for ChannelAddress {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}
