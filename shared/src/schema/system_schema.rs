use crate::{
    ChannelAddress, ChannelId, EntityTypeId, FilterType, SchemaError, SystemId,
};

/// Declaration of one channel in a system
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ChannelSchema {
    pub id: ChannelId,
    pub name: String,
    /// Instance channels are addressed with an instance id
    pub instanced: bool,
    pub filter_type: FilterType,
    /// Whether the server may cache this channel's payload across sessions
    pub cacheable: bool,
}

impl ChannelSchema {
    pub fn type_channel(id: ChannelId, name: &str, filter_type: FilterType) -> Self {
        Self {
            id,
            name: name.to_string(),
            instanced: false,
            filter_type,
            cacheable: false,
        }
    }

    pub fn instance_channel(id: ChannelId, name: &str, filter_type: FilterType) -> Self {
        Self {
            id,
            name: name.to_string(),
            instanced: true,
            filter_type,
            cacheable: false,
        }
    }

    pub fn cacheable(mut self) -> Self {
        self.cacheable = true;
        self
    }
}

/// Declaration of one replicated entity type
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EntitySchema {
    pub id: EntityTypeId,
    pub name: String,
}

impl EntitySchema {
    pub fn new(id: EntityTypeId, name: &str) -> Self {
        Self {
            id,
            name: name.to_string(),
        }
    }
}

/// The fixed channel and entity id space of one data system
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SystemSchema {
    pub id: SystemId,
    pub name: String,
    channels: Vec<ChannelSchema>,
    entities: Vec<EntitySchema>,
}

impl SystemSchema {
    pub fn new(id: SystemId, name: &str) -> Self {
        Self {
            id,
            name: name.to_string(),
            channels: Vec::new(),
            entities: Vec::new(),
        }
    }

    pub fn with_channel(mut self, channel: ChannelSchema) -> Self {
        self.channels.push(channel);
        self
    }

    pub fn with_entity(mut self, entity: EntitySchema) -> Self {
        self.entities.push(entity);
        self
    }

    pub fn channels(&self) -> &[ChannelSchema] {
        &self.channels
    }

    pub fn entities(&self) -> &[EntitySchema] {
        &self.entities
    }

    pub fn channel(&self, channel_id: ChannelId) -> Result<&ChannelSchema, SchemaError> {
        self.channels
            .iter()
            .find(|channel| channel.id == channel_id)
            .ok_or(SchemaError::UnknownChannel {
                system_id: self.id,
                channel_id,
            })
    }

    pub fn entity(&self, type_id: EntityTypeId) -> Result<&EntitySchema, SchemaError> {
        self.entities
            .iter()
            .find(|entity| entity.id == type_id)
            .ok_or(SchemaError::UnknownEntityType {
                system_id: self.id,
                type_id,
            })
    }

    /// Look up the channel an address refers to, checking that the address'
    /// instancing matches the declaration
    pub fn validate_address(&self, address: &ChannelAddress) -> Result<&ChannelSchema, SchemaError> {
        let channel = self.channel(address.channel_id())?;
        if channel.instanced != address.is_instance_channel() {
            return Err(SchemaError::InstanceMismatch { address: *address });
        }
        Ok(channel)
    }
}
