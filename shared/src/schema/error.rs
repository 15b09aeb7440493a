use thiserror::Error;

use crate::{ChannelAddress, ChannelId, EntityTypeId, SystemId};

/// Errors raised when a channel, entity type or system is not declared by the
/// schema, or an address does not fit its channel's declaration
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum SchemaError {
    /// No system registered with this id
    #[error("Unknown system {system_id}")]
    UnknownSystem { system_id: SystemId },

    /// A system with this id is already registered
    #[error("System {system_id} is already registered")]
    DuplicateSystem { system_id: SystemId },

    /// Channel id not declared by the system
    #[error("Unknown channel {channel_id} in system {system_id}")]
    UnknownChannel {
        system_id: SystemId,
        channel_id: ChannelId,
    },

    /// Entity type id not declared by the system
    #[error("Unknown entity type {type_id} in system {system_id}")]
    UnknownEntityType {
        system_id: SystemId,
        type_id: EntityTypeId,
    },

    /// Address carries an instance id for a type channel, or lacks one for an
    /// instance channel
    #[error("Address {address:?} does not match the instancing of its channel")]
    InstanceMismatch { address: ChannelAddress },
}
