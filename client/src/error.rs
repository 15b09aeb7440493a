use thiserror::Error;

use replicant_shared::{
    AddressParseError, ChannelAddress, RequestId, SchemaError, SystemId, WireError,
};

use crate::{connector::ConnectorState, entity::EntityKey};

/// Errors surfaced by the client side of the protocol
#[derive(Debug, Clone, PartialEq, Error)]
pub enum ClientError {
    /// No connector is registered for the system
    #[error("No connector registered for system {system_id}")]
    UnknownSystem { system_id: SystemId },

    /// A connector for the system was already added
    #[error("Connector for system {system_id} is already registered")]
    DuplicateConnector { system_id: SystemId },

    /// Subscribe/unsubscribe/update requests are only accepted while connected
    #[error("Connector for system {system_id} is {state:?}, requests require Connected")]
    NotConnected {
        system_id: SystemId,
        state: ConnectorState,
    },

    /// The transport hook reported a failure
    #[error("Transport failure on system {system_id}: {reason}")]
    Transport { system_id: SystemId, reason: String },

    #[error("Schema error: {0}")]
    Schema(#[from] SchemaError),

    #[error("Wire error: {0}")]
    Wire(#[from] WireError),

    #[error("Address error: {0}")]
    Address(#[from] AddressParseError),

    /// No area of interest is declared for the address
    #[error("No area of interest declared for {address:?}")]
    UnknownAreaOfInterest { address: ChannelAddress },

    /// A change referenced a channel the client is not subscribed to
    #[error("No subscription exists for channel {address:?}")]
    MissingSubscription { address: ChannelAddress },

    /// A filter was supplied for a channel declared without filtering
    #[error("Channel {address:?} does not accept a filter")]
    FilterNotPermitted { address: ChannelAddress },

    /// The server told the client to use a cached payload it does not hold
    #[error("No cached payload for {address:?} with etag {etag}")]
    CacheMismatch {
        address: ChannelAddress,
        etag: String,
    },

    /// The linking pass could not resolve an entity reference
    #[error("Entity {entity:?} references missing entity {target:?} through '{field}'")]
    UnresolvedReference {
        entity: EntityKey,
        field: String,
        target: EntityKey,
    },

    /// A reference field holds something other than an entity id
    #[error("Entity {entity:?} has a malformed reference in '{field}'")]
    MalformedReference { entity: EntityKey, field: String },

    /// The server reported an error not tied to any request
    #[error("Server error: {message}")]
    Server { message: String },

    /// A response carried a request id the connection never issued
    #[error("Unknown request {request_id} on system {system_id}")]
    UnknownRequest {
        system_id: SystemId,
        request_id: RequestId,
    },
}
