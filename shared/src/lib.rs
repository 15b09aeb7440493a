//! # Replicant Shared
//! Channel addressing, schema, rate limiting and wire messages shared between
//! replicant-server & replicant-client crates.

#![deny(trivial_numeric_casts, unstable_features, unused_import_braces)]

mod channel;
mod rate_limiter;
mod schema;
mod types;
mod wire;

pub use channel::{
    channel_address::ChannelAddress,
    error::AddressParseError,
    filter::{Filter, FilterType},
};
pub use rate_limiter::{RateLimitConfig, RateLimiter};
pub use schema::{
    error::SchemaError,
    schema_registry::SchemaRegistry,
    system_schema::{ChannelSchema, EntitySchema, SystemSchema},
};
pub use types::{ChannelId, EntityId, EntityTypeId, InstanceId, RequestId, Sequence, SystemId};
pub use wire::{
    change_set::{
        ChangeSetMessage, ChannelActionMessage, ChannelActionType, EntityChangeMessage,
        EntityData,
    },
    client_message::ClientMessage,
    error::WireError,
    server_message::ServerMessage,
};
