use thiserror::Error;

use replicant_shared::{AddressParseError, ChannelAddress, SchemaError, WireError};

/// Errors raised while handling a session's requests. Most indicate a client
/// that broke a protocol precondition and are reported back to it.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum ServerError {
    /// No live session has the id
    #[error("Unknown session {session_id}")]
    UnknownSession { session_id: String },

    #[error("Schema error: {0}")]
    Schema(#[from] SchemaError),

    #[error("Address error: {0}")]
    Address(#[from] AddressParseError),

    #[error("Wire error: {0}")]
    Wire(#[from] WireError),

    /// The filter of a STATIC or STATIC_INSTANCED channel can only change by
    /// unsubscribing first
    #[error("Filter of {address:?} cannot change while subscribed")]
    StaticFilterChange { address: ChannelAddress },

    /// A filter was supplied for a channel declared without filtering
    #[error("Channel {address:?} does not accept a filter")]
    FilterNotPermitted { address: ChannelAddress },

    /// A subscription entry already exists for the address
    #[error("Subscription entry for {address:?} already exists")]
    DuplicateSubscription { address: ChannelAddress },

    /// No subscription entry exists for the address
    #[error("No subscription entry for {address:?}")]
    MissingSubscription { address: ChannelAddress },

    /// The two entries are already linked
    #[error("{source_address:?} is already linked to {target:?}")]
    DuplicateLink {
        source_address: ChannelAddress,
        target: ChannelAddress,
    },

    /// An explicit unsubscribe targeted an entry that only exists because
    /// other entries imply it
    #[error("Subscription entry for {address:?} is still referenced by {inward_count} other entries")]
    EntryStillReferenced {
        address: ChannelAddress,
        inward_count: usize,
    },

    /// Bulk requests must target instances of a single channel
    #[error("Bulk request spans channels {first:?} and {other:?}")]
    BulkSpansChannels {
        first: ChannelAddress,
        other: ChannelAddress,
    },

    /// The data source failed to compute a channel payload
    #[error("Data source failed for {address:?}: {reason}")]
    DataSource {
        address: ChannelAddress,
        reason: String,
    },

    /// The packet sender failed to deliver to the session
    #[error("Sending to session {session_id} failed: {reason}")]
    Transport { session_id: String, reason: String },
}
