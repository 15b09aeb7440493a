//! # Replicant Server
//! Tracks each session's channel subscriptions as a graph of explicit and
//! implied entries, serves channel payloads through a shared cache and queues
//! change sets for delivery to clients.

#![deny(
    trivial_casts,
    trivial_numeric_casts,
    unstable_features,
    unused_import_braces
)]

mod channel_cache;
mod data_source;
mod error;
mod message_broker;
mod server_config;
mod session;
mod session_manager;

pub use channel_cache::{CachedChannel, ChannelCache};
pub use data_source::{ChannelLink, ChannelPayload, DataSource};
pub use error::ServerError;
pub use message_broker::{MessageBroker, PacketSender};
pub use server_config::ServerConfig;
pub use session::{ReplicantSession, SessionState, SubscriptionEntry};
pub use session_manager::ReplicantSessionManager;
