//! # Replicant Client
//! Declares areas of interest against replicant servers, converges them into
//! channel subscriptions and applies the resulting change sets to a local
//! entity repository.

#![deny(trivial_numeric_casts, unstable_features, unused_import_braces)]

mod area_of_interest;
mod client;
mod client_config;
mod client_state;
mod connection;
mod connector;
mod converger;
mod entity;
mod error;
mod spy;
mod subscription;

pub use area_of_interest::{AreaOfInterest, AreaOfInterestStatus};
pub use client::ReplicantClient;
pub use client_config::ClientConfig;
pub use client_state::ClientState;
pub use connection::{
    AreaOfInterestAction, AreaOfInterestRequest, Connection, MessageResponse, RequestCompletion,
    RequestEntry,
};
pub use connector::{CacheEntry, Connector, ConnectorEntry, ConnectorState, Transport, TransportError};
pub use converger::{ConvergeOutcome, Converger};
pub use entity::{Entity, EntityKey, EntityLinker, EntityRegistry, EntityRepository, ReferenceLinker};
pub use error::ClientError;
pub use spy::{Spy, SpyEvent};
pub use subscription::Subscription;
