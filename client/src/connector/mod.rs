mod connector;
mod connector_entry;
mod connector_state;
mod transport;

pub use connector::{CacheEntry, Connector};
pub use connector_entry::ConnectorEntry;
pub use connector_state::ConnectorState;
pub use transport::{Transport, TransportError};
