use thiserror::Error;

#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("{reason}")]
pub struct TransportError {
    pub reason: String,
}

impl TransportError {
    pub fn new(reason: &str) -> Self {
        Self {
            reason: reason.to_string(),
        }
    }
}

/// The socket underneath a connector. Hooks start work and return; outcomes
/// arrive later through the client's `on_connected`/`on_disconnected`/
/// `on_message_received` callbacks. A hook returning an error has failed
/// synchronously.
pub trait Transport {
    fn connect(&mut self) -> Result<(), TransportError>;
    fn disconnect(&mut self) -> Result<(), TransportError>;
    fn send(&mut self, text: String) -> Result<(), TransportError>;
}
