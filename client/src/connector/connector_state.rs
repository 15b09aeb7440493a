#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ConnectorState {
    Disconnected,
    Connecting,
    Connected,
    Disconnecting,
    Error,
}

impl ConnectorState {
    pub fn is_transitioning(&self) -> bool {
        matches!(self, ConnectorState::Connecting | ConnectorState::Disconnecting)
    }
}
