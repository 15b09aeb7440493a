use std::collections::{btree_map::Entry, BTreeMap};

use log::{error, info, warn};

use replicant_shared::{ChannelAddress, Filter, RequestId, SystemId, SystemSchema};

use crate::{
    area_of_interest::AreaOfInterest,
    client_config::ClientConfig,
    client_state::ClientState,
    connector::{Connector, ConnectorEntry, ConnectorState, Transport},
    converger::{ConvergeOutcome, Converger},
    entity::EntityRegistry,
    spy::{Spy, SpyEvent},
    ClientError,
};

/// Client which declares areas of interest against one or more data systems
/// and keeps the local entity repository in sync with them.
///
/// The client is single-threaded and cooperative: the host calls [`tick`]
/// regularly and forwards transport outcomes through the `on_*` callbacks.
///
/// [`tick`]: ReplicantClient::tick
pub struct ReplicantClient {
    config: ClientConfig,
    connectors: BTreeMap<SystemId, ConnectorEntry>,
    state: ClientState,
    converger: Converger,
    spy: Spy,
    active: bool,
}

impl ReplicantClient {
    /// Create a new client
    pub fn new(config: ClientConfig, entity_registry: EntityRegistry) -> Self {
        let spy = Spy::new();
        Self {
            config,
            connectors: BTreeMap::new(),
            state: ClientState::new(entity_registry, spy.clone()),
            converger: Converger::new(),
            spy,
            active: false,
        }
    }

    pub fn spy(&self) -> &Spy {
        &self.spy
    }

    pub fn state(&self) -> &ClientState {
        &self.state
    }

    // Connectors

    /// Register the connector for a data system. Required connectors retry
    /// connecting faster than optional ones.
    pub fn add_connector(
        &mut self,
        schema: SystemSchema,
        transport: Box<dyn Transport>,
        required: bool,
        now_millis: u64,
    ) -> Result<(), ClientError> {
        let system_id = schema.id;
        let Entry::Vacant(vacant) = self.connectors.entry(system_id) else {
            return Err(ClientError::DuplicateConnector { system_id });
        };
        let rate_limit = if required {
            &self.config.required_rate_limit
        } else {
            &self.config.optional_rate_limit
        };
        info!("Adding connector for system {} ({})", system_id, schema.name);
        vacant.insert(ConnectorEntry::new(
            Connector::new(schema, transport, self.spy.clone()),
            required,
            rate_limit,
            now_millis,
        ));
        Ok(())
    }

    pub fn connector(&self, system_id: SystemId) -> Option<&Connector> {
        self.connectors.get(&system_id).map(ConnectorEntry::connector)
    }

    fn connector_mut(&mut self, system_id: SystemId) -> Result<&mut Connector, ClientError> {
        self.connectors
            .get_mut(&system_id)
            .map(ConnectorEntry::connector_mut)
            .ok_or(ClientError::UnknownSystem { system_id })
    }

    /// Whether every required connector is connected
    pub fn is_connected(&self) -> bool {
        self.connectors
            .values()
            .filter(|entry| entry.is_required())
            .all(|entry| entry.connector().is_connected())
    }

    pub fn is_active(&self) -> bool {
        self.active
    }

    /// Let `tick` connect any disconnected connector
    pub fn activate(&mut self) {
        self.active = true;
    }

    /// Stop reconnecting and disconnect every connector
    pub fn deactivate(&mut self) -> Result<(), ClientError> {
        self.active = false;
        let mut result = Ok(());
        for entry in self.connectors.values_mut() {
            if let Err(error) = entry.connector_mut().disconnect() {
                warn!("Deactivating: {}", error);
                result = Err(error);
            }
        }
        result
    }

    // Areas of interest

    pub fn area_of_interest(&self, address: &ChannelAddress) -> Option<&AreaOfInterest> {
        self.state.area_of_interest(address)
    }

    /// Declare interest in a channel, or retarget an existing declaration to
    /// `filter`
    pub fn create_area_of_interest(
        &mut self,
        address: ChannelAddress,
        filter: Option<Filter>,
    ) -> Result<&AreaOfInterest, ClientError> {
        self.validate_area_of_interest(&address, filter.as_ref())?;
        Ok(self.state.find_or_create_area_of_interest(address, filter))
    }

    pub fn update_area_of_interest(
        &mut self,
        address: &ChannelAddress,
        filter: Option<Filter>,
    ) -> Result<(), ClientError> {
        self.validate_area_of_interest(address, filter.as_ref())?;
        if self.state.set_area_of_interest_filter(address, filter) {
            Ok(())
        } else {
            Err(ClientError::UnknownAreaOfInterest { address: *address })
        }
    }

    /// Withdraw interest; the subscription is removed by a later converge.
    /// Returns false if no area of interest existed.
    pub fn dispose_area_of_interest(&mut self, address: &ChannelAddress) -> bool {
        self.state.remove_area_of_interest(address).is_some()
    }

    fn validate_area_of_interest(
        &self,
        address: &ChannelAddress,
        filter: Option<&Filter>,
    ) -> Result<(), ClientError> {
        let system_id = address.system_id();
        let connector = self
            .connector(system_id)
            .ok_or(ClientError::UnknownSystem { system_id })?;
        let channel = connector.schema().validate_address(address)?;
        if filter.is_some() && !channel.filter_type.accepts_filter() {
            return Err(ClientError::FilterNotPermitted { address: *address });
        }
        Ok(())
    }

    // Transport callbacks

    pub fn on_connected(&mut self, system_id: SystemId) -> Result<(), ClientError> {
        let connector = self
            .connectors
            .get_mut(&system_id)
            .map(ConnectorEntry::connector_mut)
            .ok_or(ClientError::UnknownSystem { system_id })?;
        if let Err(error) = connector.on_connected() {
            handle_message_failure(connector, &self.state, &error);
            return Err(error);
        }
        self.state.reset_failed_areas_of_interest(system_id);
        self.state.request_converge();
        Ok(())
    }

    pub fn on_connect_failure(&mut self, system_id: SystemId, error: &str) -> Result<(), ClientError> {
        warn!("System {} failed to connect: {}", system_id, error);
        self.connector_mut(system_id)?.on_connect_failure(error);
        self.on_connection_lost(system_id);
        Ok(())
    }

    pub fn on_disconnected(&mut self, system_id: SystemId) -> Result<(), ClientError> {
        self.connector_mut(system_id)?.on_disconnected();
        self.on_connection_lost(system_id);
        Ok(())
    }

    pub fn on_disconnect_failure(&mut self, system_id: SystemId, error: &str) -> Result<(), ClientError> {
        warn!("System {} failed to disconnect: {}", system_id, error);
        self.connector_mut(system_id)?.on_disconnect_failure(error);
        self.on_connection_lost(system_id);
        Ok(())
    }

    fn on_connection_lost(&mut self, system_id: SystemId) {
        self.state.purge_subscriptions(system_id);
        self.state.reset_failed_areas_of_interest(system_id);
        self.state.request_converge();
    }

    pub fn on_message_received(&mut self, system_id: SystemId, text: String) -> Result<(), ClientError> {
        self.connector_mut(system_id)?.on_message_received(text);
        Ok(())
    }

    // Requests

    /// Ask the system for a sync point. `SyncCompleted` is reported once the
    /// server has answered every earlier request.
    pub fn request_sync(&mut self, system_id: SystemId) -> Result<RequestId, ClientError> {
        self.connector_mut(system_id)?.request_sync()
    }

    /// Set the token sent to the system on every connect, sending it at once
    /// if already connected
    pub fn set_auth_token(&mut self, system_id: SystemId, token: Option<String>) -> Result<(), ClientError> {
        self.connector_mut(system_id)?.set_auth_token(token)
    }

    // Scheduling

    /// Run one convergence pass immediately
    pub fn converge(&mut self) -> Result<ConvergeOutcome, ClientError> {
        self.state.take_converge_request();
        self.converger.converge(&mut self.connectors, &mut self.state)
    }

    /// One slice of cooperative work: connect idle connectors, apply received
    /// messages within the configured budget, converge if anything relevant
    /// changed, then dispatch queued area of interest requests. Returns true
    /// if work remains for a later tick.
    pub fn tick(&mut self, now_millis: u64) -> bool {
        let budget = self.config.message_budget;
        let mut more = false;

        for entry in self.connectors.values_mut() {
            if self.active
                && matches!(
                    entry.connector().state(),
                    ConnectorState::Disconnected | ConnectorState::Error
                )
            {
                entry.attempt_action(now_millis, |connector| {
                    if let Err(error) = connector.connect() {
                        warn!("Connect attempt failed: {}", error);
                    }
                });
            }

            let connector = entry.connector_mut();
            match connector.progress_messages(&mut self.state, budget) {
                Ok(yielded) => more |= yielded,
                Err(error) => handle_message_failure(connector, &self.state, &error),
            }
        }

        if self.state.take_converge_request() {
            if let Err(error) = self.converger.converge(&mut self.connectors, &mut self.state) {
                error!("Converge failed: {}", error);
            }
        }

        for entry in self.connectors.values_mut() {
            let connector = entry.connector_mut();
            if let Err(error) = connector.progress_area_of_interest_requests(&mut self.state) {
                handle_message_failure(connector, &self.state, &error);
            }
        }

        more || self.state.is_converge_requested()
            || self
                .connectors
                .values()
                .any(|entry| entry.connector().has_pending_work())
    }
}

/// Report the failure and drop the connection; state is rebuilt by
/// resubscribing after the reconnect
fn handle_message_failure(connector: &mut Connector, state: &ClientState, error: &ClientError) {
    let system_id = connector.system_id();
    error!("Message processing failed on system {}: {}", system_id, error);
    state.spy().report(SpyEvent::MessageProcessFailed {
        system_id,
        error: error.to_string(),
    });
    if let Err(error) = connector.disconnect() {
        warn!("Disconnect after failure on system {} failed: {}", system_id, error);
    }
}
