use std::{
    collections::BTreeMap,
    time::{Duration, Instant},
};

use log::{debug, info, warn};

use replicant_shared::{
    ChannelActionType, ChannelAddress, ClientMessage, EntityChangeMessage, Filter, RequestId,
    ServerMessage, SystemId, SystemSchema,
};

use crate::{
    area_of_interest::AreaOfInterestStatus,
    client_state::ClientState,
    connection::{
        AreaOfInterestAction, AreaOfInterestRequest, Connection, MessageResponse,
        RequestCompletion,
    },
    connector::{ConnectorState, Transport},
    entity::EntityKey,
    spy::{Spy, SpyEvent},
    ClientError,
};

/// Payload of a cacheable channel as last received, with the server's etag
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CacheEntry {
    pub etag: String,
    pub content: String,
}

/// Owns the transport and connection for one data system and drives the
/// connect/disconnect state machine
pub struct Connector {
    schema: SystemSchema,
    state: ConnectorState,
    transport: Box<dyn Transport>,
    connection: Option<Connection>,
    session_id: Option<String>,
    auth_token: Option<String>,
    cache: BTreeMap<ChannelAddress, CacheEntry>,
    spy: Spy,
}

impl Connector {
    pub fn new(schema: SystemSchema, transport: Box<dyn Transport>, spy: Spy) -> Self {
        Self {
            schema,
            state: ConnectorState::Disconnected,
            transport,
            connection: None,
            session_id: None,
            auth_token: None,
            cache: BTreeMap::new(),
            spy,
        }
    }

    pub fn system_id(&self) -> SystemId {
        self.schema.id
    }

    pub fn schema(&self) -> &SystemSchema {
        &self.schema
    }

    pub fn state(&self) -> ConnectorState {
        self.state
    }

    pub fn is_connected(&self) -> bool {
        ConnectorState::Connected == self.state
    }

    pub fn connection(&self) -> Option<&Connection> {
        self.connection.as_ref()
    }

    pub fn session_id(&self) -> Option<&str> {
        self.session_id.as_deref()
    }

    pub fn cache_entry(&self, address: &ChannelAddress) -> Option<&CacheEntry> {
        self.cache.get(address)
    }

    fn set_state(&mut self, state: ConnectorState) {
        if self.state != state {
            info!(
                "Connector {} ({}) {:?} -> {:?}",
                self.schema.id, self.schema.name, self.state, state
            );
            let from = self.state;
            self.state = state;
            self.spy.report(SpyEvent::ConnectorStateChanged {
                system_id: self.schema.id,
                from,
                to: state,
            });
        }
    }

    fn transport_error(&self, reason: String) -> ClientError {
        ClientError::Transport {
            system_id: self.schema.id,
            reason,
        }
    }

    // Connection state machine

    /// Start connecting. A no-op when connected or mid-transition.
    pub fn connect(&mut self) -> Result<(), ClientError> {
        if ConnectorState::Connected == self.state || self.state.is_transitioning() {
            return Ok(());
        }
        match self.transport.connect() {
            Ok(()) => {
                self.set_state(ConnectorState::Connecting);
                Ok(())
            }
            Err(error) => {
                self.connection = None;
                self.set_state(ConnectorState::Error);
                self.spy.report(SpyEvent::ConnectFailed {
                    system_id: self.schema.id,
                    error: error.reason.clone(),
                });
                Err(self.transport_error(error.reason))
            }
        }
    }

    /// Start disconnecting. A no-op when disconnected or mid-transition.
    pub fn disconnect(&mut self) -> Result<(), ClientError> {
        if ConnectorState::Disconnected == self.state || self.state.is_transitioning() {
            return Ok(());
        }
        match self.transport.disconnect() {
            Ok(()) => {
                self.set_state(ConnectorState::Disconnecting);
                Ok(())
            }
            Err(error) => {
                self.connection = None;
                self.set_state(ConnectorState::Error);
                self.spy.report(SpyEvent::DisconnectFailed {
                    system_id: self.schema.id,
                    error: error.reason.clone(),
                });
                Err(self.transport_error(error.reason))
            }
        }
    }

    pub(crate) fn on_connected(&mut self) -> Result<(), ClientError> {
        if ConnectorState::Connecting != self.state {
            warn!(
                "Connector {} reported connected while {:?}",
                self.schema.id, self.state
            );
        }
        self.connection = Some(Connection::new());
        self.session_id = None;
        self.set_state(ConnectorState::Connected);

        if let Some(token) = self.auth_token.clone() {
            self.send_request("AuthToken", None, RequestCompletion::AuthToken, |request_id| {
                ClientMessage::AuthToken {
                    request_id,
                    token: Some(token),
                }
            })?;
        }
        if !self.cache.is_empty() {
            let channel_to_etag = self
                .cache
                .iter()
                .map(|(address, entry)| (address.descriptor(), entry.etag.clone()))
                .collect();
            self.send_request("Etags", None, RequestCompletion::Etags, |request_id| {
                ClientMessage::Etags {
                    request_id,
                    channel_to_etag,
                }
            })?;
        }
        Ok(())
    }

    pub(crate) fn on_connect_failure(&mut self, error: &str) {
        self.connection = None;
        self.set_state(ConnectorState::Error);
        self.spy.report(SpyEvent::ConnectFailed {
            system_id: self.schema.id,
            error: error.to_string(),
        });
    }

    pub(crate) fn on_disconnected(&mut self) {
        self.connection = None;
        self.session_id = None;
        self.set_state(ConnectorState::Disconnected);
    }

    pub(crate) fn on_disconnect_failure(&mut self, error: &str) {
        self.connection = None;
        self.set_state(ConnectorState::Error);
        self.spy.report(SpyEvent::DisconnectFailed {
            system_id: self.schema.id,
            error: error.to_string(),
        });
    }

    // Requests

    fn connected_connection(&mut self) -> Result<&mut Connection, ClientError> {
        let state = self.state;
        let system_id = self.schema.id;
        match self.connection.as_mut() {
            Some(connection) if ConnectorState::Connected == state => Ok(connection),
            _ => Err(ClientError::NotConnected { system_id, state }),
        }
    }

    fn validate_request(
        &self,
        address: &ChannelAddress,
        filter: Option<&Filter>,
    ) -> Result<(), ClientError> {
        let channel = self.schema.validate_address(address)?;
        if filter.is_some() && !channel.filter_type.accepts_filter() {
            return Err(ClientError::FilterNotPermitted { address: *address });
        }
        Ok(())
    }

    pub fn request_subscribe(
        &mut self,
        address: ChannelAddress,
        filter: Option<Filter>,
    ) -> Result<(), ClientError> {
        self.validate_request(&address, filter.as_ref())?;
        self.connected_connection()?.request_subscribe(address, filter);
        self.spy.report(SpyEvent::SubscribeRequestQueued { address });
        Ok(())
    }

    pub fn request_subscription_update(
        &mut self,
        address: ChannelAddress,
        filter: Option<Filter>,
    ) -> Result<(), ClientError> {
        self.validate_request(&address, filter.as_ref())?;
        self.connected_connection()?
            .request_subscription_update(address, filter);
        self.spy
            .report(SpyEvent::SubscriptionUpdateRequestQueued { address });
        Ok(())
    }

    pub fn request_unsubscribe(&mut self, address: ChannelAddress) -> Result<(), ClientError> {
        self.validate_request(&address, None)?;
        self.connected_connection()?.request_unsubscribe(address);
        self.spy
            .report(SpyEvent::UnsubscribeRequestQueued { address });
        Ok(())
    }

    /// Send a sync point; completes once the server has answered every
    /// request sent before it
    pub fn request_sync(&mut self) -> Result<RequestId, ClientError> {
        self.send_request("Sync", None, RequestCompletion::Sync, |request_id| {
            ClientMessage::Ping { request_id }
        })
    }

    pub fn set_auth_token(&mut self, token: Option<String>) -> Result<(), ClientError> {
        self.auth_token = token.clone();
        if self.is_connected() {
            self.send_request("AuthToken", None, RequestCompletion::AuthToken, |request_id| {
                ClientMessage::AuthToken { request_id, token }
            })?;
        }
        Ok(())
    }

    pub fn last_index_of_pending_area_of_interest_request(
        &self,
        action: AreaOfInterestAction,
        address: &ChannelAddress,
        filter: Option<&Filter>,
    ) -> Option<usize> {
        self.connection.as_ref().and_then(|connection| {
            connection.last_index_of_pending_area_of_interest_request(action, address, filter)
        })
    }

    fn send_request<F: FnOnce(RequestId) -> ClientMessage>(
        &mut self,
        name: &str,
        cache_key: Option<ChannelAddress>,
        completion: RequestCompletion,
        build: F,
    ) -> Result<RequestId, ClientError> {
        let request_id = self
            .connected_connection()?
            .new_request(name, cache_key, completion);
        let text = build(request_id).encode()?;
        debug!("Connector {} sending {}", self.schema.id, text);
        self.transport
            .send(text)
            .map_err(|error| self.transport_error(error.reason))?;
        self.spy.report(SpyEvent::RequestStarted {
            system_id: self.schema.id,
            request_id,
            name: name.to_string(),
        });
        Ok(request_id)
    }

    /// Dispatch the next group of queued area of interest requests as one
    /// network request. Only one group is in flight at a time. Returns true if
    /// a request was sent.
    pub(crate) fn progress_area_of_interest_requests(
        &mut self,
        state: &mut ClientState,
    ) -> Result<bool, ClientError> {
        let group = match self.connection.as_ref() {
            Some(connection)
                if self.is_connected()
                    && !connection.has_area_of_interest_request_in_progress() =>
            {
                connection.peek_next_area_of_interest_group()
            }
            _ => return Ok(false),
        };
        let Some(head) = group.first() else {
            return Ok(false);
        };

        let action = head.action();
        let filter = head.filter().cloned();
        let channel = self.schema.validate_address(head.address())?;
        let cache_key = (AreaOfInterestAction::Add == action && 1 == group.len() && channel.cacheable)
            .then(|| *head.address());
        let channels: Vec<String> = group
            .iter()
            .map(|request| request.address().descriptor())
            .collect();
        let name = format!("{:?}({})", action, channels.join(","));

        let request_id = self.send_request(
            &name,
            cache_key,
            RequestCompletion::AreaOfInterest(group.clone()),
            |request_id| build_area_of_interest_message(request_id, action, channels, filter),
        )?;
        if let Some(connection) = self.connection.as_mut() {
            connection.start_next_area_of_interest_group(request_id);
        }

        for request in &group {
            let status = match request.action() {
                AreaOfInterestAction::Add => AreaOfInterestStatus::Loading,
                AreaOfInterestAction::Update => AreaOfInterestStatus::Updating,
                AreaOfInterestAction::Remove => AreaOfInterestStatus::Unloading,
            };
            state.update_area_of_interest(request.address(), status, None);
        }
        Ok(true)
    }

    // Inbound messages

    pub(crate) fn on_message_received(&mut self, text: String) {
        match self.connection.as_mut() {
            Some(connection) => connection.enqueue_response(text),
            None => debug!(
                "Connector {} dropping message received without a connection",
                self.schema.id
            ),
        }
    }

    /// True while any area of interest request is queued or in flight
    pub fn has_pending_area_of_interest_requests(&self) -> bool {
        self.connection
            .as_ref()
            .map(|connection| !connection.pending_area_of_interest_requests().is_empty())
            .unwrap_or(false)
    }

    pub fn has_pending_work(&self) -> bool {
        self.connection
            .as_ref()
            .map(|connection| {
                connection.has_pending_messages()
                    || (!connection.has_area_of_interest_request_in_progress()
                        && connection.has_queued_area_of_interest_requests())
            })
            .unwrap_or(false)
    }

    /// Apply received messages until none are ready or `budget` is spent.
    /// Returns true if it yielded with work remaining.
    pub(crate) fn progress_messages(
        &mut self,
        state: &mut ClientState,
        budget: Duration,
    ) -> Result<bool, ClientError> {
        let started = Instant::now();
        loop {
            if !self.progress_message_step(state)? {
                return Ok(false);
            }
            if started.elapsed() >= budget {
                return Ok(true);
            }
        }
    }

    /// Perform one unit of message work: parse one payload, or apply the
    /// channel actions, one entity change, the linking pass, or the completion
    /// of the current response. Returns false when there is nothing to do.
    pub(crate) fn progress_message_step(
        &mut self,
        state: &mut ClientState,
    ) -> Result<bool, ClientError> {
        let Some(connection) = self.connection.as_mut() else {
            return Ok(false);
        };
        if connection.current_message_response().is_none() {
            if let Some(raw) = connection.pop_unparsed_response() {
                self.parse_response(raw, state)?;
                return Ok(true);
            }
            let next = connection.select_next_message_response();
            if next.is_none() {
                return Ok(false);
            }
            connection.set_current_message_response(next);
        }

        let Self {
            schema,
            connection,
            spy,
            cache,
            ..
        } = self;
        let Some(connection) = connection.as_mut() else {
            return Ok(false);
        };
        let Some(mut response) = connection.take_current_message_response() else {
            return Ok(false);
        };

        if !response.are_channel_actions_processed() {
            process_channel_actions(schema, connection, state, &response)?;
            response.mark_channel_actions_processed();
            connection.set_current_message_response(Some(response));
            return Ok(true);
        }

        if let Some(change) = response.next_entity_change() {
            apply_entity_change(schema, state, &mut response, change)?;
            connection.set_current_message_response(Some(response));
            return Ok(true);
        }

        if !response.is_linked() {
            link_entities(state, &response)?;
            response.mark_linked();
            connection.set_current_message_response(Some(response));
            return Ok(true);
        }

        if !response.is_out_of_band() {
            connection.set_last_rx_sequence(response.sequence());
        }
        if let Some(request_id) = response.request_id() {
            let cache_key = connection
                .request(request_id)
                .and_then(|entry| entry.cache_key().copied());
            if let (Some(address), Some(etag)) = (cache_key, response.etag()) {
                debug!("Caching {:?} with etag {}", address, etag);
                cache.insert(
                    address,
                    CacheEntry {
                        etag: etag.to_string(),
                        content: response.raw().to_string(),
                    },
                );
            }
            complete_request(schema.id, connection, state, spy, request_id, true, None)?;
        }
        spy.report(SpyEvent::MessageProcessed {
            system_id: schema.id,
            sequence: (!response.is_out_of_band()).then(|| response.sequence()),
            request_id: response.request_id(),
        });
        Ok(true)
    }

    fn parse_response(&mut self, raw: String, state: &mut ClientState) -> Result<(), ClientError> {
        let system_id = self.schema.id;
        let message = ServerMessage::decode(&raw)?;
        let Self {
            connection,
            spy,
            cache,
            session_id,
            ..
        } = self;
        let Some(connection) = connection.as_mut() else {
            return Ok(());
        };
        match message {
            ServerMessage::SessionCreated { session_id: id } => {
                info!("Connector {} joined session {}", system_id, id);
                *session_id = Some(id);
            }
            ServerMessage::ChangeSet(change_set) => {
                if let Some(request_id) = change_set.request_id {
                    match connection.request_mut(request_id) {
                        Some(entry) => entry.mark_results_arrived(),
                        None => warn!(
                            "Change set {} answers unknown request {}",
                            change_set.last_id, request_id
                        ),
                    }
                }
                connection.enqueue_parsed_response(MessageResponse::sequenced(change_set, raw));
            }
            ServerMessage::UseCache { channel, etag } => {
                let address = ChannelAddress::parse(system_id, &channel)?;
                let cached = cache
                    .get(&address)
                    .filter(|entry| entry.etag == etag)
                    .map(|entry| entry.content.clone());
                let change_set = match cached.as_deref().map(ServerMessage::decode) {
                    Some(Ok(ServerMessage::ChangeSet(change_set))) => change_set,
                    _ => {
                        cache.remove(&address);
                        return Err(ClientError::CacheMismatch { address, etag });
                    }
                };
                debug!("Using cached payload for {:?} etag {}", address, etag);
                connection.enqueue_out_of_band_response(MessageResponse::out_of_band(
                    change_set,
                    cached.unwrap_or_default(),
                ));
            }
            ServerMessage::Error {
                request_id: Some(request_id),
                message,
            } => {
                warn!("Request {} on system {} failed: {}", request_id, system_id, message);
                complete_request(
                    system_id,
                    connection,
                    state,
                    spy,
                    request_id,
                    false,
                    Some(message),
                )?;
            }
            ServerMessage::Error {
                request_id: None,
                message,
            } => return Err(ClientError::Server { message }),
        }
        Ok(())
    }
}

fn build_area_of_interest_message(
    request_id: RequestId,
    action: AreaOfInterestAction,
    mut channels: Vec<String>,
    filter: Option<Filter>,
) -> ClientMessage {
    match (action, channels.len()) {
        (AreaOfInterestAction::Remove, 1) => ClientMessage::Unsubscribe {
            request_id,
            channel: channels.remove(0),
        },
        (AreaOfInterestAction::Remove, _) => ClientMessage::BulkUnsubscribe {
            request_id,
            channels,
        },
        (_, 1) => ClientMessage::Subscribe {
            request_id,
            channel: channels.remove(0),
            filter,
        },
        (_, _) => ClientMessage::BulkSubscribe {
            request_id,
            channels,
            filter,
        },
    }
}

fn process_channel_actions(
    schema: &SystemSchema,
    connection: &Connection,
    state: &mut ClientState,
    response: &MessageResponse,
) -> Result<(), ClientError> {
    for action in &response.change_set().channel_actions {
        let address = action.address(schema.id);
        schema.validate_address(&address)?;
        debug!("Channel action {:?} {:?}", action.action, address);
        match action.action {
            ChannelActionType::Add => {
                let explicit =
                    connection.has_dispatched_request(AreaOfInterestAction::Add, &address);
                state.subscribe(address, action.filter.clone(), explicit);
            }
            ChannelActionType::Remove => state.unsubscribe(&address)?,
            ChannelActionType::Update => {
                state.update_subscription_filter(&address, action.filter.clone())?
            }
            ChannelActionType::Delete => {
                if state.subscription(&address).is_some() {
                    state.unsubscribe(&address)?;
                }
                state.update_area_of_interest(&address, AreaOfInterestStatus::Deleted, None);
            }
        }
    }
    Ok(())
}

fn apply_entity_change(
    schema: &SystemSchema,
    state: &mut ClientState,
    response: &mut MessageResponse,
    change: EntityChangeMessage,
) -> Result<(), ClientError> {
    schema.entity(change.type_id)?;
    let key = EntityKey::new(schema.id, change.type_id, change.id);
    let channels = change.channel_addresses(schema.id)?;
    match change.data {
        Some(data) => {
            state.update_entity(key, data, &channels)?;
            response.record_updated(key);
        }
        None => {
            if state.remove_entity(&key, &channels) {
                response.record_removed(key);
            }
        }
    }
    Ok(())
}

/// Resolve references of every entity updated by the batch, now that all of
/// the batch's creates and updates are visible
fn link_entities(state: &mut ClientState, response: &MessageResponse) -> Result<(), ClientError> {
    for key in response.entities_to_link() {
        let references = {
            let Some(entity) = state.entities().get(&key) else {
                continue;
            };
            let Some(linker) = state.entity_registry().linker(key.system_id, key.type_id) else {
                continue;
            };
            linker.link(entity, state.entities())?
        };
        state.set_entity_references(&key, references);
    }
    Ok(())
}

fn complete_request(
    system_id: SystemId,
    connection: &mut Connection,
    state: &mut ClientState,
    spy: &Spy,
    request_id: RequestId,
    normal: bool,
    error: Option<String>,
) -> Result<(), ClientError> {
    let mut entry = connection
        .remove_request(request_id)
        .ok_or(ClientError::UnknownRequest {
            system_id,
            request_id,
        })?;
    match entry.take_completion(normal) {
        Some(RequestCompletion::AreaOfInterest(requests)) => {
            connection.remove_area_of_interest_requests(request_id);
            for request in &requests {
                complete_area_of_interest_request(state, request, normal, error.clone());
            }
        }
        Some(RequestCompletion::Sync) if normal => {
            spy.report(SpyEvent::SyncCompleted { system_id });
        }
        _ => {}
    }
    state.request_converge();
    spy.report(SpyEvent::RequestCompleted {
        system_id,
        request_id,
        name: entry.name().to_string(),
        normal,
    });
    Ok(())
}

fn complete_area_of_interest_request(
    state: &mut ClientState,
    request: &AreaOfInterestRequest,
    normal: bool,
    error: Option<String>,
) {
    let address = request.address();
    let subscribed = state.subscription(address).is_some();
    let status = match (request.action(), normal) {
        (AreaOfInterestAction::Add, true) => {
            state.mark_subscription_explicit(address);
            AreaOfInterestStatus::Loaded
        }
        (AreaOfInterestAction::Add, false) if subscribed => {
            state.mark_subscription_explicit(address);
            AreaOfInterestStatus::Loaded
        }
        (AreaOfInterestAction::Add, false) => AreaOfInterestStatus::LoadFailed,
        (AreaOfInterestAction::Update, true) => AreaOfInterestStatus::Updated,
        (AreaOfInterestAction::Update, false) => AreaOfInterestStatus::UpdateFailed,
        (AreaOfInterestAction::Remove, normal) => {
            if subscribed {
                state.demote_subscription(address);
            }
            if !normal {
                warn!("Unsubscribe from {:?} failed: {:?}", address, error);
                return;
            }
            AreaOfInterestStatus::Unloaded
        }
    };
    let error = if normal { None } else { error };
    state.update_area_of_interest(address, status, error);
}
