use std::{
    collections::{BTreeMap, HashMap, VecDeque},
    sync::{Arc, PoisonError, RwLock},
    time::Instant,
};

use log::{debug, info, warn};

use replicant_shared::{
    ChangeSetMessage, ChannelActionMessage, ChannelActionType, ChannelAddress, ChannelSchema,
    ClientMessage, EntityChangeMessage, Filter, ServerMessage, SystemSchema,
};

use crate::{
    channel_cache::{CachedChannel, ChannelCache},
    data_source::{ChannelLink, DataSource},
    message_broker::{MessageBroker, PacketSender},
    session::{ReplicantSession, SessionState},
    ServerConfig, ServerError,
};

/// Owns every session of one data system and applies their requests to the
/// per-session subscription graphs.
///
/// Lookups share the session map's read lock; creating and invalidating
/// sessions takes it exclusively. Request handling holds the session's own
/// lock for the whole request.
pub struct ReplicantSessionManager {
    config: ServerConfig,
    schema: SystemSchema,
    sessions: RwLock<HashMap<String, Arc<ReplicantSession>>>,
    cache: ChannelCache,
    broker: MessageBroker,
    data_source: Arc<dyn DataSource>,
}

impl ReplicantSessionManager {
    pub fn new(
        config: ServerConfig,
        schema: SystemSchema,
        data_source: Arc<dyn DataSource>,
        sender: Box<dyn PacketSender>,
    ) -> Self {
        Self {
            config,
            schema,
            sessions: RwLock::new(HashMap::new()),
            cache: ChannelCache::new(),
            broker: MessageBroker::new(sender),
            data_source,
        }
    }

    pub fn schema(&self) -> &SystemSchema {
        &self.schema
    }

    pub fn cache(&self) -> &ChannelCache {
        &self.cache
    }

    pub fn broker(&self) -> &MessageBroker {
        &self.broker
    }

    // Sessions

    /// Create a session with a fresh random id and queue its `SessionCreated`
    /// notice
    pub fn create_session(&self) -> Result<Arc<ReplicantSession>, ServerError> {
        let session = {
            let mut sessions = self.sessions.write().unwrap_or_else(PoisonError::into_inner);
            let session_id = loop {
                let candidate = format!("{:016x}", fastrand::u64(..));
                if !sessions.contains_key(&candidate) {
                    break candidate;
                }
            };
            let session = Arc::new(ReplicantSession::new(session_id.clone(), Instant::now()));
            sessions.insert(session_id, session.clone());
            session
        };
        info!("Session {} created", session.id());
        self.send_out_of_band(
            &session,
            &ServerMessage::SessionCreated {
                session_id: session.id().to_string(),
            },
        )?;
        Ok(session)
    }

    pub fn session(&self, session_id: &str) -> Result<Arc<ReplicantSession>, ServerError> {
        self.sessions
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .get(session_id)
            .cloned()
            .ok_or_else(|| ServerError::UnknownSession {
                session_id: session_id.to_string(),
            })
    }

    pub fn session_ids(&self) -> Vec<String> {
        self.sessions
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .keys()
            .cloned()
            .collect()
    }

    fn sessions_snapshot(&self) -> Vec<Arc<ReplicantSession>> {
        self.sessions
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .values()
            .cloned()
            .collect()
    }

    /// Remove a session and drop anything still queued for it. Returns false
    /// if no such session existed.
    pub fn invalidate_session(&self, session_id: &str) -> bool {
        let removed = self
            .sessions
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .remove(session_id)
            .is_some();
        if removed {
            self.broker.remove_session(session_id);
            info!("Session {} invalidated", session_id);
        }
        removed
    }

    /// Invalidate every session without traffic for longer than the
    /// configured timeout, returning their ids
    pub fn remove_idle_sessions(&self, now: Instant) -> Vec<String> {
        let timeout = self.config.session_idle_timeout;
        let idle: Vec<String> = self
            .sessions_snapshot()
            .iter()
            .filter(|session| session.is_idle(now, timeout))
            .map(|session| session.id().to_string())
            .collect();
        for session_id in &idle {
            self.invalidate_session(session_id);
        }
        idle
    }

    /// Write every queued message out through the packet sender
    pub fn flush(&self) -> Result<usize, ServerError> {
        self.broker.flush()
    }

    // Requests

    /// Apply one client message. The reply is a change set acknowledging the
    /// request id. The request runs against a staged copy of the session
    /// state, so a rejected request changes nothing and is answered with an
    /// `Error` message alone.
    pub fn handle_message(&self, session_id: &str, text: &str) -> Result<(), ServerError> {
        let session = self.session(session_id)?;
        session.touch(Instant::now());
        let message = ClientMessage::decode(text)?;
        let request_id = message.request_id();
        debug!("Session {} request {}: {:?}", session_id, request_id, message);

        let mut state = session.lock();
        let mut staged = state.clone();
        let mut change_set = ChangeSetMessage {
            request_id: Some(request_id),
            ..Default::default()
        };
        let mut out_of_band = Vec::new();
        match self.process_message(&mut staged, message, &mut change_set, &mut out_of_band) {
            Ok(()) => {
                *state = staged;
                for message in &out_of_band {
                    self.send_out_of_band(&session, message)?;
                }
                self.send_change_set(&session, &mut state, change_set)
            }
            Err(error) => {
                warn!(
                    "Session {} request {} rejected: {}",
                    session_id, request_id, error
                );
                self.send_out_of_band(
                    &session,
                    &ServerMessage::Error {
                        request_id: Some(request_id),
                        message: error.to_string(),
                    },
                )
            }
        }
    }

    /// Messages the request must send ahead of its change set are pushed to
    /// `out_of_band`
    fn process_message(
        &self,
        state: &mut SessionState,
        message: ClientMessage,
        change_set: &mut ChangeSetMessage,
        out_of_band: &mut Vec<ServerMessage>,
    ) -> Result<(), ServerError> {
        match message {
            ClientMessage::Subscribe {
                channel, filter, ..
            } => {
                let address = ChannelAddress::parse(self.schema.id, &channel)?;
                let cacheable = self.schema.validate_address(&address)?.cacheable;
                if cacheable && filter.is_none() && !state.is_subscribed(&address) {
                    self.subscribe_cached(state, address, change_set, out_of_band)
                } else {
                    self.subscribe(state, address, filter, true, change_set)
                }
            }
            ClientMessage::BulkSubscribe {
                channels, filter, ..
            } => {
                let addresses = self.parse_channels(&channels)?;
                self.bulk_subscribe(state, &addresses, filter, change_set)
            }
            ClientMessage::Unsubscribe { channel, .. } => {
                let address = ChannelAddress::parse(self.schema.id, &channel)?;
                self.unsubscribe(state, &address, true, change_set).map(|_| ())
            }
            ClientMessage::BulkUnsubscribe { channels, .. } => {
                let addresses = self.parse_channels(&channels)?;
                self.bulk_unsubscribe(state, &addresses, change_set)
            }
            ClientMessage::Ping { .. } => Ok(()),
            ClientMessage::AuthToken { token, .. } => {
                state.set_auth_token(token);
                Ok(())
            }
            ClientMessage::Etags {
                channel_to_etag, ..
            } => {
                let etags = channel_to_etag
                    .into_iter()
                    .map(|(channel, etag)| {
                        ChannelAddress::parse(self.schema.id, &channel).map(|address| (address, etag))
                    })
                    .collect::<Result<BTreeMap<_, _>, _>>()?;
                state.replace_etags(etags);
                Ok(())
            }
        }
    }

    fn parse_channels(&self, channels: &[String]) -> Result<Vec<ChannelAddress>, ServerError> {
        let addresses = channels
            .iter()
            .map(|channel| ChannelAddress::parse(self.schema.id, channel))
            .collect::<Result<Vec<_>, _>>()?;
        if let Some(first) = addresses.first() {
            if let Some(other) = addresses.iter().find(|address| !first.same_channel(address)) {
                return Err(ServerError::BulkSpansChannels {
                    first: *first,
                    other: *other,
                });
            }
        }
        Ok(addresses)
    }

    fn validate(
        &self,
        address: &ChannelAddress,
        filter: Option<&Filter>,
    ) -> Result<&ChannelSchema, ServerError> {
        let channel = self.schema.validate_address(address)?;
        if filter.is_some() && !channel.filter_type.accepts_filter() {
            return Err(ServerError::FilterNotPermitted { address: *address });
        }
        Ok(channel)
    }

    // Subscription graph

    /// Subscribe the session to `address`. An existing entry gains the
    /// explicit flag and moves to `filter`, which fails for channels whose
    /// filter is fixed.
    pub fn subscribe(
        &self,
        state: &mut SessionState,
        address: ChannelAddress,
        filter: Option<Filter>,
        explicit: bool,
        change_set: &mut ChangeSetMessage,
    ) -> Result<(), ServerError> {
        self.validate(&address, filter.as_ref())?;
        if let Some(entry) = state.subscription_entry_mut(&address) {
            if explicit {
                entry.set_explicit(true);
            }
            if entry.filter() == filter.as_ref() {
                return Ok(());
            }
            return self.update_subscription(state, address, filter, change_set);
        }

        let payload = self
            .data_source
            .collect_data_for_subscribe(&address, filter.as_ref())?;
        state.create_subscription_entry(address, filter.clone(), explicit)?;
        change_set
            .channel_actions
            .push(ChannelActionMessage::new(&address, ChannelActionType::Add, filter));
        change_set.changes.extend(payload.changes);
        self.expand_links(state, payload.links, change_set)
    }

    /// Subscribe to a cacheable channel. A client already holding the current
    /// generation is told to use its copy; anyone else gets the cached payload
    /// tagged with the generation as its new etag.
    fn subscribe_cached(
        &self,
        state: &mut SessionState,
        address: ChannelAddress,
        change_set: &mut ChangeSetMessage,
        out_of_band: &mut Vec<ServerMessage>,
    ) -> Result<(), ServerError> {
        let cache_key = self.data_source.cache_key(&address)?;
        let cached = self.cache.ensure(&address, &cache_key, || {
            let payload = self.data_source.collect_data_for_subscribe(&address, None)?;
            Ok(CachedChannel {
                cache_key: cache_key.clone(),
                change_set: ChangeSetMessage {
                    channel_actions: vec![ChannelActionMessage::new(
                        &address,
                        ChannelActionType::Add,
                        None,
                    )],
                    changes: payload.changes,
                    ..Default::default()
                },
                links: payload.links,
            })
        })?;
        state.create_subscription_entry(address, None, true)?;

        if state.etag(&address) == Some(cached.cache_key.as_str()) {
            debug!("Session holds current {:?}", address);
            out_of_band.push(ServerMessage::UseCache {
                channel: address.descriptor(),
                etag: cached.cache_key.clone(),
            });
        } else {
            change_set.etag = Some(cached.cache_key.clone());
            change_set
                .channel_actions
                .extend(cached.change_set.channel_actions.iter().cloned());
            change_set
                .changes
                .extend(cached.change_set.changes.iter().cloned());
            state.set_etag(address, cached.cache_key.clone());
        }
        self.expand_links(state, cached.links.clone(), change_set)
    }

    pub fn bulk_subscribe(
        &self,
        state: &mut SessionState,
        addresses: &[ChannelAddress],
        filter: Option<Filter>,
        change_set: &mut ChangeSetMessage,
    ) -> Result<(), ServerError> {
        for address in addresses {
            self.subscribe(state, *address, filter.clone(), true, change_set)?;
        }
        Ok(())
    }

    /// Move an existing subscription to `filter`, sending the content that
    /// differs between the two
    pub fn update_subscription(
        &self,
        state: &mut SessionState,
        address: ChannelAddress,
        filter: Option<Filter>,
        change_set: &mut ChangeSetMessage,
    ) -> Result<(), ServerError> {
        let channel = self.validate(&address, filter.as_ref())?;
        let entry = state
            .subscription_entry_mut(&address)
            .ok_or(ServerError::MissingSubscription { address })?;
        if !channel.filter_type.allows_update() {
            return Err(ServerError::StaticFilterChange { address });
        }
        let original_filter = entry.filter().cloned();
        let payload = self.data_source.collect_data_for_subscription_update(
            &address,
            original_filter.as_ref(),
            filter.as_ref(),
        )?;
        entry.set_filter(filter.clone());
        change_set
            .channel_actions
            .push(ChannelActionMessage::new(&address, ChannelActionType::Update, filter));
        change_set.changes.extend(payload.changes);
        self.expand_links(state, payload.links, change_set)
    }

    /// Follow links until none are new: a missing target is subscribed
    /// implicitly and linked, an existing target is linked if it was not yet
    fn expand_links(
        &self,
        state: &mut SessionState,
        links: Vec<ChannelLink>,
        change_set: &mut ChangeSetMessage,
    ) -> Result<(), ServerError> {
        let mut pending: VecDeque<ChannelLink> = links.into();
        while let Some(link) = pending.pop_front() {
            if link.source == link.target || !state.is_subscribed(&link.source) {
                continue;
            }
            if state.is_subscribed(&link.target) {
                let linked = state
                    .subscription_entry(&link.source)
                    .map(|entry| entry.is_linked_to(&link.target))
                    .unwrap_or(false);
                if !linked {
                    state.link_subscription_entries(&link.source, &link.target)?;
                }
                continue;
            }

            self.validate(&link.target, link.target_filter.as_ref())?;
            let payload = self
                .data_source
                .collect_data_for_subscribe(&link.target, link.target_filter.as_ref())?;
            debug!("Following link {:?} -> {:?}", link.source, link.target);
            state.create_subscription_entry(link.target, link.target_filter.clone(), false)?;
            state.link_subscription_entries(&link.source, &link.target)?;
            change_set.channel_actions.push(ChannelActionMessage::new(
                &link.target,
                ChannelActionType::Add,
                link.target_filter,
            ));
            change_set.changes.extend(payload.changes);
            pending.extend(payload.links);
        }
        Ok(())
    }

    /// Unsubscribe from `address`, cascading into entries it alone implied.
    /// Unsubscribing from a channel the session does not hold is a no-op.
    pub fn unsubscribe(
        &self,
        state: &mut SessionState,
        address: &ChannelAddress,
        explicitly_requested: bool,
        change_set: &mut ChangeSetMessage,
    ) -> Result<bool, ServerError> {
        self.schema.validate_address(address)?;
        if !state.is_subscribed(address) {
            debug!("Ignoring unsubscribe from {:?}, not subscribed", address);
            return Ok(false);
        }
        state.unsubscribe(address, explicitly_requested, change_set)
    }

    pub fn bulk_unsubscribe(
        &self,
        state: &mut SessionState,
        addresses: &[ChannelAddress],
        change_set: &mut ChangeSetMessage,
    ) -> Result<(), ServerError> {
        for address in addresses {
            self.unsubscribe(state, address, true, change_set)?;
        }
        Ok(())
    }

    /// The channel instance no longer exists: remove it from every session
    /// that holds it and drop its cached content. Returns the number of
    /// sessions notified.
    pub fn delete_channel(&self, address: &ChannelAddress) -> Result<usize, ServerError> {
        self.schema.validate_address(address)?;
        self.cache.invalidate(address);
        let mut notified = 0;
        for session in self.sessions_snapshot() {
            let mut state = session.lock();
            let mut change_set = ChangeSetMessage::default();
            if state.delete(address, &mut change_set) {
                self.send_change_set(&session, &mut state, change_set)?;
                notified += 1;
            }
        }
        Ok(notified)
    }

    /// Route entity changes to every session subscribed to at least one of
    /// their channels. Each session only sees the channels it holds. Returns
    /// the number of sessions notified.
    pub fn publish(&self, changes: &[EntityChangeMessage]) -> Result<usize, ServerError> {
        let routed = changes
            .iter()
            .map(|change| {
                change
                    .channel_addresses(self.schema.id)
                    .map(|addresses| (change, addresses))
            })
            .collect::<Result<Vec<_>, _>>()?;

        let mut notified = 0;
        for session in self.sessions_snapshot() {
            let mut state = session.lock();
            let mut change_set = ChangeSetMessage::default();
            for (change, addresses) in &routed {
                let channels: Vec<String> = addresses
                    .iter()
                    .filter(|address| state.is_subscribed(address))
                    .map(ChannelAddress::descriptor)
                    .collect();
                if !channels.is_empty() {
                    change_set.changes.push(EntityChangeMessage {
                        channels,
                        ..(*change).clone()
                    });
                }
            }
            if !change_set.is_empty() {
                self.send_change_set(&session, &mut state, change_set)?;
                notified += 1;
            }
        }
        Ok(notified)
    }

    // Outbound

    fn send_change_set(
        &self,
        session: &ReplicantSession,
        state: &mut SessionState,
        mut change_set: ChangeSetMessage,
    ) -> Result<(), ServerError> {
        change_set.last_id = state.last_sequence() + 1;
        let text = ServerMessage::ChangeSet(change_set).encode()?;
        state.next_sequence();
        self.broker.queue(session.id(), text);
        Ok(())
    }

    fn send_out_of_band(
        &self,
        session: &ReplicantSession,
        message: &ServerMessage,
    ) -> Result<(), ServerError> {
        let text = message.encode()?;
        self.broker.queue(session.id(), text);
        Ok(())
    }
}
