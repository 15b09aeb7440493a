use std::collections::BTreeMap;

use log::{debug, trace};

use replicant_shared::{ChannelAddress, Filter, SystemId};

use crate::{
    area_of_interest::AreaOfInterestStatus,
    client_state::ClientState,
    connection::AreaOfInterestAction,
    connector::{Connector, ConnectorEntry},
    spy::SpyEvent,
    ClientError,
};

/// Result of one convergence pass
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConvergeOutcome {
    /// Requests were queued; another pass is needed once they are dispatched
    Submitted(usize),
    /// Nothing could be queued while earlier requests are outstanding
    InProgress,
    /// Desired and actual state agree
    Complete,
}

/// First request of the group being built in the current pass. Later items
/// join the group only if they could share its network round trip.
#[derive(Debug, Clone)]
struct GroupTemplate {
    address: ChannelAddress,
    action: AreaOfInterestAction,
    filter: Option<Filter>,
}

impl GroupTemplate {
    fn accepts(
        &self,
        address: &ChannelAddress,
        action: AreaOfInterestAction,
        filter: Option<&Filter>,
    ) -> bool {
        self.action == action
            && self.address.same_channel(address)
            && (AreaOfInterestAction::Remove == action || self.filter.as_ref() == filter)
    }
}

enum ConvergeAction {
    Submitted(GroupTemplate),
    /// A request was queued that must travel alone; end the pass
    Terminate,
    InProgress,
    /// The area of interest changed status without needing a request
    Settled,
    NoAction,
}

/// Drives actual subscriptions toward the declared areas of interest
#[derive(Default)]
pub struct Converger {
    converge_complete: bool,
}

impl Converger {
    pub fn new() -> Self {
        Self::default()
    }

    /// Run one pass over every area of interest, queueing at most one group
    /// of compatible requests. Orphaned explicit subscriptions are removed
    /// once the pass has nothing else to submit.
    pub(crate) fn converge(
        &mut self,
        connectors: &mut BTreeMap<SystemId, ConnectorEntry>,
        state: &mut ClientState,
    ) -> Result<ConvergeOutcome, ClientError> {
        let mut template: Option<GroupTemplate> = None;
        let mut submitted = 0;
        let mut in_progress = false;
        let mut settled = false;

        for address in state.area_of_interest_addresses() {
            match Self::converge_area_of_interest(connectors, state, &address, template.as_ref())? {
                ConvergeAction::Submitted(request) => {
                    submitted += 1;
                    template.get_or_insert(request);
                }
                ConvergeAction::Terminate => {
                    submitted += 1;
                    break;
                }
                ConvergeAction::InProgress => {
                    in_progress = true;
                    if template.is_none() {
                        trace!("Converge halted behind in-progress {:?}", address);
                        break;
                    }
                }
                ConvergeAction::Settled => settled = true,
                ConvergeAction::NoAction => {}
            }
        }
        if settled {
            self.converge_complete = false;
        }

        if 0 == submitted {
            submitted = Self::remove_orphan_subscriptions(connectors, state)?;
        }
        if 0 < submitted {
            debug!("Converge submitted {} request(s)", submitted);
            self.converge_complete = false;
            state.request_converge();
            return Ok(ConvergeOutcome::Submitted(submitted));
        }

        let requests_outstanding = connectors
            .values()
            .any(|entry| entry.connector().has_pending_area_of_interest_requests());
        if in_progress || requests_outstanding {
            return Ok(ConvergeOutcome::InProgress);
        }

        if !self.converge_complete {
            self.converge_complete = true;
            debug!("Converge complete");
            state.spy().report(SpyEvent::ConvergeCompleted);
        }
        Ok(ConvergeOutcome::Complete)
    }

    fn converge_area_of_interest(
        connectors: &mut BTreeMap<SystemId, ConnectorEntry>,
        state: &mut ClientState,
        address: &ChannelAddress,
        template: Option<&GroupTemplate>,
    ) -> Result<ConvergeAction, ClientError> {
        let Some(area_of_interest) = state.area_of_interest(address) else {
            return Ok(ConvergeAction::NoAction);
        };
        let status = area_of_interest.status();
        let filter = area_of_interest.filter().cloned();
        if AreaOfInterestStatus::Deleted == status {
            return Ok(ConvergeAction::NoAction);
        }

        let Some(entry) = connectors.get_mut(&address.system_id()) else {
            return Ok(ConvergeAction::NoAction);
        };
        let connector = entry.connector_mut();
        if !connector.is_connected() {
            return Ok(ConvergeAction::NoAction);
        }

        let add_index = connector.last_index_of_pending_area_of_interest_request(
            AreaOfInterestAction::Add,
            address,
            filter.as_ref(),
        );
        let remove_index = connector.last_index_of_pending_area_of_interest_request(
            AreaOfInterestAction::Remove,
            address,
            None,
        );
        let update_index = connector.last_index_of_pending_area_of_interest_request(
            AreaOfInterestAction::Update,
            address,
            filter.as_ref(),
        );

        let Some(subscription) = state.subscription(address) else {
            if add_index.is_some() && add_index > remove_index {
                return Ok(ConvergeAction::InProgress);
            }
            if status.is_failed() {
                return Ok(ConvergeAction::NoAction);
            }
            return Self::submit(connector, template, address, AreaOfInterestAction::Add, filter);
        };

        if add_index.is_some() || remove_index.is_some() || update_index.is_some() {
            return Ok(ConvergeAction::InProgress);
        }

        let explicit = subscription.is_explicit();
        if subscription.filter() != filter.as_ref() {
            let channel = connector.schema().validate_address(address)?;
            if channel.filter_type.allows_update() {
                return Self::submit(connector, template, address, AreaOfInterestAction::Update, filter);
            }
            if explicit && template.is_none() {
                debug!("Filter of {:?} is fixed, resubscribing", address);
                connector.request_unsubscribe(*address)?;
                return Ok(ConvergeAction::Terminate);
            }
            return Ok(ConvergeAction::NoAction);
        }

        if AreaOfInterestStatus::NotAsked == status {
            if !explicit {
                return Self::submit(connector, template, address, AreaOfInterestAction::Add, filter);
            }
            state.update_area_of_interest(address, AreaOfInterestStatus::Loaded, None);
            return Ok(ConvergeAction::Settled);
        }
        Ok(ConvergeAction::NoAction)
    }

    fn submit(
        connector: &mut Connector,
        template: Option<&GroupTemplate>,
        address: &ChannelAddress,
        action: AreaOfInterestAction,
        filter: Option<Filter>,
    ) -> Result<ConvergeAction, ClientError> {
        if let Some(template) = template {
            if !template.accepts(address, action, filter.as_ref()) {
                return Ok(ConvergeAction::NoAction);
            }
        }
        match action {
            AreaOfInterestAction::Add => connector.request_subscribe(*address, filter.clone())?,
            AreaOfInterestAction::Update => {
                connector.request_subscription_update(*address, filter.clone())?
            }
            AreaOfInterestAction::Remove => connector.request_unsubscribe(*address)?,
        }
        Ok(ConvergeAction::Submitted(GroupTemplate {
            address: *address,
            action,
            filter,
        }))
    }

    /// Queue a remove for every explicit subscription no area of interest asks
    /// for, unless one is already pending. Returns the number queued.
    fn remove_orphan_subscriptions(
        connectors: &mut BTreeMap<SystemId, ConnectorEntry>,
        state: &ClientState,
    ) -> Result<usize, ClientError> {
        let orphans: Vec<ChannelAddress> = state
            .subscriptions()
            .filter(|subscription| {
                subscription.is_explicit() && !state.has_area_of_interest(subscription.address())
            })
            .map(|subscription| *subscription.address())
            .collect();

        let mut removed = 0;
        for address in orphans {
            let Some(entry) = connectors.get_mut(&address.system_id()) else {
                continue;
            };
            let connector = entry.connector_mut();
            if !connector.is_connected()
                || connector
                    .last_index_of_pending_area_of_interest_request(
                        AreaOfInterestAction::Remove,
                        &address,
                        None,
                    )
                    .is_some()
            {
                continue;
            }
            debug!("Removing orphan subscription {:?}", address);
            connector.request_unsubscribe(address)?;
            removed += 1;
        }
        Ok(removed)
    }
}
