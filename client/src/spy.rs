//! Diagnostic event hooks. Delivery is best-effort: a panicking listener is
//! logged and skipped, and events raised while listeners are already being
//! notified are dropped.

use std::{
    cell::RefCell,
    panic::{self, AssertUnwindSafe},
    rc::Rc,
};

use log::{error, warn};

use replicant_shared::{ChannelAddress, RequestId, Sequence, SystemId};

use crate::{area_of_interest::AreaOfInterestStatus, connector::ConnectorState, entity::EntityKey};

#[derive(Debug, Clone, PartialEq)]
pub enum SpyEvent {
    ConnectorStateChanged {
        system_id: SystemId,
        from: ConnectorState,
        to: ConnectorState,
    },
    ConnectFailed {
        system_id: SystemId,
        error: String,
    },
    DisconnectFailed {
        system_id: SystemId,
        error: String,
    },
    SubscribeRequestQueued {
        address: ChannelAddress,
    },
    SubscriptionUpdateRequestQueued {
        address: ChannelAddress,
    },
    UnsubscribeRequestQueued {
        address: ChannelAddress,
    },
    RequestStarted {
        system_id: SystemId,
        request_id: RequestId,
        name: String,
    },
    RequestCompleted {
        system_id: SystemId,
        request_id: RequestId,
        name: String,
        normal: bool,
    },
    MessageProcessed {
        system_id: SystemId,
        sequence: Option<Sequence>,
        request_id: Option<RequestId>,
    },
    MessageProcessFailed {
        system_id: SystemId,
        error: String,
    },
    AreaOfInterestStatusUpdated {
        address: ChannelAddress,
        status: AreaOfInterestStatus,
    },
    SubscriptionCreated {
        address: ChannelAddress,
        explicit: bool,
    },
    SubscriptionUpdated {
        address: ChannelAddress,
    },
    SubscriptionDisposed {
        address: ChannelAddress,
    },
    EntityDisposed {
        entity: EntityKey,
    },
    SyncCompleted {
        system_id: SystemId,
    },
    ConvergeCompleted,
}

type Listener = Box<dyn FnMut(&SpyEvent)>;

/// Shared handle to the set of diagnostic listeners
#[derive(Clone, Default)]
pub struct Spy {
    listeners: Rc<RefCell<Vec<Listener>>>,
}

impl Spy {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn add_listener<F: FnMut(&SpyEvent) + 'static>(&self, listener: F) {
        self.listeners.borrow_mut().push(Box::new(listener));
    }

    pub fn clear_listeners(&self) {
        self.listeners.borrow_mut().clear();
    }

    pub fn will_propagate(&self) -> bool {
        !self.listeners.borrow().is_empty()
    }

    pub fn report(&self, event: SpyEvent) {
        let Ok(mut listeners) = self.listeners.try_borrow_mut() else {
            warn!("Dropping spy event {:?} raised during spy dispatch", event);
            return;
        };
        for listener in listeners.iter_mut() {
            let result = panic::catch_unwind(AssertUnwindSafe(|| listener(&event)));
            if result.is_err() {
                error!("Spy listener panicked while handling {:?}", event);
            }
        }
    }
}
