use std::cell::RefCell;
use std::mem;
use std::rc::Rc;
use std::sync::Arc;

use log::warn;

use replicant_client::{ClientConfig, ReplicantClient, SpyEvent};
use replicant_server::{DataSource, ReplicantSession, ReplicantSessionManager, ServerConfig};
use replicant_shared::{ClientMessage, RateLimitConfig, ServerMessage};

use crate::local_socket::{LinkState, LocalPacketSender, LocalTransport};

use super::test_data_source::TestDataSource;
use super::test_schema::{entity_registry, test_schema, SYSTEM_ID};

/// Rounds `pump` runs before deciding the exchange will never settle
const MAX_ROUNDS: usize = 1_000;
/// Simulated time between client ticks
pub const TICK_MILLIS: u64 = 10;

/// A session manager for the test schema over `data_source`. Its frames
/// collect in the returned sender.
pub fn test_session_manager(
    config: ServerConfig,
    data_source: Arc<TestDataSource>,
) -> (ReplicantSessionManager, LocalPacketSender) {
    let source: Arc<dyn DataSource> = data_source;
    let packets = LocalPacketSender::new();
    let server = ReplicantSessionManager::new(config, test_schema(), source, Box::new(packets.clone()));
    (server, packets)
}

/// One client with one required connector wired to one session manager
/// through an in-memory link. Everything is driven from the test thread.
pub struct TestHarness {
    pub client: ReplicantClient,
    pub server: Arc<ReplicantSessionManager>,
    pub data_source: Arc<TestDataSource>,
    pub link: Rc<RefCell<LinkState>>,
    packets: LocalPacketSender,
    session_id: Option<String>,
    now_millis: u64,
    events: Rc<RefCell<Vec<SpyEvent>>>,
    /// Every server frame delivered to the client, in delivery order
    pub received: Vec<String>,
}

impl TestHarness {
    pub fn new() -> Self {
        Self::with_server_config(ServerConfig::default())
    }

    pub fn with_server_config(server_config: ServerConfig) -> Self {
        let data_source = Arc::new(TestDataSource::new());
        let (server, packets) = test_session_manager(server_config, data_source.clone());
        let server = Arc::new(server);

        // Reconnects must not stall the exchange on the rate limiter
        let config = ClientConfig {
            required_rate_limit: RateLimitConfig::new(1_000.0, 1.0, 1.0),
            optional_rate_limit: RateLimitConfig::new(1_000.0, 1.0, 1.0),
            ..Default::default()
        };
        let mut client = ReplicantClient::new(config, entity_registry());
        let transport = LocalTransport::new();
        let link = transport.state();
        client
            .add_connector(test_schema(), Box::new(transport), true, 0)
            .unwrap();

        let events = Rc::new(RefCell::new(Vec::new()));
        let recorded = events.clone();
        client
            .spy()
            .add_listener(move |event| recorded.borrow_mut().push(event.clone()));

        Self {
            client,
            server,
            data_source,
            link,
            packets,
            session_id: None,
            now_millis: 0,
            events,
            received: Vec::new(),
        }
    }

    /// Activate the client and exchange until its connector is connected
    pub fn connect(&mut self) {
        self.client.activate();
        self.pump();
        assert!(self.client.is_connected(), "client failed to connect");
        assert!(self.session_id.is_some());
    }

    pub fn now_millis(&self) -> u64 {
        self.now_millis
    }

    pub fn session_id(&self) -> Option<&str> {
        self.session_id.as_deref()
    }

    pub fn session(&self) -> Arc<ReplicantSession> {
        let session_id = self.session_id.as_deref().expect("no session");
        self.server.session(session_id).unwrap()
    }

    /// Exchange frames and tick the client until nothing moves
    pub fn pump(&mut self) {
        for _ in 0..MAX_ROUNDS {
            if !self.step() {
                return;
            }
        }
        panic!("exchange did not settle within {} rounds", MAX_ROUNDS);
    }

    /// One round: complete transport transitions, hand client frames to the
    /// server, deliver server frames to the client, then tick. Returns true
    /// if anything moved.
    pub fn step(&mut self) -> bool {
        let mut progressed = false;

        let (connect, disconnect) = {
            let mut link = self.link.borrow_mut();
            (
                mem::take(&mut link.pending_connect),
                mem::take(&mut link.pending_disconnect),
            )
        };
        if disconnect {
            self.close_session();
            self.client.on_disconnected(SYSTEM_ID).unwrap();
            progressed = true;
        }
        if connect {
            let session = self.server.create_session().unwrap();
            self.session_id = Some(session.id().to_string());
            if let Err(error) = self.client.on_connected(SYSTEM_ID) {
                warn!("Client rejected connect: {}", error);
            }
            progressed = true;
        }

        let outbound: Vec<String> = self.link.borrow_mut().outbound.drain(..).collect();
        progressed |= !outbound.is_empty();
        if let Some(session_id) = self.session_id.clone() {
            for text in outbound {
                self.server
                    .handle_message(&session_id, &text)
                    .expect("server failed to handle client frame");
            }
        }

        self.server.flush().unwrap();
        if let Some(session_id) = self.session_id.clone() {
            for text in self.packets.take(&session_id) {
                progressed = true;
                self.deliver_raw(text);
            }
        }

        self.now_millis += TICK_MILLIS;
        progressed |= self.client.tick(self.now_millis);

        let link = self.link.borrow();
        progressed || !link.outbound.is_empty() || link.pending_connect || link.pending_disconnect
    }

    /// Hand a raw frame to the client as if the server had sent it
    pub fn deliver_raw(&mut self, text: String) {
        self.received.push(text.clone());
        self.client.on_message_received(SYSTEM_ID, text).unwrap();
    }

    pub fn deliver(&mut self, message: &ServerMessage) {
        self.deliver_raw(message.encode().unwrap());
    }

    /// The server drops the session and the client observes the socket close
    pub fn drop_connection(&mut self) {
        self.close_session();
        self.client.on_disconnected(SYSTEM_ID).unwrap();
    }

    fn close_session(&mut self) {
        if let Some(session_id) = self.session_id.take() {
            self.server.invalidate_session(&session_id);
            self.packets.take(&session_id);
        }
    }

    /// Client frames sent since the last call
    pub fn take_sent(&mut self) -> Vec<ClientMessage> {
        mem::take(&mut self.link.borrow_mut().sent)
            .iter()
            .map(|text| ClientMessage::decode(text).unwrap())
            .collect()
    }

    /// Server frames delivered since the last call
    pub fn take_received(&mut self) -> Vec<ServerMessage> {
        mem::take(&mut self.received)
            .iter()
            .map(|text| ServerMessage::decode(text).unwrap())
            .collect()
    }

    /// Spy events reported since the last call
    pub fn take_events(&mut self) -> Vec<SpyEvent> {
        mem::take(&mut *self.events.borrow_mut())
    }
}

impl Default for TestHarness {
    fn default() -> Self {
        Self::new()
    }
}
