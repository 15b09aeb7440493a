use std::collections::{BTreeMap, VecDeque};

use log::warn;

use replicant_shared::{ChannelAddress, Filter, RequestId, Sequence};

use crate::connection::{
    AreaOfInterestAction, AreaOfInterestRequest, MessageResponse, RequestCompletion,
    RequestEntry,
};

/// Transport session state of one connector: in-flight requests, queued area
/// of interest requests and the three inbound message queues. Dropped and
/// rebuilt on every reconnect, so responses addressed to an old session are
/// never applied.
pub struct Connection {
    requests: BTreeMap<RequestId, RequestEntry>,
    last_request_id: RequestId,
    pending_area_of_interest_requests: Vec<AreaOfInterestRequest>,
    unparsed_responses: VecDeque<String>,
    /// Ordered by ascending sequence
    parsed_responses: Vec<MessageResponse>,
    out_of_band_responses: VecDeque<MessageResponse>,
    current_message_response: Option<MessageResponse>,
    last_rx_sequence: Sequence,
}

impl Connection {
    pub fn new() -> Self {
        Self {
            requests: BTreeMap::new(),
            last_request_id: 0,
            pending_area_of_interest_requests: Vec::new(),
            unparsed_responses: VecDeque::new(),
            parsed_responses: Vec::new(),
            out_of_band_responses: VecDeque::new(),
            current_message_response: None,
            last_rx_sequence: 0,
        }
    }

    // Requests

    pub fn new_request(
        &mut self,
        name: &str,
        cache_key: Option<ChannelAddress>,
        completion: RequestCompletion,
    ) -> RequestId {
        self.last_request_id += 1;
        let request_id = self.last_request_id;
        self.requests.insert(
            request_id,
            RequestEntry::new(request_id, name, cache_key, completion),
        );
        request_id
    }

    pub fn request(&self, request_id: RequestId) -> Option<&RequestEntry> {
        self.requests.get(&request_id)
    }

    pub(crate) fn request_mut(&mut self, request_id: RequestId) -> Option<&mut RequestEntry> {
        self.requests.get_mut(&request_id)
    }

    pub(crate) fn remove_request(&mut self, request_id: RequestId) -> Option<RequestEntry> {
        self.requests.remove(&request_id)
    }

    pub fn requests(&self) -> impl Iterator<Item = &RequestEntry> {
        self.requests.values()
    }

    // Area of interest requests

    pub fn request_subscribe(&mut self, address: ChannelAddress, filter: Option<Filter>) {
        self.enqueue_area_of_interest_request(address, AreaOfInterestAction::Add, filter);
    }

    pub fn request_subscription_update(&mut self, address: ChannelAddress, filter: Option<Filter>) {
        self.enqueue_area_of_interest_request(address, AreaOfInterestAction::Update, filter);
    }

    pub fn request_unsubscribe(&mut self, address: ChannelAddress) {
        self.enqueue_area_of_interest_request(address, AreaOfInterestAction::Remove, None);
    }

    fn enqueue_area_of_interest_request(
        &mut self,
        address: ChannelAddress,
        action: AreaOfInterestAction,
        filter: Option<Filter>,
    ) {
        self.pending_area_of_interest_requests
            .push(AreaOfInterestRequest::new(address, action, filter));
    }

    pub fn pending_area_of_interest_requests(&self) -> &[AreaOfInterestRequest] {
        &self.pending_area_of_interest_requests
    }

    /// Index of the last queued or in-flight request matching the action,
    /// address and (except for removes) filter
    pub fn last_index_of_pending_area_of_interest_request(
        &self,
        action: AreaOfInterestAction,
        address: &ChannelAddress,
        filter: Option<&Filter>,
    ) -> Option<usize> {
        self.pending_area_of_interest_requests
            .iter()
            .rposition(|request| request.matches(action, address, filter))
    }

    pub fn has_dispatched_request(&self, action: AreaOfInterestAction, address: &ChannelAddress) -> bool {
        self.pending_area_of_interest_requests.iter().any(|request| {
            request.is_in_progress() && request.action() == action && request.address() == address
        })
    }

    pub fn has_area_of_interest_request_in_progress(&self) -> bool {
        self.pending_area_of_interest_requests
            .iter()
            .any(AreaOfInterestRequest::is_in_progress)
    }

    /// The leading run of queued requests that can share one round trip
    pub(crate) fn peek_next_area_of_interest_group(&self) -> Vec<AreaOfInterestRequest> {
        let mut group: Vec<AreaOfInterestRequest> = Vec::new();
        for request in self
            .pending_area_of_interest_requests
            .iter()
            .filter(|request| !request.is_in_progress())
        {
            if let Some(head) = group.first() {
                if !head.can_group_with(request) {
                    break;
                }
            }
            group.push(request.clone());
        }
        group
    }

    /// Mark the group `peek_next_area_of_interest_group` would return as
    /// dispatched under `request_id`, returning copies of it
    pub(crate) fn start_next_area_of_interest_group(
        &mut self,
        request_id: RequestId,
    ) -> Vec<AreaOfInterestRequest> {
        let size = self.peek_next_area_of_interest_group().len();
        let mut group = Vec::with_capacity(size);
        for request in self
            .pending_area_of_interest_requests
            .iter_mut()
            .filter(|request| !request.is_in_progress())
            .take(size)
        {
            request.mark_in_progress(request_id);
            group.push(request.clone());
        }
        group
    }

    pub(crate) fn has_queued_area_of_interest_requests(&self) -> bool {
        self.pending_area_of_interest_requests
            .iter()
            .any(|request| !request.is_in_progress())
    }

    pub(crate) fn remove_area_of_interest_requests(&mut self, request_id: RequestId) {
        self.pending_area_of_interest_requests
            .retain(|request| request.request_id() != Some(request_id));
    }

    // Inbound messages

    pub fn enqueue_response(&mut self, raw: String) {
        self.unparsed_responses.push_back(raw);
    }

    pub(crate) fn pop_unparsed_response(&mut self) -> Option<String> {
        self.unparsed_responses.pop_front()
    }

    pub(crate) fn enqueue_parsed_response(&mut self, response: MessageResponse) {
        let position = self
            .parsed_responses
            .partition_point(|existing| existing.sequence() <= response.sequence());
        self.parsed_responses.insert(position, response);
    }

    pub(crate) fn enqueue_out_of_band_response(&mut self, response: MessageResponse) {
        self.out_of_band_responses.push_back(response);
    }

    /// Out-of-band responses first, then the next sequenced response if it is
    /// the one following the last applied sequence. A gap waits for the
    /// missing response.
    pub(crate) fn select_next_message_response(&mut self) -> Option<MessageResponse> {
        if let Some(response) = self.out_of_band_responses.pop_front() {
            return Some(response);
        }
        while let Some(head) = self.parsed_responses.first() {
            let sequence = head.sequence();
            if sequence <= self.last_rx_sequence {
                warn!(
                    "Dropping change set {} already superseded by {}",
                    sequence, self.last_rx_sequence
                );
                self.parsed_responses.remove(0);
                continue;
            }
            if sequence == self.last_rx_sequence + 1 {
                return Some(self.parsed_responses.remove(0));
            }
            return None;
        }
        None
    }

    pub(crate) fn current_message_response(&mut self) -> Option<&mut MessageResponse> {
        self.current_message_response.as_mut()
    }

    pub(crate) fn set_current_message_response(&mut self, response: Option<MessageResponse>) {
        self.current_message_response = response;
    }

    pub(crate) fn take_current_message_response(&mut self) -> Option<MessageResponse> {
        self.current_message_response.take()
    }

    pub fn last_rx_sequence(&self) -> Sequence {
        self.last_rx_sequence
    }

    pub(crate) fn set_last_rx_sequence(&mut self, sequence: Sequence) {
        self.last_rx_sequence = sequence;
    }

    /// True while anything inbound is waiting to be parsed or applied
    pub fn has_pending_messages(&self) -> bool {
        !self.unparsed_responses.is_empty()
            || !self.out_of_band_responses.is_empty()
            || self.current_message_response.is_some()
            || self
                .parsed_responses
                .first()
                .map(|head| head.sequence() <= self.last_rx_sequence + 1)
                .unwrap_or(false)
    }
}

impl Default for Connection {
    fn default() -> Self {
        Self::new()
    }
}
