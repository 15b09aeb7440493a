use replicant_shared::{ChannelAddress, RequestId};

use crate::connection::AreaOfInterestRequest;

/// What to do once the response to a request has been fully applied
#[derive(Debug, Clone, PartialEq)]
pub enum RequestCompletion {
    AreaOfInterest(Vec<AreaOfInterestRequest>),
    Sync,
    AuthToken,
    Etags,
}

#[derive(Debug, Clone, PartialEq)]
pub struct RequestEntry {
    request_id: RequestId,
    name: String,
    /// Channel whose payload should be cached when the response carries an etag
    cache_key: Option<ChannelAddress>,
    normal_completion: Option<bool>,
    expecting_results: bool,
    results_arrived: bool,
    completion: Option<RequestCompletion>,
}

impl RequestEntry {
    pub(crate) fn new(
        request_id: RequestId,
        name: &str,
        cache_key: Option<ChannelAddress>,
        completion: RequestCompletion,
    ) -> Self {
        Self {
            request_id,
            name: name.to_string(),
            cache_key,
            normal_completion: None,
            expecting_results: true,
            results_arrived: false,
            completion: Some(completion),
        }
    }

    pub fn request_id(&self) -> RequestId {
        self.request_id
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn cache_key(&self) -> Option<&ChannelAddress> {
        self.cache_key.as_ref()
    }

    pub fn normal_completion(&self) -> Option<bool> {
        self.normal_completion
    }

    pub fn is_expecting_results(&self) -> bool {
        self.expecting_results
    }

    pub fn have_results_arrived(&self) -> bool {
        self.results_arrived
    }

    pub fn completion(&self) -> Option<&RequestCompletion> {
        self.completion.as_ref()
    }

    pub(crate) fn mark_results_arrived(&mut self) {
        self.results_arrived = true;
    }

    pub(crate) fn take_completion(&mut self, normal: bool) -> Option<RequestCompletion> {
        self.normal_completion = Some(normal);
        self.expecting_results = false;
        self.completion.take()
    }
}
