use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

use crate::{Filter, RequestId, WireError};

/// Messages sent from a client connector to the server
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case", rename_all_fields = "camelCase")]
pub enum ClientMessage {
    Subscribe {
        request_id: RequestId,
        channel: String,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        filter: Option<Filter>,
    },
    Unsubscribe {
        request_id: RequestId,
        channel: String,
    },
    BulkSubscribe {
        request_id: RequestId,
        channels: Vec<String>,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        filter: Option<Filter>,
    },
    BulkUnsubscribe {
        request_id: RequestId,
        channels: Vec<String>,
    },
    /// Sync point: the server answers once every earlier request has been handled
    Ping {
        request_id: RequestId,
    },
    AuthToken {
        request_id: RequestId,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        token: Option<String>,
    },
    Etags {
        request_id: RequestId,
        channel_to_etag: BTreeMap<String, String>,
    },
}

impl ClientMessage {
    pub fn request_id(&self) -> RequestId {
        match self {
            ClientMessage::Subscribe { request_id, .. }
            | ClientMessage::Unsubscribe { request_id, .. }
            | ClientMessage::BulkSubscribe { request_id, .. }
            | ClientMessage::BulkUnsubscribe { request_id, .. }
            | ClientMessage::Ping { request_id }
            | ClientMessage::AuthToken { request_id, .. }
            | ClientMessage::Etags { request_id, .. } => *request_id,
        }
    }

    pub fn encode(&self) -> Result<String, WireError> {
        serde_json::to_string(self).map_err(|error| WireError::EncodeFailed {
            kind: "client",
            reason: error.to_string(),
        })
    }

    pub fn decode(text: &str) -> Result<Self, WireError> {
        serde_json::from_str(text).map_err(|error| WireError::DecodeFailed {
            kind: "client",
            reason: error.to_string(),
        })
    }
}
