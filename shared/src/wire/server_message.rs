use serde::{Deserialize, Serialize};

use crate::{ChangeSetMessage, RequestId, WireError};

/// Messages pushed from the server to a client session
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case", rename_all_fields = "camelCase")]
pub enum ServerMessage {
    /// First message on a new session
    SessionCreated { session_id: String },
    ChangeSet(ChangeSetMessage),
    /// The client's cached copy of `channel` is still current; no payload follows
    UseCache { channel: String, etag: String },
    /// A request was rejected
    Error {
        #[serde(default, skip_serializing_if = "Option::is_none")]
        request_id: Option<RequestId>,
        message: String,
    },
}

impl ServerMessage {
    /// Out-of-band messages carry no sequence number and are applied ahead of
    /// sequenced change sets
    pub fn is_out_of_band(&self) -> bool {
        !matches!(self, ServerMessage::ChangeSet(_))
    }

    pub fn encode(&self) -> Result<String, WireError> {
        serde_json::to_string(self).map_err(|error| WireError::EncodeFailed {
            kind: "server",
            reason: error.to_string(),
        })
    }

    pub fn decode(text: &str) -> Result<Self, WireError> {
        serde_json::from_str(text).map_err(|error| WireError::DecodeFailed {
            kind: "server",
            reason: error.to_string(),
        })
    }
}
