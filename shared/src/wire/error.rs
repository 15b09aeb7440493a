use thiserror::Error;

/// Errors that can occur encoding or decoding wire messages
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum WireError {
    /// Message could not be serialized
    #[error("Failed to encode {kind} message: {reason}")]
    EncodeFailed { kind: &'static str, reason: String },

    /// Payload is not a well-formed message (SECURITY: potentially malicious payload)
    #[error("Failed to decode {kind} message: {reason}")]
    DecodeFailed { kind: &'static str, reason: String },
}
