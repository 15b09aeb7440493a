use thiserror::Error;

/// Errors that can occur while parsing a channel descriptor of the form
/// `<channelId>[.<instanceId>]`
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum AddressParseError {
    /// Descriptor was empty
    #[error("Channel descriptor is empty")]
    Empty,

    /// Channel id component is not a valid integer
    #[error("Invalid channel id in descriptor '{descriptor}'")]
    InvalidChannelId { descriptor: String },

    /// Instance id component is not a valid integer
    #[error("Invalid instance id in descriptor '{descriptor}'")]
    InvalidInstanceId { descriptor: String },
}
