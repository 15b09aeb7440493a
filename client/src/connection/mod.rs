mod area_of_interest_request;
mod connection;
mod message_response;
mod request_entry;

pub use area_of_interest_request::{AreaOfInterestAction, AreaOfInterestRequest};
pub use connection::Connection;
pub use message_response::MessageResponse;
pub use request_entry::{RequestCompletion, RequestEntry};
