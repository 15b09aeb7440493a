pub mod change_set;
pub mod client_message;
pub mod error;
pub mod server_message;
