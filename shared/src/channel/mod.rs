pub mod channel_address;
pub mod error;
pub mod filter;
