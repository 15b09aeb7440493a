pub mod packet_exchange;
pub mod test_schema;

pub use assertions::{entity_key, is_explicitly_subscribed, status, subscription_requests};
pub use packet_exchange::{test_session_manager, TestHarness, TICK_MILLIS};
pub use test_data_source::{event, payload, payload_with_links, person, TestDataSource};
pub use test_schema::{
    entity_registry, instance_address, test_schema, type_address, DYNAMIC_SEARCH, EVENT_TYPE,
    METADATA, PEOPLE, PERSON, PERSON_EVENTS, PERSON_TYPE, STATIC_SEARCH, SYSTEM_ID,
};
