pub mod error;
pub mod schema_registry;
pub mod system_schema;
