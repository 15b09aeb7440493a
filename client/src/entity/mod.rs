mod entity;
mod entity_registry;
mod entity_repository;

pub use entity::{Entity, EntityKey};
pub use entity_registry::{EntityLinker, EntityRegistry, ReferenceLinker};
pub use entity_repository::EntityRepository;
