use std::collections::{btree_map::Entry, BTreeMap};

use replicant_shared::EntityData;

use crate::entity::{Entity, EntityKey};

/// Owned storage of every replicated entity, keyed by identity
#[derive(Debug, Default)]
pub struct EntityRepository {
    entities: BTreeMap<EntityKey, Entity>,
}

impl EntityRepository {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn get(&self, key: &EntityKey) -> Option<&Entity> {
        self.entities.get(key)
    }

    pub fn contains(&self, key: &EntityKey) -> bool {
        self.entities.contains_key(key)
    }

    pub fn len(&self) -> usize {
        self.entities.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entities.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = &Entity> {
        self.entities.values()
    }

    pub(crate) fn get_mut(&mut self, key: &EntityKey) -> Option<&mut Entity> {
        self.entities.get_mut(key)
    }

    /// Create the entity or replace the data of the existing one
    pub(crate) fn upsert(&mut self, key: EntityKey, data: EntityData) -> &mut Entity {
        match self.entities.entry(key) {
            Entry::Occupied(occupied) => {
                let entity = occupied.into_mut();
                entity.set_data(data);
                entity
            }
            Entry::Vacant(vacant) => vacant.insert(Entity::new(key, data)),
        }
    }

    pub(crate) fn dispose(&mut self, key: &EntityKey) -> Option<Entity> {
        self.entities.remove(key)
    }
}
