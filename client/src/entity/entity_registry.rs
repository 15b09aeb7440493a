use std::collections::BTreeMap;

use replicant_shared::{EntityTypeId, SystemId};
use serde_json::Value;

use crate::{
    entity::{Entity, EntityKey, EntityRepository},
    ClientError,
};

/// Resolves the relationship references of an entity once every create and
/// update of the batch it arrived in is visible
pub trait EntityLinker {
    fn link(
        &self,
        entity: &Entity,
        entities: &EntityRepository,
    ) -> Result<BTreeMap<String, EntityKey>, ClientError>;
}

/// Links data fields that hold the id of another entity type. A missing or
/// null field is an absent reference; an id with no matching entity fails the
/// batch.
#[derive(Debug, Clone, Default)]
pub struct ReferenceLinker {
    fields: Vec<(String, EntityTypeId)>,
}

impl ReferenceLinker {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_reference(mut self, field: &str, target_type: EntityTypeId) -> Self {
        self.fields.push((field.to_string(), target_type));
        self
    }
}

impl EntityLinker for ReferenceLinker {
    fn link(
        &self,
        entity: &Entity,
        entities: &EntityRepository,
    ) -> Result<BTreeMap<String, EntityKey>, ClientError> {
        let key = entity.key();
        let mut references = BTreeMap::new();
        for (field, target_type) in &self.fields {
            let id = match entity.data().get(field) {
                None | Some(Value::Null) => continue,
                Some(value) => value
                    .as_i64()
                    .and_then(|id| i32::try_from(id).ok())
                    .ok_or_else(|| ClientError::MalformedReference {
                        entity: *key,
                        field: field.clone(),
                    })?,
            };
            let target = EntityKey::new(key.system_id, *target_type, id);
            if !entities.contains(&target) {
                return Err(ClientError::UnresolvedReference {
                    entity: *key,
                    field: field.clone(),
                    target,
                });
            }
            references.insert(field.clone(), target);
        }
        Ok(references)
    }
}

/// Table of linkers keyed by entity type, built once at startup
#[derive(Default)]
pub struct EntityRegistry {
    linkers: BTreeMap<(SystemId, EntityTypeId), Box<dyn EntityLinker>>,
}

impl EntityRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn register<L: EntityLinker + 'static>(
        &mut self,
        system_id: SystemId,
        type_id: EntityTypeId,
        linker: L,
    ) {
        self.linkers.insert((system_id, type_id), Box::new(linker));
    }

    pub fn linker(&self, system_id: SystemId, type_id: EntityTypeId) -> Option<&dyn EntityLinker> {
        self.linkers
            .get(&(system_id, type_id))
            .map(|linker| linker.as_ref())
    }
}
