use std::collections::BTreeMap;

use crate::{ChannelAddress, ChannelSchema, SchemaError, SystemId, SystemSchema};

/// Static table of every system known to a process, looked up by numeric id
#[derive(Debug, Clone, Default)]
pub struct SchemaRegistry {
    systems: BTreeMap<SystemId, SystemSchema>,
}

impl SchemaRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn register(&mut self, schema: SystemSchema) -> Result<(), SchemaError> {
        if self.systems.contains_key(&schema.id) {
            return Err(SchemaError::DuplicateSystem {
                system_id: schema.id,
            });
        }
        self.systems.insert(schema.id, schema);
        Ok(())
    }

    pub fn system(&self, system_id: SystemId) -> Result<&SystemSchema, SchemaError> {
        self.systems
            .get(&system_id)
            .ok_or(SchemaError::UnknownSystem { system_id })
    }

    pub fn channel(&self, address: &ChannelAddress) -> Result<&ChannelSchema, SchemaError> {
        self.system(address.system_id())?.validate_address(address)
    }

    pub fn system_ids(&self) -> impl Iterator<Item = &SystemId> {
        self.systems.keys()
    }
}

impl FromIterator<SystemSchema> for SchemaRegistry {
    fn from_iter<I: IntoIterator<Item = SystemSchema>>(iter: I) -> Self {
        let mut registry = Self::new();
        for schema in iter {
            registry.systems.insert(schema.id, schema);
        }
        registry
    }
}
