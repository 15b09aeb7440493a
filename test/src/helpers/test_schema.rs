use replicant_client::{EntityRegistry, ReferenceLinker};
use replicant_shared::{
    ChannelAddress, ChannelId, ChannelSchema, EntitySchema, EntityTypeId, FilterType, InstanceId,
    SystemId, SystemSchema,
};

pub const SYSTEM_ID: SystemId = 1;

/// Type channel listing every person
pub const PEOPLE: ChannelId = 2;
/// One person with their events; links to the event channel of that person
pub const PERSON: ChannelId = 3;
/// Events of one person; reached through links
pub const PERSON_EVENTS: ChannelId = 4;
/// Instance channel whose filter cannot change after subscribing
pub const STATIC_SEARCH: ChannelId = 5;
/// Type channel accepting filter updates
pub const DYNAMIC_SEARCH: ChannelId = 6;
/// Reference data served from the channel cache
pub const METADATA: ChannelId = 9;

pub const PERSON_TYPE: EntityTypeId = 0;
pub const EVENT_TYPE: EntityTypeId = 1;

pub fn test_schema() -> SystemSchema {
    SystemSchema::new(SYSTEM_ID, "people")
        .with_channel(ChannelSchema::type_channel(PEOPLE, "People", FilterType::None))
        .with_channel(ChannelSchema::instance_channel(PERSON, "Person", FilterType::None))
        .with_channel(ChannelSchema::instance_channel(
            PERSON_EVENTS,
            "PersonEvents",
            FilterType::None,
        ))
        .with_channel(ChannelSchema::instance_channel(
            STATIC_SEARCH,
            "StaticSearch",
            FilterType::StaticInstanced,
        ))
        .with_channel(ChannelSchema::type_channel(
            DYNAMIC_SEARCH,
            "DynamicSearch",
            FilterType::Dynamic,
        ))
        .with_channel(ChannelSchema::type_channel(METADATA, "Metadata", FilterType::None).cacheable())
        .with_entity(EntitySchema::new(PERSON_TYPE, "Person"))
        .with_entity(EntitySchema::new(EVENT_TYPE, "Event"))
}

/// Events reference the person they belong to through `personId`
pub fn entity_registry() -> EntityRegistry {
    let mut registry = EntityRegistry::new();
    registry.register(
        SYSTEM_ID,
        EVENT_TYPE,
        ReferenceLinker::new().with_reference("personId", PERSON_TYPE),
    );
    registry
}

pub fn type_address(channel_id: ChannelId) -> ChannelAddress {
    ChannelAddress::type_channel(SYSTEM_ID, channel_id)
}

pub fn instance_address(channel_id: ChannelId, instance_id: InstanceId) -> ChannelAddress {
    ChannelAddress::instance_channel(SYSTEM_ID, channel_id, instance_id)
}
