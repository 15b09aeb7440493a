pub type SystemId = u16;
pub type ChannelId = u16;
pub type InstanceId = i32;
pub type EntityTypeId = u16;
pub type EntityId = i32;
pub type RequestId = u32;
pub type Sequence = u32;
