mod replicant_session;
mod subscription_entry;

pub use replicant_session::{ReplicantSession, SessionState};
pub use subscription_entry::SubscriptionEntry;
