use serde::{Deserialize, Serialize};
use serde_json::Value;

/// Opaque filter value attached to a channel subscription. Only equality is
/// meaningful to the replication core; interpretation belongs to the data source.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Filter(Value);

impl Filter {
    pub fn new(value: Value) -> Self {
        Self(value)
    }

    pub fn value(&self) -> &Value {
        &self.0
    }

    pub fn into_value(self) -> Value {
        self.0
    }
}

impl From<Value> for Filter {
    fn from(value: Value) -> Self {
        Self(value)
    }
}

/// How a channel may be filtered
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum FilterType {
    /// Channel never carries a filter
    None,
    /// Filter fixed at subscribe time
    Static,
    /// Filter fixed at subscribe time, per instance
    StaticInstanced,
    /// Filter may be updated in place
    Dynamic,
}

impl FilterType {
    pub fn accepts_filter(&self) -> bool {
        !matches!(self, FilterType::None)
    }

    /// Whether an existing subscription's filter may change without a
    /// unsubscribe/resubscribe cycle
    pub fn allows_update(&self) -> bool {
        matches!(self, FilterType::Dynamic)
    }
}
