//! Bridge configuration.

use host_runtime::RemovePolicy;

/// Configuration for an [`InteropRuntime`](crate::InteropRuntime).
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BridgeConfig {
    /// Lower bound of arrays the bridge allocates (construction, slicing,
    /// concatenation, repetition)
    pub canonical_lower_bound: i64,
    /// Removal policy of events that are not bound to a host event
    pub unbound_remove_policy: RemovePolicy,
    /// Maximum number of elements a one-dimensional `repr` shows
    pub repr_max_elements: Option<usize>,
}

impl Default for BridgeConfig {
    fn default() -> Self {
        Self {
            canonical_lower_bound: 0,
            unbound_remove_policy: RemovePolicy::Lenient,
            repr_max_elements: None,
        }
    }
}

impl BridgeConfig {
    /// Create a configuration with default settings.
    pub fn new() -> Self {
        Self::default()
    }

    /// Set the lower bound of bridge-allocated arrays.
    pub fn with_canonical_lower_bound(mut self, lower_bound: i64) -> Self {
        self.canonical_lower_bound = lower_bound;
        self
    }

    /// Set the removal policy of unbound events.
    pub fn with_unbound_remove_policy(mut self, policy: RemovePolicy) -> Self {
        self.unbound_remove_policy = policy;
        self
    }

    /// Elide array elements past `max` in representations.
    pub fn with_repr_max_elements(mut self, max: usize) -> Self {
        self.repr_max_elements = Some(max);
        self
    }
}
