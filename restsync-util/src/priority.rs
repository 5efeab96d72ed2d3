use serde::{Deserialize, Serialize};

/// Relative priority of a queued request. Lower-priority classes are only
/// drained once every higher-priority class is empty. `Ord` is derived in
/// declaration order, which is also peek order: `High < Normal < Low`.
#[derive(Serialize, Deserialize, Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
#[serde(rename_all = "lowercase")]
pub enum Priority {
    High,
    Normal,
    Low,
}

impl Priority {
    pub const ALL: [Priority; 3] = [Priority::High, Priority::Normal, Priority::Low];
}

impl Default for Priority {
    fn default() -> Self {
        Priority::Normal
    }
}
