use std::fmt;

use mongodb::options::ReadPreference;
use mongodb::options::ReadPreferenceOptions;
use mongodb::options::SelectionCriteria;

/// Read routing policy of a handle
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum ConsistencyMode {
    /// Every read is served by the primary
    #[default]
    Strong,
    /// Reads prefer the primary and move forward in time only
    Monotonic,
    /// Any reachable member, lowest latency first
    Eventual,
    /// Secondaries first, the primary when none is available
    SecondaryPreferred,
    /// Secondaries only
    Secondary,
}

impl ConsistencyMode {
    /// Whether reads may be served by a member other than the primary
    pub fn is_relaxed(self) -> bool {
        !matches!(self, ConsistencyMode::Strong)
    }

    pub fn read_preference(self) -> ReadPreference {
        let options = ReadPreferenceOptions::default();
        match self {
            ConsistencyMode::Strong => ReadPreference::Primary,
            ConsistencyMode::Monotonic => ReadPreference::PrimaryPreferred { options },
            ConsistencyMode::Eventual => ReadPreference::Nearest { options },
            ConsistencyMode::SecondaryPreferred => ReadPreference::SecondaryPreferred { options },
            ConsistencyMode::Secondary => ReadPreference::Secondary { options },
        }
    }

    pub fn selection_criteria(self) -> SelectionCriteria {
        SelectionCriteria::ReadPreference(self.read_preference())
    }
}

impl fmt::Display for ConsistencyMode {
    fn fmt(
        &self,
        f: &mut fmt::Formatter<'_>,
    ) -> fmt::Result {
        let name = match self {
            ConsistencyMode::Strong => "strong",
            ConsistencyMode::Monotonic => "monotonic",
            ConsistencyMode::Eventual => "eventual",
            ConsistencyMode::SecondaryPreferred => "secondary-preferred",
            ConsistencyMode::Secondary => "secondary",
        };
        f.write_str(name)
    }
}
