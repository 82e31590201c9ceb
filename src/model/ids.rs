use std::fmt;

use serde::{Deserialize, Serialize};

macro_rules! entity_id {
    ($(#[$meta:meta])* $name:ident, $prefix:literal) => {
        $(#[$meta])*
        #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
        pub struct $name(pub u32);

        impl fmt::Display for $name {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                write!(f, concat!($prefix, "{}"), self.0)
            }
        }
    };
}

entity_id!(WindowId, "w");
entity_id!(ElementId, "e");
entity_id!(InputId, "i");
entity_id!(
    /// Node of the abstract transition graph.
    StateId,
    "s"
);
entity_id!(TransitionId, "t");
entity_id!(TemplateStateId, "ts");
entity_id!(TemplateTransitionId, "tt");
entity_id!(
    /// Concrete snapshot retained in the observation log.
    ObservationId,
    "o"
);
entity_id!(InteractionId, "x");
