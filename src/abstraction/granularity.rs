use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

use crate::abstraction::reducer::GranularityLevel;
use crate::model::ids::WindowId;

/// Refinement scope: one structural signature inside one window.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct GranularityScope {
    pub window: WindowId,
    pub signature: String,
}

impl GranularityScope {
    pub fn new(window: WindowId, signature: impl Into<String>) -> Self {
        Self {
            window,
            signature: signature.into(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct GranularityRaise {
    pub scope: GranularityScope,
    pub from: GranularityLevel,
    pub to: GranularityLevel,
}

/// Current reducer level per scope. Levels only ever go up.
#[derive(Debug)]
pub struct GranularityTable {
    levels: BTreeMap<GranularityScope, GranularityLevel>,
    raises: Vec<GranularityRaise>,
    max_level: GranularityLevel,
}

impl Default for GranularityTable {
    fn default() -> Self {
        Self::new(GranularityLevel::MAX)
    }
}

impl GranularityTable {
    pub fn new(max_level: GranularityLevel) -> Self {
        Self {
            levels: BTreeMap::new(),
            raises: Vec::new(),
            max_level,
        }
    }

    pub fn level(&self, scope: &GranularityScope) -> GranularityLevel {
        self.levels.get(scope).copied().unwrap_or_default()
    }

    pub fn level_of(&self, window: WindowId, signature: &str) -> GranularityLevel {
        self.level(&GranularityScope::new(window, signature))
    }

    /// Raise by one level. `None` once the scope is at the configured maximum.
    pub fn raise(&mut self, scope: &GranularityScope) -> Option<GranularityRaise> {
        let from = self.level(scope);
        if from >= self.max_level {
            return None;
        }
        let to = from.next()?;
        self.levels.insert(scope.clone(), to);
        let raise = GranularityRaise {
            scope: scope.clone(),
            from,
            to,
        };
        self.raises.push(raise.clone());
        Some(raise)
    }

    /// Restore a persisted level; never lowers an existing one.
    pub fn restore(&mut self, scope: GranularityScope, level: GranularityLevel) {
        let level = level.min(self.max_level);
        let entry = self.levels.entry(scope).or_default();
        if level > *entry {
            *entry = level;
        }
    }

    pub fn can_raise(&self, scope: &GranularityScope) -> bool {
        self.level(scope) < self.max_level
    }

    /// Raises applied during this run, in order.
    pub fn raises(&self) -> &[GranularityRaise] {
        &self.raises
    }

    pub fn scopes(&self) -> impl Iterator<Item = (&GranularityScope, &GranularityLevel)> {
        self.levels.iter()
    }

    pub fn len(&self) -> usize {
        self.levels.len()
    }

    pub fn is_empty(&self) -> bool {
        self.levels.is_empty()
    }
}
