use serde::{Deserialize, Serialize};
use std::fmt;

/// Selects what a pipeline fetches: a scope (a project) and, for single
/// resources, the resource id inside it.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct ResourceKey {
    scope: String,
    id: Option<String>,
}

impl ResourceKey {
    /// Key for a whole collection under `scope`
    #[must_use]
    pub fn collection(scope: impl Into<String>) -> Self {
        Self {
            scope: scope.into(),
            id: None,
        }
    }

    /// Key for one resource under `scope`
    #[must_use]
    pub fn single(scope: impl Into<String>, id: impl Into<String>) -> Self {
        Self {
            scope: scope.into(),
            id: Some(id.into()),
        }
    }

    #[must_use]
    pub fn scope(&self) -> &str {
        &self.scope
    }

    #[must_use]
    pub fn id(&self) -> Option<&str> {
        self.id.as_deref()
    }
}

impl fmt::Display for ResourceKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.id {
            Some(id) => write!(f, "{}:{id}", self.scope),
            None => write!(f, "{}:*", self.scope),
        }
    }
}
