//! Polymorphic resource references
//!
//! Applications, services, and databases are addressed uniformly as
//! `{kind, id}` pairs by the migration and transfer pipelines.

use serde::{Deserialize, Serialize};
use uuid::Uuid;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ResourceKind {
    Application,
    Service,
    Database,
}

impl ResourceKind {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Application => "application",
            Self::Service => "service",
            Self::Database => "database",
        }
    }

    /// Dependency rank for grouped migrations: databases move first because
    /// services and applications reference them through resource links.
    pub fn migration_rank(self) -> u8 {
        match self {
            Self::Database => 0,
            Self::Service => 1,
            Self::Application => 2,
        }
    }
}

impl std::fmt::Display for ResourceKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// Tagged reference to a migratable resource.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct ResourceRef {
    pub kind: ResourceKind,
    pub id: Uuid,
}

impl ResourceRef {
    pub fn new(kind: ResourceKind, id: Uuid) -> Self {
        Self { kind, id }
    }
}

impl std::fmt::Display for ResourceRef {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}/{}", self.kind, self.id)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_display() {
        let id = Uuid::nil();
        let r = ResourceRef::new(ResourceKind::Database, id);
        assert_eq!(r.to_string(), format!("database/{}", id));
    }

    #[test]
    fn test_migration_rank_order() {
        assert!(ResourceKind::Database.migration_rank() < ResourceKind::Service.migration_rank());
        assert!(
            ResourceKind::Service.migration_rank() < ResourceKind::Application.migration_rank()
        );
    }
}
