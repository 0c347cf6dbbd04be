//! Target entities and the default sub-resources a restore may create in them.
//!
//! Applying an archive can leave behind sub-resources the target gets by
//! default (an announcements forum, say) on top of the ones carried in the
//! archive. The catalog exposes enough to find and remove those.

use std::collections::{BTreeMap, BTreeSet};
use std::sync::Mutex;

use thiserror::Error;

#[derive(Error, Debug)]
pub enum CatalogError {
    #[error("Target catalog unavailable: {0}")]
    Unavailable(String),

    #[error("Failed to delete sub-resource {resource_id} of target {target_entity_id}: {reason}")]
    DeleteFailed {
        target_entity_id: i64,
        resource_id: i64,
        reason: String,
    },
}

pub trait TargetCatalog: Send + Sync {
    fn exists(&self, target_entity_id: i64) -> Result<bool, CatalogError>;

    /// Highest id among the target's default sub-resources, if it has any.
    fn contingent_high_water_mark(&self, target_entity_id: i64)
        -> Result<Option<i64>, CatalogError>;

    /// Default sub-resources of the target with an id above `mark`.
    fn contingent_after(&self, target_entity_id: i64, mark: i64)
        -> Result<Vec<i64>, CatalogError>;

    fn delete_contingent(&self, target_entity_id: i64, resource_id: i64)
        -> Result<(), CatalogError>;
}

/// In-process catalog for embedding and tests.
#[derive(Default)]
pub struct MemoryCatalog {
    targets: Mutex<BTreeMap<i64, BTreeSet<i64>>>,
}

impl MemoryCatalog {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_targets<I: IntoIterator<Item = i64>>(ids: I) -> Self {
        let catalog = Self::new();
        for id in ids {
            catalog.add_target(id);
        }
        catalog
    }

    pub fn add_target(&self, target_entity_id: i64) {
        self.lock().entry(target_entity_id).or_default();
    }

    /// Registers a default sub-resource. Returns false for unknown targets.
    pub fn add_contingent(&self, target_entity_id: i64, resource_id: i64) -> bool {
        match self.lock().get_mut(&target_entity_id) {
            Some(resources) => {
                resources.insert(resource_id);
                true
            }
            None => false,
        }
    }

    pub fn contingent(&self, target_entity_id: i64) -> Vec<i64> {
        self.lock()
            .get(&target_entity_id)
            .map(|r| r.iter().copied().collect())
            .unwrap_or_default()
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, BTreeMap<i64, BTreeSet<i64>>> {
        // The map stays consistent even if a holder panicked.
        self.targets
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
    }
}

impl TargetCatalog for MemoryCatalog {
    fn exists(&self, target_entity_id: i64) -> Result<bool, CatalogError> {
        Ok(self.lock().contains_key(&target_entity_id))
    }

    fn contingent_high_water_mark(
        &self,
        target_entity_id: i64,
    ) -> Result<Option<i64>, CatalogError> {
        Ok(self
            .lock()
            .get(&target_entity_id)
            .and_then(|r| r.iter().next_back().copied()))
    }

    fn contingent_after(&self, target_entity_id: i64, mark: i64) -> Result<Vec<i64>, CatalogError> {
        Ok(self
            .lock()
            .get(&target_entity_id)
            .map(|r| {
                r.iter()
                    .copied()
                    .filter(|id| *id > mark)
                    .collect()
            })
            .unwrap_or_default())
    }

    fn delete_contingent(
        &self,
        target_entity_id: i64,
        resource_id: i64,
    ) -> Result<(), CatalogError> {
        let removed = self
            .lock()
            .get_mut(&target_entity_id)
            .is_some_and(|r| r.remove(&resource_id));
        if removed {
            Ok(())
        } else {
            Err(CatalogError::DeleteFailed {
                target_entity_id,
                resource_id,
                reason: "no such sub-resource".to_string(),
            })
        }
    }
}
