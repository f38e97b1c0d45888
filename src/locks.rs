use std::sync::Arc;

use dashmap::DashMap;
use tokio::sync::{Mutex, OwnedMutexGuard};

/// Per-project mutual exclusion.
///
/// Every mutation below a project (the project row itself, its sections,
/// their files and the directories behind them) holds that project's lock,
/// so a rename can never interleave with a delete or an upload in the same
/// tree.
#[derive(Debug, Default, Clone)]
pub struct EntityLocks {
    projects: Arc<DashMap<i32, Arc<Mutex<()>>>>,
}

impl EntityLocks {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn lock_project(&self, project_id: i32) -> OwnedMutexGuard<()> {
        // Clone the Arc out so the shard guard is released before awaiting
        let mutex = self
            .projects
            .entry(project_id)
            .or_insert_with(|| Arc::new(Mutex::new(())))
            .clone();
        mutex.lock_owned().await
    }

    /// Drop the entry of a deleted project. Holders of a guard keep their
    /// own `Arc`, so this never frees a mutex that is still locked.
    pub fn forget_project(&self, project_id: i32) {
        self.projects.remove(&project_id);
    }
}
