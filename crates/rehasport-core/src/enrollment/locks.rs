use crate::types::CourseId;
use parking_lot::Mutex;
use std::{collections::HashMap, sync::Arc};
use tokio::sync::{Mutex as AsyncMutex, OwnedMutexGuard};

///
/// CourseLocks
///
/// One async mutex per course id. Enroll and remove on the same course queue
/// behind each other; different courses never share a lock. Idle entries are
/// pruned once the table grows past `prune_threshold`.
///

#[derive(Debug)]
pub struct CourseLocks {
    locks: Mutex<HashMap<CourseId, Arc<AsyncMutex<()>>>>,
    prune_threshold: usize,
}

impl CourseLocks {
    #[must_use]
    pub fn new(prune_threshold: usize) -> Self {
        Self {
            locks: Mutex::new(HashMap::new()),
            prune_threshold: prune_threshold.max(1),
        }
    }

    /// Wait for exclusive access to `course`.
    pub async fn acquire(&self, course: &CourseId) -> OwnedMutexGuard<()> {
        let lock = {
            let mut locks = self.locks.lock();
            if locks.len() >= self.prune_threshold {
                // Only the table holds an idle lock.
                locks.retain(|_, lock| Arc::strong_count(lock) > 1);
            }

            locks.entry(course.clone()).or_default().clone()
        };

        lock.lock_owned().await
    }

    /// Number of tracked courses, idle or not.
    #[must_use]
    pub fn tracked(&self) -> usize {
        self.locks.lock().len()
    }
}

impl Default for CourseLocks {
    fn default() -> Self {
        Self::new(1024)
    }
}

///
/// TESTS
///
