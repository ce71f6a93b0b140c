use std::collections::BTreeSet;

use tracing::debug;

use crate::core::locks::{with_slot, ParentLocks};
use crate::db::{TaskStore, TaskTx};
use crate::error::{Result, TaskError};
use crate::id::TaskId;
use crate::types::{TaskPatch, TaskQuery};

/// Sibling order keys for a parent's subtasks.
pub struct OrderingService<'a> {
    store: &'a dyn TaskStore,
    locks: &'a ParentLocks,
}

impl<'a> OrderingService<'a> {
    pub fn new(store: &'a dyn TaskStore, locks: &'a ParentLocks) -> Self {
        Self { store, locks }
    }

    /// Order key for a new subtask: one past the largest sibling key.
    pub fn next_order(&self, parent_id: &TaskId) -> Result<i64> {
        let siblings = self.store.query(&TaskQuery::ChildrenOf(parent_id.clone()))?;
        Ok(siblings.iter().map(|t| t.order).max().map_or(0, |max| max + 1))
    }

    /// Rewrite every listed subtask's order key to its position in
    /// `ordered_ids`. Subtasks left out of the list keep their old key.
    /// Every id is checked before anything is written.
    pub fn reorder(&self, parent_id: &TaskId, ordered_ids: &[TaskId]) -> Result<()> {
        let mut seen = BTreeSet::new();
        if let Some(dup) = ordered_ids.iter().find(|id| !seen.insert(*id)) {
            return Err(TaskError::DuplicateId(dup.clone()));
        }

        with_slot(&self.locks.slot(parent_id), || {
            self.store.transaction(&mut |tx: &dyn TaskTx| -> Result<()> {
                let mut current = Vec::with_capacity(ordered_ids.len());
                for id in ordered_ids {
                    let task = tx.get(id)?.ok_or_else(|| TaskError::NotFound(id.clone()))?;
                    if task.parent_id.as_ref() != Some(parent_id) {
                        return Err(TaskError::CrossParentMismatch {
                            task_id: id.clone(),
                            other_id: parent_id.clone(),
                        });
                    }
                    current.push(task.order);
                }

                for (position, (id, old)) in ordered_ids.iter().zip(current).enumerate() {
                    let order = position as i64;
                    if old != order {
                        tx.patch(
                            id,
                            &TaskPatch {
                                order: Some(order),
                                ..Default::default()
                            },
                        )?;
                    }
                }
                Ok(())
            })?;

            debug!(parent = %parent_id, count = ordered_ids.len(), "subtasks reordered");
            Ok(())
        })
    }
}
