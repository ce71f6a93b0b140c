//! Precedence edges between sibling subtasks.
//!
//! Edges live on the task records themselves (`depends_on` on the dependent,
//! `blocked_by` on the dependency). Each mutation writes both records in one
//! store transaction while holding the parent's lock from [`ParentLocks`].
//!
//! Two behaviours are deliberately narrow:
//! - cycle detection only looks at the direct pair (`to` already depending
//!   on `from`); longer cycles are accepted.
//! - [`DependencyGraph::can_complete`] only inspects direct dependencies.

use std::collections::{BTreeMap, BTreeSet};

use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::core::locks::{with_slot, ParentLocks};
use crate::db::{TaskStore, TaskTx};
use crate::error::{Result, TaskError};
use crate::id::TaskId;
use crate::types::{Task, TaskPatch, TaskQuery};

pub struct DependencyGraph<'a> {
    store: &'a dyn TaskStore,
    locks: &'a ParentLocks,
}

impl<'a> DependencyGraph<'a> {
    pub fn new(store: &'a dyn TaskStore, locks: &'a ParentLocks) -> Self {
        Self { store, locks }
    }

    fn load(&self, id: &TaskId) -> Result<Task> {
        self.store
            .get(id)?
            .ok_or_else(|| TaskError::NotFound(id.clone()))
    }

    /// Declare that `from` depends on `to`. Re-adding an edge is a no-op.
    pub fn add_edge(&self, from: &TaskId, to: &TaskId) -> Result<()> {
        let from_task = self.load(from)?;
        let to_task = self.load(to)?;
        let parent_id = shared_parent(&from_task, &to_task)?;

        if from == to {
            return Err(TaskError::CircularDependency {
                task_id: from.clone(),
                dependency_id: to.clone(),
            });
        }

        with_slot(&self.locks.slot(&parent_id), || {
            self.store.transaction(&mut |tx: &dyn TaskTx| -> Result<()> {
                // Re-read: another writer may have landed before we got the lock
                let from_task = load_in(tx, from)?;
                let to_task = load_in(tx, to)?;

                if to_task.depends_on.contains(from) {
                    return Err(TaskError::CircularDependency {
                        task_id: from.clone(),
                        dependency_id: to.clone(),
                    });
                }

                if !from_task.depends_on.contains(to) {
                    let mut depends_on = from_task.depends_on;
                    depends_on.insert(to.clone());
                    tx.patch(
                        from,
                        &TaskPatch {
                            depends_on: Some(depends_on),
                            ..Default::default()
                        },
                    )?;
                }

                if !to_task.blocked_by.contains(from) {
                    let mut blocked_by = to_task.blocked_by;
                    blocked_by.insert(from.clone());
                    tx.patch(
                        to,
                        &TaskPatch {
                            blocked_by: Some(blocked_by),
                            ..Default::default()
                        },
                    )?;
                }
                Ok(())
            })?;

            debug!(%from, %to, parent = %parent_id, "dependency added");
            Ok(())
        })
    }

    /// Remove the edge `from -> to` from both records. Absent edges are a no-op.
    ///
    /// A `to` that no longer exists is still stripped from `from.depends_on`,
    /// so a dangling dependency can always be cleared.
    pub fn remove_edge(&self, from: &TaskId, to: &TaskId) -> Result<()> {
        let from_task = self.load(from)?;
        let scope = match from_task.parent_id {
            Some(parent_id) => Some(parent_id),
            None => self.store.get(to)?.and_then(|t| t.parent_id),
        };

        let remove = || -> Result<()> {
            self.store.transaction(&mut |tx: &dyn TaskTx| -> Result<()> {
                let from_task = load_in(tx, from)?;
                let to_task = tx.get(to)?;
                if to_task.is_none() && !from_task.depends_on.contains(to) {
                    return Err(TaskError::NotFound(to.clone()));
                }

                if from_task.depends_on.contains(to) {
                    let mut depends_on = from_task.depends_on;
                    depends_on.remove(to);
                    tx.patch(
                        from,
                        &TaskPatch {
                            depends_on: Some(depends_on),
                            ..Default::default()
                        },
                    )?;
                }

                if let Some(to_task) = to_task.filter(|t| t.blocked_by.contains(from)) {
                    let mut blocked_by = to_task.blocked_by;
                    blocked_by.remove(from);
                    tx.patch(
                        to,
                        &TaskPatch {
                            blocked_by: Some(blocked_by),
                            ..Default::default()
                        },
                    )?;
                }
                Ok(())
            })?;

            debug!(%from, %to, "dependency removed");
            Ok(())
        };

        match scope {
            Some(parent_id) => with_slot(&self.locks.slot(&parent_id), remove),
            None => remove(),
        }
    }

    /// True when every direct dependency of `id` is completed.
    pub fn can_complete(&self, id: &TaskId) -> Result<bool> {
        let task = self.load(id)?;
        Ok(self.pending_dependencies(&task)?.is_empty())
    }

    /// Direct dependencies of `task` that are not completed. Ids that no
    /// longer resolve count as pending.
    pub fn pending_dependencies(&self, task: &Task) -> Result<Vec<TaskId>> {
        let mut pending = Vec::new();
        for dep_id in &task.depends_on {
            let done = self.store.get(dep_id)?.is_some_and(|dep| dep.completed);
            if !done {
                pending.push(dep_id.clone());
            }
        }
        Ok(pending)
    }

    /// Explicit adjacency view of one parent's subtasks.
    pub fn snapshot(&self, parent_id: &TaskId) -> Result<SiblingGraph> {
        let siblings = self.store.query(&TaskQuery::ChildrenOf(parent_id.clone()))?;
        Ok(SiblingGraph::from_tasks(parent_id.clone(), &siblings))
    }

    /// Delete `task` together with its subtasks. A subtask is stripped out of
    /// its siblings' edge sets in the same transaction that removes it.
    pub fn remove_task(&self, task: &Task) -> Result<()> {
        // A top-level task's own slot guards its children
        let scope = task.parent_id.as_ref().unwrap_or(&task.id);
        let id = &task.id;

        with_slot(&self.locks.slot(scope), || {
            self.store.transaction(&mut |tx: &dyn TaskTx| -> Result<()> {
                let Some(task) = tx.get(id)? else {
                    return Ok(());
                };

                for dep_id in &task.depends_on {
                    if let Some(dep) = tx.get(dep_id)? {
                        let mut blocked_by = dep.blocked_by;
                        if blocked_by.remove(id) {
                            tx.patch(
                                dep_id,
                                &TaskPatch {
                                    blocked_by: Some(blocked_by),
                                    ..Default::default()
                                },
                            )?;
                        }
                    }
                }

                for dependent_id in &task.blocked_by {
                    if let Some(dependent) = tx.get(dependent_id)? {
                        let mut depends_on = dependent.depends_on;
                        if depends_on.remove(id) {
                            tx.patch(
                                dependent_id,
                                &TaskPatch {
                                    depends_on: Some(depends_on),
                                    ..Default::default()
                                },
                            )?;
                        }
                    }
                }

                for child in tx.query(&TaskQuery::ChildrenOf(id.clone()))? {
                    tx.delete(&child.id)?;
                }
                tx.delete(id)
            })?;

            debug!(task = %id, scope = %scope, "task removed from sibling graph");
            Ok(())
        })
    }
}

fn load_in(tx: &dyn TaskTx, id: &TaskId) -> Result<Task> {
    tx.get(id)?.ok_or_else(|| TaskError::NotFound(id.clone()))
}

/// Both endpoints must be subtasks of the same parent.
fn shared_parent(from: &Task, to: &Task) -> Result<TaskId> {
    let from_parent = from
        .parent_id
        .as_ref()
        .ok_or_else(|| TaskError::NotASubtask(from.id.clone()))?;
    let to_parent = to
        .parent_id
        .as_ref()
        .ok_or_else(|| TaskError::NotASubtask(to.id.clone()))?;

    if from_parent != to_parent {
        return Err(TaskError::CrossParentMismatch {
            task_id: from.id.clone(),
            other_id: to.id.clone(),
        });
    }
    Ok(from_parent.clone())
}

/// Which half of an edge is missing.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum MissingSide {
    /// `from.depends_on` lists `to` but `to.blocked_by` lacks `from`
    BlockedBy,
    /// `to.blocked_by` lists `from` but `from.depends_on` lacks `to`
    DependsOn,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Asymmetry {
    pub from: TaskId,
    pub to: TaskId,
    pub missing: MissingSide,
}

/// Adjacency built from one parent's subtask records.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SiblingGraph {
    pub parent_id: TaskId,
    /// Subtask -> the subtasks it depends on
    pub depends_on: BTreeMap<TaskId, BTreeSet<TaskId>>,
    /// Subtask -> the subtasks waiting on it
    pub blocked_by: BTreeMap<TaskId, BTreeSet<TaskId>>,
}

impl SiblingGraph {
    pub fn from_tasks(parent_id: TaskId, siblings: &[Task]) -> Self {
        let mut depends_on = BTreeMap::new();
        let mut blocked_by = BTreeMap::new();
        for task in siblings {
            depends_on.insert(task.id.clone(), task.depends_on.clone());
            blocked_by.insert(task.id.clone(), task.blocked_by.clone());
        }
        Self {
            parent_id,
            depends_on,
            blocked_by,
        }
    }

    /// Edges as `(dependent, dependency)` pairs, read from `depends_on`.
    pub fn edges(&self) -> impl Iterator<Item = (&TaskId, &TaskId)> {
        self.depends_on
            .iter()
            .flat_map(|(from, tos)| tos.iter().map(move |to| (from, to)))
    }

    pub fn edge_count(&self) -> usize {
        self.edges().count()
    }

    /// Edges recorded on only one of their two records.
    pub fn asymmetries(&self) -> Vec<Asymmetry> {
        let mut found = Vec::new();

        for (from, to) in self.edges() {
            let mirrored = self
                .blocked_by
                .get(to)
                .is_some_and(|waiting| waiting.contains(from));
            if !mirrored {
                found.push(Asymmetry {
                    from: from.clone(),
                    to: to.clone(),
                    missing: MissingSide::BlockedBy,
                });
            }
        }

        for (to, waiting) in &self.blocked_by {
            for from in waiting {
                let mirrored = self
                    .depends_on
                    .get(from)
                    .is_some_and(|deps| deps.contains(to));
                if !mirrored {
                    found.push(Asymmetry {
                        from: from.clone(),
                        to: to.clone(),
                        missing: MissingSide::DependsOn,
                    });
                }
            }
        }

        found
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::MemoryStore;
    use crate::types::NewTask;

    struct Fixture {
        store: MemoryStore,
        locks: ParentLocks,
        parent: TaskId,
    }

    impl Fixture {
        fn new() -> Self {
            let store = MemoryStore::new();
            let parent = store.insert(NewTask::default()).unwrap();
            Self {
                store,
                locks: ParentLocks::new(),
                parent,
            }
        }

        fn graph(&self) -> DependencyGraph<'_> {
            DependencyGraph::new(&self.store, &self.locks)
        }

        fn subtask(&self, text: &str) -> TaskId {
            self.store
                .insert(NewTask {
                    text: text.to_string(),
                    parent_id: Some(self.parent.clone()),
                    ..Default::default()
                })
                .unwrap()
        }

        fn task(&self, id: &TaskId) -> Task {
            self.store.get(id).unwrap().unwrap()
        }

        fn complete(&self, id: &TaskId) {
            self.store
                .patch(
                    id,
                    &TaskPatch {
                        completed: Some(true),
                        ..Default::default()
                    },
                )
                .unwrap();
        }
    }

    #[test]
    fn add_edge_writes_both_sides() {
        let fx = Fixture::new();
        let a = fx.subtask("a");
        let b = fx.subtask("b");

        fx.graph().add_edge(&a, &b).unwrap();

        assert_eq!(fx.task(&a).depends_on, BTreeSet::from([b.clone()]));
        assert_eq!(fx.task(&b).blocked_by, BTreeSet::from([a.clone()]));
    }

    #[test]
    fn add_edge_twice_is_idempotent() {
        let fx = Fixture::new();
        let a = fx.subtask("a");
        let b = fx.subtask("b");

        fx.graph().add_edge(&a, &b).unwrap();
        let version = fx.task(&a).version;
        fx.graph().add_edge(&a, &b).unwrap();

        assert_eq!(fx.task(&a).depends_on.len(), 1);
        assert_eq!(fx.task(&b).blocked_by.len(), 1);
        assert_eq!(fx.task(&a).version, version);
    }

    #[test]
    fn remove_edge_restores_previous_state() {
        let fx = Fixture::new();
        let a = fx.subtask("a");
        let b = fx.subtask("b");
        let a_before = fx.task(&a);
        let b_before = fx.task(&b);

        fx.graph().add_edge(&a, &b).unwrap();
        fx.graph().remove_edge(&a, &b).unwrap();

        assert_eq!(fx.task(&a).depends_on, a_before.depends_on);
        assert_eq!(fx.task(&a).blocked_by, a_before.blocked_by);
        assert_eq!(fx.task(&b).depends_on, b_before.depends_on);
        assert_eq!(fx.task(&b).blocked_by, b_before.blocked_by);
    }

    #[test]
    fn remove_absent_edge_is_noop() {
        let fx = Fixture::new();
        let a = fx.subtask("a");
        let b = fx.subtask("b");
        fx.graph().remove_edge(&a, &b).unwrap();
        assert_eq!(fx.task(&a).version, 1);
        assert_eq!(fx.task(&b).version, 1);
    }

    #[test]
    fn direct_cycle_is_rejected_without_writes() {
        let fx = Fixture::new();
        let a = fx.subtask("a");
        let b = fx.subtask("b");
        fx.graph().add_edge(&a, &b).unwrap();
        let b_version = fx.task(&b).version;

        let result = fx.graph().add_edge(&b, &a);
        assert!(matches!(result, Err(TaskError::CircularDependency { .. })));
        assert_eq!(fx.task(&b).version, b_version);
        assert!(fx.task(&b).depends_on.is_empty());
    }

    #[test]
    fn self_edge_is_rejected() {
        let fx = Fixture::new();
        let a = fx.subtask("a");
        let result = fx.graph().add_edge(&a, &a);
        assert!(matches!(result, Err(TaskError::CircularDependency { .. })));
    }

    #[test]
    fn three_node_cycle_is_not_detected() {
        // Only the direct pair is checked; this documents the accepted gap.
        let fx = Fixture::new();
        let a = fx.subtask("a");
        let b = fx.subtask("b");
        let c = fx.subtask("c");

        fx.graph().add_edge(&a, &b).unwrap();
        fx.graph().add_edge(&b, &c).unwrap();
        fx.graph().add_edge(&c, &a).unwrap();

        assert_eq!(fx.graph().snapshot(&fx.parent).unwrap().edge_count(), 3);
    }

    #[test]
    fn cross_parent_edge_is_rejected() {
        let fx = Fixture::new();
        let a = fx.subtask("a");
        let other_parent = fx.store.insert(NewTask::default()).unwrap();
        let stranger = fx
            .store
            .insert(NewTask {
                parent_id: Some(other_parent),
                ..Default::default()
            })
            .unwrap();

        let result = fx.graph().add_edge(&a, &stranger);
        assert!(matches!(result, Err(TaskError::CrossParentMismatch { .. })));
        assert!(fx.task(&a).depends_on.is_empty());
    }

    #[test]
    fn top_level_tasks_cannot_take_edges() {
        let fx = Fixture::new();
        let a = fx.subtask("a");
        let result = fx.graph().add_edge(&a, &fx.parent);
        assert!(matches!(result, Err(TaskError::NotASubtask(_))));
    }

    #[test]
    fn missing_endpoint_is_not_found() {
        let fx = Fixture::new();
        let a = fx.subtask("a");
        let ghost = TaskId::new();
        assert!(matches!(
            fx.graph().add_edge(&a, &ghost),
            Err(TaskError::NotFound(id)) if id == ghost
        ));
        assert!(matches!(
            fx.graph().remove_edge(&ghost, &a),
            Err(TaskError::NotFound(_))
        ));
    }

    #[test]
    fn can_complete_checks_direct_dependencies_only() {
        let fx = Fixture::new();
        let a = fx.subtask("a");
        let b = fx.subtask("b");
        let c = fx.subtask("c");

        assert!(fx.graph().can_complete(&a).unwrap());

        fx.graph().add_edge(&a, &b).unwrap();
        fx.graph().add_edge(&b, &c).unwrap();
        assert!(!fx.graph().can_complete(&a).unwrap());

        // c is still open two hops away from a
        fx.complete(&b);
        assert!(fx.graph().can_complete(&a).unwrap());
        assert!(!fx.graph().can_complete(&b).unwrap());
    }

    #[test]
    fn dangling_dependency_counts_as_pending() {
        let fx = Fixture::new();
        let a = fx.subtask("a");
        let b = fx.subtask("b");
        fx.graph().add_edge(&a, &b).unwrap();
        fx.store.delete(&b).unwrap();

        let task = fx.task(&a);
        assert_eq!(fx.graph().pending_dependencies(&task).unwrap(), vec![b]);
    }

    #[test]
    fn dangling_dependency_can_be_removed() {
        let fx = Fixture::new();
        let a = fx.subtask("a");
        let b = fx.subtask("b");
        fx.graph().add_edge(&a, &b).unwrap();
        fx.store.delete(&b).unwrap();
        assert!(!fx.graph().can_complete(&a).unwrap());

        fx.graph().remove_edge(&a, &b).unwrap();

        assert!(fx.task(&a).depends_on.is_empty());
        assert!(fx.graph().can_complete(&a).unwrap());
        // Once cleared, the missing id is reported again
        assert!(matches!(
            fx.graph().remove_edge(&a, &b),
            Err(TaskError::NotFound(id)) if id == b
        ));
    }

    #[test]
    fn remove_task_strips_it_from_siblings() {
        let fx = Fixture::new();
        let a = fx.subtask("a");
        let b = fx.subtask("b");
        let c = fx.subtask("c");
        fx.graph().add_edge(&a, &b).unwrap();
        fx.graph().add_edge(&b, &c).unwrap();

        fx.graph().remove_task(&fx.task(&b)).unwrap();

        assert!(fx.store.get(&b).unwrap().is_none());
        assert!(fx.task(&a).depends_on.is_empty());
        assert!(fx.task(&c).blocked_by.is_empty());
    }

    #[test]
    fn remove_task_racing_add_edge_leaves_no_dangling_id() {
        for _ in 0..20 {
            let fx = Fixture::new();
            let a = fx.subtask("a");
            let b = fx.subtask("b");
            let doomed = fx.task(&b);

            std::thread::scope(|s| {
                s.spawn(|| {
                    // Fails with NotFound when the delete wins
                    let _ = fx.graph().add_edge(&a, &b);
                });
                s.spawn(|| fx.graph().remove_task(&doomed).unwrap());
            });

            assert!(fx.store.get(&b).unwrap().is_none());
            assert!(fx.task(&a).depends_on.is_empty());
        }
    }

    #[test]
    fn remove_top_level_task_takes_its_subtasks() {
        let fx = Fixture::new();
        let a = fx.subtask("a");
        let b = fx.subtask("b");
        fx.graph().add_edge(&a, &b).unwrap();

        fx.graph().remove_task(&fx.task(&fx.parent)).unwrap();

        assert!(fx.store.query(&TaskQuery::All).unwrap().is_empty());
    }

    #[test]
    fn snapshot_reports_asymmetric_edges() {
        let fx = Fixture::new();
        let a = fx.subtask("a");
        let b = fx.subtask("b");
        fx.graph().add_edge(&a, &b).unwrap();
        assert!(fx.graph().snapshot(&fx.parent).unwrap().asymmetries().is_empty());

        // Simulate the lost second write of an unlocked removal
        fx.store
            .patch(
                &a,
                &TaskPatch {
                    depends_on: Some(BTreeSet::new()),
                    ..Default::default()
                },
            )
            .unwrap();

        let found = fx.graph().snapshot(&fx.parent).unwrap().asymmetries();
        assert_eq!(
            found,
            vec![Asymmetry {
                from: a,
                to: b,
                missing: MissingSide::DependsOn,
            }]
        );
    }

    #[test]
    fn concurrent_add_and_remove_stay_symmetric() {
        let fx = Fixture::new();
        let a = fx.subtask("a");
        let b = fx.subtask("b");

        std::thread::scope(|s| {
            for i in 0..8 {
                let (fx, a, b) = (&fx, &a, &b);
                s.spawn(move || {
                    for _ in 0..25 {
                        if i % 2 == 0 {
                            fx.graph().add_edge(a, b).unwrap();
                        } else {
                            fx.graph().remove_edge(a, b).unwrap();
                        }
                    }
                });
            }
        });

        let graph = fx.graph().snapshot(&fx.parent).unwrap();
        assert!(graph.asymmetries().is_empty());
        assert!(graph.edge_count() <= 1);
    }
}
