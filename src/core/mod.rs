pub mod dependency_graph;
pub mod lifecycle;
pub mod locks;
pub mod ordering;
pub mod recurrence;
pub mod task_service;

pub use dependency_graph::{Asymmetry, DependencyGraph, MissingSide, SiblingGraph};
pub use lifecycle::{CompletionOutcome, TaskLifecycleCoordinator};
pub use locks::ParentLocks;
pub use ordering::OrderingService;
pub use recurrence::next_occurrence;
pub use task_service::TaskService;
