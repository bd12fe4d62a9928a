//! # Task Scheduler
//!
//! A small task graph with declared resource access.
//!
//! Each task lists the resources it reads and writes. A task depends on
//! every earlier task it conflicts with (write/read, read/write or
//! write/write on a shared resource), so insertion order is a valid
//! topological order. Tasks are grouped into levels by dependency depth and
//! each level runs inside a `rayon::scope`.
//!
//! A failing task is logged and every task depending on it, directly or
//! transitively, is skipped. Independent tasks still run.

use std::sync::{Mutex, PoisonError};

use smallvec::SmallVec;
use tracing::{debug, warn};

use crate::error::{CsgError, CsgResult};

/// Shared state a pass task can touch.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum Resource {
    /// Flattened tree.
    CompactTree,
    /// Brush evaluation order.
    Order,
    /// Base polytope cache.
    BaseCache,
    /// Tree-space brush cache.
    BrushCache,
    /// Bounds cache.
    BoundsCache,
    /// Touching set cache.
    TouchingCache,
    /// Routing table cache.
    RoutingCache,
    /// Render buffer cache.
    RenderCache,
    /// Direct, indirect and evaluate sets.
    DirtySets,
    /// Broad-phase pairs.
    Pairs,
    /// Intersection loops.
    Intersections,
    /// Assembled output.
    Output,
}

type TaskFn<'a, C> = Box<dyn Fn(&C) -> CsgResult<()> + Send + Sync + 'a>;

struct Task<'a, C> {
    name: &'static str,
    reads: SmallVec<[Resource; 4]>,
    writes: SmallVec<[Resource; 4]>,
    dependencies: Vec<usize>,
    run: TaskFn<'a, C>,
}

impl<C> Task<'_, C> {
    fn conflicts(&self, reads: &[Resource], writes: &[Resource]) -> bool {
        self.writes
            .iter()
            .any(|r| reads.contains(r) || writes.contains(r))
            || self.reads.iter().any(|r| writes.contains(r))
    }
}

/// Outcome of one task.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum TaskStatus {
    /// Ran and succeeded.
    Completed,
    /// Ran and returned an error.
    Failed,
    /// Not run because a dependency did not complete.
    Skipped,
}

/// Outcome of a whole graph run, in insertion order.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct TaskReport {
    /// Name and status of every task.
    pub tasks: Vec<(&'static str, TaskStatus)>,
}

impl TaskReport {
    /// True when every task completed.
    pub fn is_success(&self) -> bool {
        self.tasks
            .iter()
            .all(|(_, status)| *status == TaskStatus::Completed)
    }

    /// Status of the named task.
    pub fn status(&self, name: &str) -> Option<TaskStatus> {
        self.tasks
            .iter()
            .find(|(task, _)| *task == name)
            .map(|(_, status)| *status)
    }

    /// Names of failed tasks.
    pub fn failed(&self) -> impl Iterator<Item = &'static str> + '_ {
        self.tasks
            .iter()
            .filter(|(_, status)| *status == TaskStatus::Failed)
            .map(|(name, _)| *name)
    }
}

/// Dependency graph of tasks over a shared context `C`.
pub struct TaskGraph<'a, C> {
    tasks: Vec<Task<'a, C>>,
}

impl<C> Default for TaskGraph<'_, C> {
    fn default() -> Self {
        Self { tasks: Vec::new() }
    }
}

impl<'a, C: Sync> TaskGraph<'a, C> {
    /// Creates an empty graph.
    pub fn new() -> Self {
        Self::default()
    }

    /// Adds a task and returns its index.
    ///
    /// The task depends on every earlier task whose access conflicts with
    /// `reads` and `writes`.
    pub fn add<F>(
        &mut self,
        name: &'static str,
        reads: &[Resource],
        writes: &[Resource],
        run: F,
    ) -> usize
    where
        F: Fn(&C) -> CsgResult<()> + Send + Sync + 'a,
    {
        let dependencies = self
            .tasks
            .iter()
            .enumerate()
            .filter(|(_, task)| task.conflicts(reads, writes))
            .map(|(index, _)| index)
            .collect();
        self.tasks.push(Task {
            name,
            reads: reads.iter().copied().collect(),
            writes: writes.iter().copied().collect(),
            dependencies,
            run: Box::new(run),
        });
        self.tasks.len() - 1
    }

    /// Number of tasks.
    pub fn len(&self) -> usize {
        self.tasks.len()
    }

    /// True when no task was added.
    pub fn is_empty(&self) -> bool {
        self.tasks.is_empty()
    }

    /// Direct dependencies of a task.
    pub fn dependencies(&self, index: usize) -> &[usize] {
        self.tasks
            .get(index)
            .map(|task| task.dependencies.as_slice())
            .unwrap_or_default()
    }

    /// Task indices grouped by dependency depth.
    pub fn levels(&self) -> Vec<Vec<usize>> {
        let mut depth = vec![0usize; self.tasks.len()];
        let mut levels: Vec<Vec<usize>> = Vec::new();
        for (index, task) in self.tasks.iter().enumerate() {
            depth[index] = task
                .dependencies
                .iter()
                .map(|&d| depth[d] + 1)
                .max()
                .unwrap_or(0);
            if levels.len() <= depth[index] {
                levels.resize_with(depth[index] + 1, Vec::new);
            }
            levels[depth[index]].push(index);
        }
        levels
    }

    /// Runs every task, level by level.
    pub fn run(&self, context: &C) -> TaskReport {
        let mut statuses: Vec<Option<TaskStatus>> = vec![None; self.tasks.len()];

        for level in self.levels() {
            let mut runnable = Vec::with_capacity(level.len());
            for index in level {
                let task = &self.tasks[index];
                let blocked = task
                    .dependencies
                    .iter()
                    .any(|&d| statuses[d] != Some(TaskStatus::Completed));
                if blocked {
                    debug!(task = task.name, "skipping task after failed dependency");
                    statuses[index] = Some(TaskStatus::Skipped);
                } else {
                    runnable.push(index);
                }
            }

            let results: Vec<Mutex<Option<CsgResult<()>>>> =
                runnable.iter().map(|_| Mutex::new(None)).collect();
            rayon::scope(|scope| {
                for (slot, &index) in results.iter().zip(&runnable) {
                    let task = &self.tasks[index];
                    scope.spawn(move |_| {
                        let result = (task.run)(context);
                        *slot.lock().unwrap_or_else(PoisonError::into_inner) = Some(result);
                    });
                }
            });

            for (slot, index) in results.into_iter().zip(runnable) {
                let result = slot
                    .into_inner()
                    .unwrap_or_else(PoisonError::into_inner)
                    .unwrap_or_else(|| Err(CsgError::task_failed(self.tasks[index].name, "no result")));
                statuses[index] = Some(match result {
                    Ok(()) => TaskStatus::Completed,
                    Err(error) => {
                        warn!(
                            task = self.tasks[index].name,
                            error = %error,
                            "task failed, dependents skipped"
                        );
                        TaskStatus::Failed
                    }
                });
            }
        }

        TaskReport {
            tasks: self
                .tasks
                .iter()
                .zip(statuses)
                .map(|(task, status)| (task.name, status.unwrap_or(TaskStatus::Skipped)))
                .collect(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};

    #[derive(Default)]
    struct Counters {
        runs: AtomicUsize,
        trace: Mutex<Vec<&'static str>>,
    }

    impl Counters {
        fn record(&self, name: &'static str) -> CsgResult<()> {
            self.runs.fetch_add(1, Ordering::SeqCst);
            self.trace.lock().unwrap().push(name);
            Ok(())
        }
    }

    #[test]
    fn test_dependencies_follow_conflicts() {
        let mut graph: TaskGraph<'_, Counters> = TaskGraph::new();
        let a = graph.add("a", &[], &[Resource::Pairs], |c| c.record("a"));
        let b = graph.add("b", &[Resource::Pairs], &[Resource::Intersections], |c| c.record("b"));
        let c = graph.add("c", &[Resource::Order], &[], |c| c.record("c"));
        let d = graph.add("d", &[Resource::Pairs], &[], |c| c.record("d"));
        assert_eq!(graph.dependencies(a), &[] as &[usize]);
        assert_eq!(graph.dependencies(b), &[a]);
        assert!(graph.dependencies(c).is_empty());
        assert_eq!(graph.dependencies(d), &[a]);
        assert_eq!(graph.levels(), vec![vec![a, c], vec![b, d]]);
    }

    #[test]
    fn test_run_respects_order() {
        let mut graph: TaskGraph<'_, Counters> = TaskGraph::new();
        graph.add("first", &[], &[Resource::DirtySets], |c| c.record("first"));
        graph.add("second", &[Resource::DirtySets], &[Resource::Pairs], |c| c.record("second"));
        graph.add("third", &[Resource::Pairs], &[Resource::Output], |c| c.record("third"));
        let counters = Counters::default();
        let report = graph.run(&counters);
        assert!(report.is_success());
        assert_eq!(*counters.trace.lock().unwrap(), vec!["first", "second", "third"]);
    }

    #[test]
    fn test_failure_skips_dependents_only() {
        let mut graph: TaskGraph<'_, Counters> = TaskGraph::new();
        graph.add("broken", &[], &[Resource::Pairs], |_| {
            Err(CsgError::task_failed("broken", "boom"))
        });
        graph.add("dependent", &[Resource::Pairs], &[Resource::Intersections], |c| {
            c.record("dependent")
        });
        graph.add("transitive", &[Resource::Intersections], &[], |c| c.record("transitive"));
        graph.add("independent", &[], &[Resource::Output], |c| c.record("independent"));

        let counters = Counters::default();
        let report = graph.run(&counters);
        assert!(!report.is_success());
        assert_eq!(report.status("broken"), Some(TaskStatus::Failed));
        assert_eq!(report.status("dependent"), Some(TaskStatus::Skipped));
        assert_eq!(report.status("transitive"), Some(TaskStatus::Skipped));
        assert_eq!(report.status("independent"), Some(TaskStatus::Completed));
        assert_eq!(report.failed().collect::<Vec<_>>(), vec!["broken"]);
        assert_eq!(counters.runs.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn test_tasks_may_borrow_locals() {
        let total = AtomicUsize::new(0);
        let mut graph: TaskGraph<'_, ()> = TaskGraph::new();
        for _ in 0..4 {
            graph.add("add", &[], &[], |_| {
                total.fetch_add(1, Ordering::SeqCst);
                Ok(())
            });
        }
        assert_eq!(graph.levels().len(), 1);
        assert!(graph.run(&()).is_success());
        assert_eq!(total.load(Ordering::SeqCst), 4);
    }
}
