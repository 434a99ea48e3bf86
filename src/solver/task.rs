//! Discovery tasks run between resolution cycles.
//!
//! Tasks never see the resolution context. They run on a worker pool in
//! dependency waves and return outputs that the controlling thread applies
//! at the start of the next cycle.

use std::fmt;

use anyhow::Result;
use rayon::prelude::*;
use thiserror::Error;

use crate::core::ModCandidate;

/// Index of a submitted task.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct TaskId(usize);

impl fmt::Display for TaskId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "task#{}", self.0)
    }
}

/// Error submitting a task.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum TaskError {
    #[error("task `{task}` depends on unknown {dependency}")]
    UnknownDependency { task: String, dependency: TaskId },
}

/// What a task asks the solver to do.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct TaskOutput {
    /// Candidates to register
    pub candidates: Vec<ModCandidate>,
    /// Keys of candidates to withdraw
    pub withdraw: Vec<String>,
    /// Stop resolving altogether
    pub halt: Option<String>,
}

/// A finished task.
#[derive(Debug, Clone)]
pub struct TaskOutcome {
    pub id: TaskId,
    pub name: String,
    /// Output, or the error message if the task failed
    pub result: std::result::Result<TaskOutput, String>,
}

impl TaskOutcome {
    pub fn succeeded(&self) -> bool {
        self.result.is_ok()
    }
}

/// Work that discovers or replaces candidates.
pub trait DiscoveryTask: Send + Sync {
    fn name(&self) -> &str;

    /// Run the task. `dependencies` holds the outcome of every task this one
    /// depends on, failed or not, in submission order.
    fn run(&self, dependencies: &[TaskOutcome]) -> Result<TaskOutput>;
}

struct PendingTask {
    task: Box<dyn DiscoveryTask>,
    dependencies: Vec<TaskId>,
}

/// Tasks waiting for the next cycle boundary.
pub struct TaskQueue {
    pending: Vec<PendingTask>,
    next_id: usize,
    jobs: Option<usize>,
}

impl TaskQueue {
    /// `jobs` limits worker threads; `None` uses rayon's default.
    pub fn new(jobs: Option<usize>) -> Self {
        TaskQueue {
            pending: Vec::new(),
            next_id: 0,
            jobs,
        }
    }

    /// Queue a task after the given tasks, which must already be queued.
    pub fn submit(
        &mut self,
        task: Box<dyn DiscoveryTask>,
        dependencies: &[TaskId],
    ) -> std::result::Result<TaskId, TaskError> {
        let first_pending = self.next_id - self.pending.len();
        for dependency in dependencies {
            if dependency.0 < first_pending || dependency.0 >= self.next_id {
                return Err(TaskError::UnknownDependency {
                    task: task.name().to_string(),
                    dependency: *dependency,
                });
            }
        }

        let id = TaskId(self.next_id);
        self.next_id += 1;
        self.pending.push(PendingTask {
            task,
            dependencies: dependencies.to_vec(),
        });
        Ok(id)
    }

    pub fn is_empty(&self) -> bool {
        self.pending.is_empty()
    }

    pub fn len(&self) -> usize {
        self.pending.len()
    }

    /// Run every queued task and return the outcomes in submission order.
    pub fn run_all(&mut self) -> Result<Vec<TaskOutcome>> {
        let pending = std::mem::take(&mut self.pending);
        if pending.is_empty() {
            return Ok(Vec::new());
        }
        let base = self.next_id - pending.len();

        // Wave of a task: one past the latest wave among its dependencies
        let mut waves: Vec<usize> = Vec::with_capacity(pending.len());
        for task in &pending {
            let wave = task
                .dependencies
                .iter()
                .map(|d| waves[d.0 - base] + 1)
                .max()
                .unwrap_or(0);
            waves.push(wave);
        }

        let mut builder = rayon::ThreadPoolBuilder::new();
        if let Some(jobs) = self.jobs {
            builder = builder.num_threads(jobs);
        }
        let pool = builder.build()?;

        let mut outcomes: Vec<Option<TaskOutcome>> = vec![None; pending.len()];
        let last_wave = waves.iter().copied().max().unwrap_or(0);

        for wave in 0..=last_wave {
            let batch: Vec<usize> = (0..pending.len()).filter(|i| waves[*i] == wave).collect();
            tracing::debug!("running {} discovery tasks (wave {})", batch.len(), wave);

            let finished: Vec<TaskOutcome> = pool.install(|| {
                batch
                    .par_iter()
                    .map(|&index| {
                        let entry = &pending[index];
                        let inputs: Vec<TaskOutcome> = entry
                            .dependencies
                            .iter()
                            .filter_map(|d| outcomes[d.0 - base].clone())
                            .collect();
                        let result = entry.task.run(&inputs).map_err(|e| format!("{:#}", e));
                        if let Err(message) = &result {
                            tracing::warn!("task `{}` failed: {}", entry.task.name(), message);
                        }
                        TaskOutcome {
                            id: TaskId(base + index),
                            name: entry.task.name().to_string(),
                            result,
                        }
                    })
                    .collect()
            });

            for outcome in finished {
                let slot = outcome.id.0 - base;
                outcomes[slot] = Some(outcome);
            }
        }

        Ok(outcomes.into_iter().flatten().collect())
    }
}

impl Default for TaskQueue {
    fn default() -> Self {
        TaskQueue::new(None)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_support::fixtures::CandidateFixture;

    struct Emit(&'static str);

    impl DiscoveryTask for Emit {
        fn name(&self) -> &str {
            self.0
        }

        fn run(&self, _dependencies: &[TaskOutcome]) -> Result<TaskOutput> {
            Ok(TaskOutput {
                candidates: vec![CandidateFixture::new(self.0, "1.0").build()],
                ..TaskOutput::default()
            })
        }
    }

    struct Fail;

    impl DiscoveryTask for Fail {
        fn name(&self) -> &str {
            "fail"
        }

        fn run(&self, _dependencies: &[TaskOutcome]) -> Result<TaskOutput> {
            anyhow::bail!("archive is corrupt")
        }
    }

    /// Reports how many of its dependencies succeeded.
    struct Count;

    impl DiscoveryTask for Count {
        fn name(&self) -> &str {
            "count"
        }

        fn run(&self, dependencies: &[TaskOutcome]) -> Result<TaskOutput> {
            let ok = dependencies.iter().filter(|d| d.succeeded()).count();
            Ok(TaskOutput {
                halt: Some(format!("{} of {}", ok, dependencies.len())),
                ..TaskOutput::default()
            })
        }
    }

    #[test]
    fn test_dependent_runs_after_failure() {
        let mut queue = TaskQueue::new(Some(2));
        let a = queue.submit(Box::new(Emit("a")), &[]).unwrap();
        let b = queue.submit(Box::new(Fail), &[]).unwrap();
        queue.submit(Box::new(Count), &[a, b]).unwrap();

        let outcomes = queue.run_all().unwrap();
        assert_eq!(outcomes.len(), 3);
        assert!(outcomes[0].succeeded());
        assert_eq!(outcomes[1].result, Err("archive is corrupt".to_string()));
        assert_eq!(
            outcomes[2].result.as_ref().unwrap().halt.as_deref(),
            Some("1 of 2")
        );
        assert!(queue.is_empty());
    }

    #[test]
    fn test_unknown_dependency_rejected() {
        let mut queue = TaskQueue::default();
        let err = queue
            .submit(Box::new(Emit("a")), &[TaskId(5)])
            .unwrap_err();
        assert!(matches!(err, TaskError::UnknownDependency { .. }));
    }

    #[test]
    fn test_ids_continue_across_runs() {
        let mut queue = TaskQueue::default();
        let first = queue.submit(Box::new(Emit("a")), &[]).unwrap();
        queue.run_all().unwrap();

        // Finished tasks can no longer be depended on
        assert!(queue.submit(Box::new(Emit("b")), &[first]).is_err());
        let second = queue.submit(Box::new(Emit("b")), &[]).unwrap();
        assert_ne!(first, second);
        let outcomes = queue.run_all().unwrap();
        assert_eq!(outcomes[0].id, second);
    }
}
