//! Deferred, coalescing work queue.
//!
//! Evaluation runs while the host is computing displayed values and must not
//! mutate shared state. Subscription changes and text rewrites are queued here
//! instead, and the host drains the queue once per turn through
//! [`SurfaceContext::run_pending`](crate::base::SurfaceContext::run_pending).
use std::{
    collections::{HashSet, VecDeque},
    fmt,
};

use log::trace;
use parking_lot::Mutex;

use crate::expr::heal::RefKind;

pub type Task = Box<dyn FnOnce() + Send>;

/// Coalescing key of a deferred task.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum TaskKey {
    /// Subscription sync of one expression.
    Sync(u64),
    /// Reference rewrite of one expression.
    Rewrite {
        owner: u64,
        kind: RefKind,
        from: String,
    },
    Custom(String),
}

impl fmt::Display for TaskKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            TaskKey::Sync(owner) => write!(f, "sync({owner})"),
            TaskKey::Rewrite { owner, kind, from } => write!(f, "rewrite({owner}, {kind}, {from})"),
            TaskKey::Custom(name) => write!(f, "custom({name})"),
        }
    }
}

#[derive(Default)]
struct Queue {
    tasks: VecDeque<(TaskKey, Task)>,
    pending: HashSet<TaskKey>,
}

#[derive(Default)]
pub struct Scheduler {
    queue: Mutex<Queue>,
}

impl Scheduler {
    pub fn new() -> Self {
        Self::default()
    }

    /// Queue `task` unless a task with the same key is already pending.
    /// Returns false when coalesced.
    pub fn schedule(&self, key: TaskKey, task: impl FnOnce() + Send + 'static) -> bool {
        let mut queue = self.queue.lock();
        if !queue.pending.insert(key.clone()) {
            trace!("Task {} already pending, coalesced", key);
            return false;
        }
        queue.tasks.push_back((key, Box::new(task)));
        true
    }

    pub fn is_pending(&self, key: &TaskKey) -> bool {
        self.queue.lock().pending.contains(key)
    }

    pub fn pending_len(&self) -> usize {
        self.queue.lock().tasks.len()
    }

    /// Run every task queued before this call. Tasks scheduled while draining
    /// wait for the next drain. Returns the number of tasks run.
    pub fn drain(&self) -> usize {
        let tasks = {
            let mut queue = self.queue.lock();
            let tasks = std::mem::take(&mut queue.tasks);
            for (key, _) in &tasks {
                queue.pending.remove(key);
            }
            tasks
        };

        let count = tasks.len();
        for (key, task) in tasks {
            trace!("Running deferred task {}", key);
            task();
        }
        count
    }
}

#[cfg(test)]
mod tests {
    use std::sync::{
        Arc,
        atomic::{AtomicUsize, Ordering},
    };

    use super::*;

    #[test]
    fn same_key_is_coalesced_until_drained() {
        let sched = Scheduler::new();
        let hits = Arc::new(AtomicUsize::new(0));
        for _ in 0..3 {
            let hits = hits.clone();
            sched.schedule(TaskKey::Sync(1), move || {
                hits.fetch_add(1, Ordering::SeqCst);
            });
        }
        assert!(sched.is_pending(&TaskKey::Sync(1)));
        assert_eq!(sched.drain(), 1);
        assert_eq!(hits.load(Ordering::SeqCst), 1);
        assert!(!sched.is_pending(&TaskKey::Sync(1)));
    }

    #[test]
    fn tasks_scheduled_while_draining_wait_for_next_turn() {
        let sched = Arc::new(Scheduler::new());
        let inner = sched.clone();
        sched.schedule(TaskKey::Custom("outer".into()), move || {
            inner.schedule(TaskKey::Custom("inner".into()), || {});
        });
        assert_eq!(sched.drain(), 1);
        assert_eq!(sched.pending_len(), 1);
        assert_eq!(sched.drain(), 1);
        assert_eq!(sched.drain(), 0);
    }
}
