//! Cooperative task scheduling.
//!
//! Two queues: a priority heap of macrotasks (time-sliced renders and
//! passive-effect flushes) and a FIFO of roots with synchronous work, which
//! the host drains from a microtask.

use std::cell::Cell;
use std::cmp::Reverse;
use std::collections::{BinaryHeap, VecDeque};
use std::rc::Rc;
use std::time::Duration;

use slotmap::{SlotMap, new_key_type};
use web_time::Instant;

use crate::lanes::SchedulerPriority;
use crate::root::RootId;

/// Monotonic time source for yield checks.
pub trait Clock {
    fn now(&self) -> Duration;
}

pub struct SystemClock {
    origin: Instant,
}

impl Default for SystemClock {
    fn default() -> Self {
        Self {
            origin: Instant::now(),
        }
    }
}

impl Clock for SystemClock {
    fn now(&self) -> Duration {
        self.origin.elapsed()
    }
}

/// Test clock. Clones share the same time. With an auto-advance step every
/// read moves time forward by that step.
#[derive(Clone, Default)]
pub struct ManualClock {
    now: Rc<Cell<Duration>>,
    step: Rc<Cell<Duration>>,
}

impl ManualClock {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn advance(&self, by: Duration) {
        self.now.set(self.now.get() + by);
    }

    pub fn set_auto_advance(&self, step: Duration) {
        self.step.set(step);
    }
}

impl Clock for ManualClock {
    fn now(&self) -> Duration {
        let t = self.now.get();
        self.now.set(t + self.step.get());
        t
    }
}

new_key_type! {
    pub struct TaskId;
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub(crate) enum Task {
    Render(RootId),
    PassiveEffects(RootId),
}

struct TaskEntry {
    task: Task,
    priority: SchedulerPriority,
    expires_at: Option<Duration>,
}

pub(crate) struct Scheduled {
    pub id: TaskId,
    pub task: Task,
    /// Starved past its priority's timeout; run without yielding.
    pub expired: bool,
}

pub(crate) struct Scheduler {
    clock: Box<dyn Clock>,
    time_slice: Duration,
    deadline: Duration,
    tasks: SlotMap<TaskId, TaskEntry>,
    heap: BinaryHeap<Reverse<(SchedulerPriority, u64, TaskId)>>,
    seq: u64,
    sync_queue: VecDeque<RootId>,
    microtask_requested: bool,
}

impl Scheduler {
    pub fn new(clock: Box<dyn Clock>, time_slice: Duration) -> Self {
        Self {
            clock,
            time_slice,
            deadline: Duration::ZERO,
            tasks: SlotMap::with_key(),
            heap: BinaryHeap::new(),
            seq: 0,
            sync_queue: VecDeque::new(),
            microtask_requested: false,
        }
    }

    pub fn now(&self) -> Duration {
        self.clock.now()
    }

    pub fn schedule(&mut self, priority: SchedulerPriority, task: Task) -> TaskId {
        let now = self.now();
        let expires_at = priority.timeout().map(|t| now.saturating_add(t));
        let id = self.tasks.insert(TaskEntry {
            task,
            priority,
            expires_at,
        });
        self.push(priority, id);
        log::trace!("scheduled {task:?} at {priority:?} as {id:?}");
        id
    }

    fn push(&mut self, priority: SchedulerPriority, id: TaskId) {
        self.seq += 1;
        self.heap.push(Reverse((priority, self.seq, id)));
    }

    /// Drops a task that has not started yet. A task that is running keeps
    /// running; it is simply not continued.
    pub fn cancel(&mut self, id: TaskId) {
        if self.tasks.remove(id).is_some() {
            log::trace!("cancelled {id:?}");
        }
    }

    /// Next live task by priority, then insertion order. The task stays
    /// registered until [`finish`](Self::finish) or
    /// [`requeue`](Self::requeue).
    pub fn pop(&mut self) -> Option<Scheduled> {
        while let Some(Reverse((_, _, id))) = self.heap.pop() {
            let Some(entry) = self.tasks.get(id) else {
                continue;
            };
            let expired = entry.expires_at.is_some_and(|at| self.clock.now() >= at);
            return Some(Scheduled {
                id,
                task: entry.task,
                expired,
            });
        }
        None
    }

    /// Puts a yielded task back as its own continuation. No-op if it was
    /// cancelled while running.
    pub fn requeue(&mut self, id: TaskId) {
        if let Some(priority) = self.tasks.get(id).map(|e| e.priority) {
            self.push(priority, id);
        }
    }

    pub fn finish(&mut self, id: TaskId) {
        self.tasks.remove(id);
    }

    pub fn has_tasks(&self) -> bool {
        !self.tasks.is_empty()
    }

    pub fn start_slice(&mut self) {
        self.deadline = self.now() + self.time_slice;
    }

    pub fn should_yield(&self) -> bool {
        self.now() >= self.deadline
    }

    /// Queues sync work for `root`. Returns `true` when the host has to be
    /// asked for a microtask.
    pub fn queue_sync(&mut self, root: RootId) -> bool {
        self.sync_queue.push_back(root);
        !std::mem::replace(&mut self.microtask_requested, true)
    }

    pub fn pop_sync(&mut self) -> Option<RootId> {
        self.sync_queue.pop_front()
    }

    pub fn has_sync_work(&self) -> bool {
        !self.sync_queue.is_empty()
    }

    /// Called when the host runs the microtask.
    pub fn microtask_started(&mut self) {
        self.microtask_requested = false;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn root_id() -> RootId {
        let mut ids: SlotMap<RootId, ()> = SlotMap::with_key();
        ids.insert(())
    }

    fn scheduler() -> (Scheduler, ManualClock) {
        let clock = ManualClock::new();
        (
            Scheduler::new(Box::new(clock.clone()), Duration::from_millis(5)),
            clock,
        )
    }

    #[test]
    fn higher_priority_runs_first_then_fifo() {
        let (mut s, _) = scheduler();
        let root = root_id();
        let low = s.schedule(SchedulerPriority::Low, Task::Render(root));
        let a = s.schedule(SchedulerPriority::Normal, Task::Render(root));
        let b = s.schedule(SchedulerPriority::Normal, Task::PassiveEffects(root));

        let order: Vec<TaskId> = std::iter::from_fn(|| {
            let next = s.pop()?;
            s.finish(next.id);
            Some(next.id)
        })
        .collect();
        assert_eq!(order, vec![a, b, low]);
        assert!(!s.has_tasks());
    }

    #[test]
    fn cancelled_task_never_runs() {
        let (mut s, _) = scheduler();
        let root = root_id();
        let id = s.schedule(SchedulerPriority::Normal, Task::Render(root));
        s.cancel(id);
        assert!(s.pop().is_none());
    }

    #[test]
    fn continuation_keeps_task_id() {
        let (mut s, _) = scheduler();
        let root = root_id();
        let id = s.schedule(SchedulerPriority::Normal, Task::Render(root));
        let first = s.pop().unwrap();
        s.requeue(first.id);
        assert_eq!(s.pop().map(|t| t.id), Some(id));

        s.cancel(id);
        s.requeue(id);
        assert!(s.pop().is_none());
    }

    #[test]
    fn slice_deadline_follows_clock() {
        let (mut s, clock) = scheduler();
        s.start_slice();
        assert!(!s.should_yield());
        clock.advance(Duration::from_millis(5));
        assert!(s.should_yield());
    }

    #[test]
    fn starved_task_is_reported_expired() {
        let (mut s, clock) = scheduler();
        let root = root_id();
        s.schedule(SchedulerPriority::UserBlocking, Task::Render(root));
        clock.advance(Duration::from_millis(300));
        assert!(s.pop().unwrap().expired);
    }

    #[test]
    fn host_is_notified_once_per_microtask() {
        let (mut s, _) = scheduler();
        let root = root_id();
        assert!(s.queue_sync(root));
        assert!(!s.queue_sync(root));
        s.microtask_started();
        assert_eq!(s.pop_sync(), Some(root));
        assert!(s.queue_sync(root));
    }
}
