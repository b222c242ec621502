//! Pending state transitions and their priority-aware replay.
//!
//! Updates for one state slot are kept oldest-first; the most recently
//! enqueued update is the queue's tail. Replaying walks the list once,
//! applying the updates the current render's lanes admit and carrying the
//! rest (plus everything after the first skip) over to a later render.

use std::cell::RefCell;
use std::collections::VecDeque;
use std::fmt;
use std::rc::Rc;

use crate::lanes::{Lane, Lanes, is_subset_of_lanes};

/// Either a replacement value or a pure function of the previous state.
pub enum Action<S> {
    Replace(S),
    Reduce(Rc<dyn Fn(&S) -> S>),
}

impl<S: Clone> Action<S> {
    pub fn apply(&self, prev: &S) -> S {
        match self {
            Action::Replace(v) => v.clone(),
            Action::Reduce(f) => f(prev),
        }
    }
}

impl<S: Clone> Clone for Action<S> {
    fn clone(&self) -> Self {
        match self {
            Action::Replace(v) => Action::Replace(v.clone()),
            Action::Reduce(f) => Action::Reduce(f.clone()),
        }
    }
}

impl<S: fmt::Debug> fmt::Debug for Action<S> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Action::Replace(v) => f.debug_tuple("Replace").field(v).finish(),
            Action::Reduce(_) => f.write_str("Reduce(<fn>)"),
        }
    }
}

#[derive(Debug)]
pub struct Update<S> {
    pub action: Action<S>,
    pub lane: Lane,
}

impl<S> Update<S> {
    pub fn new(action: Action<S>, lane: Lane) -> Self {
        Self { action, lane }
    }
}

impl<S: Clone> Clone for Update<S> {
    fn clone(&self) -> Self {
        Self {
            action: self.action.clone(),
            lane: self.lane,
        }
    }
}

/// Ordered list of updates, oldest first.
#[derive(Debug)]
pub struct UpdateList<S> {
    updates: VecDeque<Update<S>>,
}

impl<S> Default for UpdateList<S> {
    fn default() -> Self {
        Self {
            updates: VecDeque::new(),
        }
    }
}

impl<S: Clone> Clone for UpdateList<S> {
    fn clone(&self) -> Self {
        Self {
            updates: self.updates.clone(),
        }
    }
}

impl<S> UpdateList<S> {
    pub fn new() -> Self {
        Self::default()
    }

    /// O(1) append at the tail; earlier entries are never overwritten.
    pub fn enqueue(&mut self, update: Update<S>) {
        self.updates.push_back(update);
    }

    /// Splices `other` after the current tail, keeping both orders.
    pub fn append(&mut self, mut other: UpdateList<S>) {
        self.updates.append(&mut other.updates);
    }

    pub fn take(&mut self) -> UpdateList<S> {
        std::mem::take(self)
    }

    /// The most recently enqueued update.
    pub fn pending(&self) -> Option<&Update<S>> {
        self.updates.back()
    }

    pub fn iter(&self) -> impl Iterator<Item = &Update<S>> {
        self.updates.iter()
    }

    pub fn len(&self) -> usize {
        self.updates.len()
    }

    pub fn is_empty(&self) -> bool {
        self.updates.is_empty()
    }

    pub fn lanes(&self) -> Lanes {
        self.updates.iter().fold(Lanes::NONE, |acc, u| acc | u.lane)
    }
}

/// Queue shared by both generations of a state slot and by its setter.
pub type SharedQueue<S> = Rc<RefCell<UpdateList<S>>>;

pub struct Processed<S> {
    /// Result of applying every admitted update.
    pub memoized_state: S,
    /// State just before the first skipped update.
    pub base_state: S,
    /// The first skipped update and everything after it.
    pub base_queue: UpdateList<S>,
}

pub fn process_update_queue<S: Clone>(
    base_state: &S,
    updates: &UpdateList<S>,
    render_lanes: Lanes,
) -> Processed<S> {
    let mut new_state = base_state.clone();
    let mut new_base_state: Option<S> = None;
    let mut new_base_queue = UpdateList::new();

    for update in updates.iter() {
        if !is_subset_of_lanes(render_lanes, update.lane) {
            if new_base_state.is_none() {
                new_base_state = Some(new_state.clone());
            }
            new_base_queue.enqueue(update.clone());
            continue;
        }

        if new_base_state.is_some() {
            // Re-applied on top of the skipped ones later; its lane no longer
            // matters.
            new_base_queue.enqueue(Update::new(update.action.clone(), Lanes::NONE));
        }
        new_state = update.action.apply(&new_state);
    }

    Processed {
        base_state: new_base_state.unwrap_or_else(|| new_state.clone()),
        memoized_state: new_state,
        base_queue: new_base_queue,
    }
}

/// Memoized value of a state slot with the replay bookkeeping it needs.
#[derive(Clone, Debug)]
pub struct StateCell<S> {
    pub memoized: S,
    pub base_state: S,
    pub base_queue: UpdateList<S>,
}

impl<S: Clone> StateCell<S> {
    pub fn new(initial: S) -> Self {
        Self {
            memoized: initial.clone(),
            base_state: initial,
            base_queue: UpdateList::new(),
        }
    }

    /// Moves `pending` into this cell's base queue and replays it under
    /// `render_lanes`, returning the next generation of the cell. The
    /// receiver keeps the merged queue, so a discarded render loses nothing.
    pub fn rebase(&mut self, pending: UpdateList<S>, render_lanes: Lanes) -> StateCell<S> {
        self.base_queue.append(pending);
        let processed = process_update_queue(&self.base_state, &self.base_queue, render_lanes);
        StateCell {
            memoized: processed.memoized_state,
            base_state: processed.base_state,
            base_queue: processed.base_queue,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn add(n: i32) -> Action<i32> {
        Action::Reduce(Rc::new(move |s: &i32| s + n))
    }

    #[test]
    fn enqueue_keeps_every_update_in_order() {
        let mut q = UpdateList::new();
        q.enqueue(Update::new(Action::Replace(1), Lanes::DEFAULT));
        q.enqueue(Update::new(add(2), Lanes::DEFAULT));
        q.enqueue(Update::new(add(3), Lanes::DEFAULT));
        assert_eq!(q.len(), 3);
        assert_eq!(q.pending().map(|u| u.lane), Some(Lanes::DEFAULT));

        let p = process_update_queue(&0, &q, Lanes::DEFAULT);
        assert_eq!(p.memoized_state, 6);
        assert_eq!(p.base_state, 6);
        assert!(p.base_queue.is_empty());
    }

    #[test]
    fn updaters_fold_over_previous_result() {
        let mut q = UpdateList::new();
        for _ in 0..3 {
            q.enqueue(Update::new(
                Action::Reduce(Rc::new(|s: &i32| s * 2)),
                Lanes::SYNC,
            ));
        }
        let p = process_update_queue(&1, &q, Lanes::SYNC);
        assert_eq!(p.memoized_state, 8);
    }

    #[test]
    fn skipped_updates_are_carried_over() {
        let mut q = UpdateList::new();
        q.enqueue(Update::new(add(1), Lanes::SYNC));
        q.enqueue(Update::new(add(10), Lanes::TRANSITION));
        q.enqueue(Update::new(add(100), Lanes::SYNC));

        let first = process_update_queue(&0, &q, Lanes::SYNC);
        assert_eq!(first.memoized_state, 101);
        assert_eq!(first.base_state, 1);
        assert_eq!(first.base_queue.len(), 2);
        let lanes: Vec<_> = first.base_queue.iter().map(|u| u.lane).collect();
        assert_eq!(lanes, vec![Lanes::TRANSITION, Lanes::NONE]);

        let second = process_update_queue(&first.base_state, &first.base_queue, Lanes::TRANSITION);
        assert_eq!(second.memoized_state, 111);
        assert!(second.base_queue.is_empty());
    }

    #[test]
    fn replay_is_deterministic() {
        let mut q = UpdateList::new();
        q.enqueue(Update::new(add(5), Lanes::DEFAULT));
        q.enqueue(Update::new(Action::Replace(2), Lanes::IDLE));
        q.enqueue(Update::new(add(7), Lanes::DEFAULT));
        let a = process_update_queue(&1, &q, Lanes::DEFAULT);
        let b = process_update_queue(&1, &q, Lanes::DEFAULT);
        assert_eq!(a.memoized_state, b.memoized_state);
        assert_eq!(a.base_state, b.base_state);
        assert_eq!(a.base_queue.len(), b.base_queue.len());
    }

    #[test]
    fn rebase_keeps_merged_queue_on_the_source_cell() {
        let mut current = StateCell::new(0);
        let mut pending = UpdateList::new();
        pending.enqueue(Update::new(add(1), Lanes::DEFAULT));
        pending.enqueue(Update::new(add(2), Lanes::IDLE));

        let next = current.rebase(pending, Lanes::DEFAULT);
        assert_eq!(next.memoized, 1);
        assert_eq!(next.base_state, 1);
        assert_eq!(next.base_queue.len(), 1);
        // A restarted render replays from the untouched base.
        assert_eq!(current.base_queue.len(), 2);
        assert_eq!(current.base_state, 0);
    }
}
