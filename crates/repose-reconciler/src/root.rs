//! Mounted trees and the root-level update entry point.

use std::cell::RefCell;
use std::rc::Rc;

use slotmap::new_key_type;

use crate::effects::EffectRef;
use crate::element::Node;
use crate::error::Result;
use crate::fiber::{MemoizedState, PendingInput, StateNode, WorkId, WorkTag, WorkUnit};
use crate::host_config::HostConfig;
use crate::lanes::{Lane, Lanes};
use crate::scheduler::TaskId;
use crate::update_queue::{Action, StateCell, Update, UpdateList};
use crate::work_loop::Reconciler;

new_key_type! {
    pub struct RootId;
}

/// Handle to a tree mounted with [`Reconciler::create_root`].
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub struct RootHandle(pub(crate) RootId);

impl RootHandle {
    pub fn id(self) -> RootId {
        self.0
    }
}

/// Effect records waiting for the next passive flush.
#[derive(Default)]
pub(crate) struct PendingPassiveEffects {
    /// Records of unmounted components; only their cleanups run.
    pub unmount: Vec<EffectRef>,
    pub update: Vec<EffectRef>,
}

impl PendingPassiveEffects {
    pub fn is_empty(&self) -> bool {
        self.unmount.is_empty() && self.update.is_empty()
    }
}

pub(crate) struct FiberRoot<I> {
    pub container: I,
    /// Root unit of the committed tree.
    pub current: WorkId,
    /// Completed in-progress root waiting for commit.
    pub finished_work: Option<WorkId>,
    pub finished_lane: Lane,
    pub pending_lanes: Lanes,
    /// Lanes updated while a render of this root was in progress.
    pub interleaved_lanes: Lanes,
    pub pending_passive: PendingPassiveEffects,
    pub passive_scheduled: bool,
    pub callback_node: Option<TaskId>,
    pub callback_priority: Lane,
}

impl<I> FiberRoot<I> {
    fn new(container: I, current: WorkId) -> Self {
        Self {
            container,
            current,
            finished_work: None,
            finished_lane: Lanes::NONE,
            pending_lanes: Lanes::NONE,
            interleaved_lanes: Lanes::NONE,
            pending_passive: PendingPassiveEffects::default(),
            passive_scheduled: false,
            callback_node: None,
            callback_priority: Lanes::NONE,
        }
    }
}

impl<H: HostConfig> Reconciler<H> {
    /// Mounts an empty tree into `container`.
    pub fn create_root(&mut self, container: H::Instance) -> RootHandle {
        let mut unit = WorkUnit::new(WorkTag::HostRoot, PendingInput::Empty, None);
        unit.memoized_state = MemoizedState::Root(StateCell::new(Node::Empty));
        unit.root_queue = Some(Rc::new(RefCell::new(UpdateList::new())));
        let host_root = self.tree.insert(unit);
        let id = self.roots.insert(FiberRoot::new(container, host_root));
        self.tree[host_root].state_node = StateNode::Root(id);
        log::debug!("created root {id:?}");
        RootHandle(id)
    }

    /// Asks for `root` to render `node`, at the current update priority.
    /// Nothing is rendered until the scheduler runs.
    pub fn update_root(&mut self, node: Node, root: RootHandle) -> Node {
        let Some(r) = self.roots.get(root.0) else {
            log::warn!("update_root: {:?} is not mounted in this reconciler", root.0);
            return node;
        };
        let current = r.current;
        let lane = self.inbox.request_update_lane();
        if let Some(queue) = &self.tree[current].root_queue {
            queue
                .borrow_mut()
                .enqueue(Update::new(Action::Replace(node.clone()), lane));
        }
        self.schedule_update_on_fiber(current, lane);
        node
    }

    /// Host container of a mounted root.
    pub fn container(&self, root: RootHandle) -> Option<&H::Instance> {
        self.roots.get(root.0).map(|r| &r.container)
    }

    /// Lanes with updates not yet committed.
    pub fn pending_lanes(&self, root: RootHandle) -> Lanes {
        self.roots
            .get(root.0)
            .map_or(Lanes::NONE, |r| r.pending_lanes)
    }

    /// Runs the passive effects of `root` now instead of waiting for their
    /// task. Returns whether anything ran.
    pub fn flush_passive(&mut self, root: RootHandle) -> Result<bool> {
        self.flush_passive_effects(root.0)
    }
}
