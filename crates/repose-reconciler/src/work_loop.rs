//! Scheduling and the render loop.
//!
//! Updates mark their root's lanes dirty; [`Reconciler::ensure_root_is_scheduled`]
//! turns the most urgent lane into either a sync-queue entry (drained from a
//! host microtask) or a time-sliced render task. A render walks the
//! in-progress tree one unit at a time so it can stop between any two units
//! and pick up again from `wip` on the next slice.

use std::rc::Rc;

use slotmap::SlotMap;

use crate::config::ReconcilerConfig;
use crate::error::{ReconcileError, Result};
use crate::fiber::{PendingInput, StateNode, WorkId, WorkTag, WorkTree};
use crate::flags::Flags;
use crate::hooks::{Hooks, UpdateInbox};
use crate::host_config::HostConfig;
use crate::lanes::{Lane, Lanes, lanes_to_scheduler_priority};
use crate::root::{FiberRoot, RootHandle, RootId};
use crate::scheduler::{Clock, Scheduler, SystemClock, Task, TaskId};

/// Summary handed to the commit observer after every commit.
#[derive(Clone, Debug, PartialEq)]
pub struct CommitInfo {
    pub root: RootHandle,
    pub lane: Lane,
    /// Union of every effect flag in the committed tree.
    pub effects: Flags,
    pub host_mutations: usize,
    pub units_rendered: usize,
}

/// One unit of a committed tree, as reported by [`Reconciler::inspect`].
#[derive(Clone, Debug, PartialEq)]
pub struct InspectedUnit {
    pub depth: usize,
    pub tag: WorkTag,
    pub label: String,
    pub key: Option<String>,
    pub flags: Flags,
}

pub(crate) enum RenderStatus {
    Incomplete,
    Completed,
}

type CommitObserver = Box<dyn FnMut(&CommitInfo)>;

pub struct Reconciler<H: HostConfig> {
    pub(crate) host: H,
    pub(crate) config: ReconcilerConfig,
    pub(crate) tree: WorkTree<H::Instance>,
    pub(crate) roots: SlotMap<RootId, FiberRoot<H::Instance>>,
    pub(crate) scheduler: Scheduler,
    pub(crate) hooks: Hooks,
    pub(crate) inbox: Rc<UpdateInbox>,

    pub(crate) wip: Option<WorkId>,
    pub(crate) wip_root: Option<RootId>,
    pub(crate) wip_root_render_lane: Lane,
    /// Units allocated by the render in progress.
    pub(crate) created: Vec<WorkId>,
    pub(crate) units_rendered: usize,
    flushing_sync: bool,
    pub(crate) observer: Option<CommitObserver>,
}

impl<H: HostConfig> Reconciler<H> {
    pub fn new(host: H) -> Self {
        Self::with_config(host, ReconcilerConfig::default())
    }

    pub fn with_config(host: H, config: ReconcilerConfig) -> Self {
        Self::with_clock(host, config, SystemClock::default())
    }

    pub fn with_clock(host: H, config: ReconcilerConfig, clock: impl Clock + 'static) -> Self {
        let inbox = Rc::new(UpdateInbox::default());
        Self {
            host,
            scheduler: Scheduler::new(Box::new(clock), config.time_slice),
            hooks: Hooks::new(inbox.clone(), config.dev_warnings),
            inbox,
            config,
            tree: WorkTree::default(),
            roots: SlotMap::with_key(),
            wip: None,
            wip_root: None,
            wip_root_render_lane: Lanes::NONE,
            created: Vec::new(),
            units_rendered: 0,
            flushing_sync: false,
            observer: None,
        }
    }

    pub fn host(&self) -> &H {
        &self.host
    }

    pub fn host_mut(&mut self) -> &mut H {
        &mut self.host
    }

    pub fn config(&self) -> &ReconcilerConfig {
        &self.config
    }

    /// Live work units across all roots, both generations.
    pub fn unit_count(&self) -> usize {
        self.tree.len()
    }

    pub fn set_commit_observer(&mut self, observer: impl FnMut(&CommitInfo) + 'static) {
        self.observer = Some(Box::new(observer));
    }

    /// Runs `f` with every update it triggers at `lane`.
    pub fn run_with_priority<R>(&mut self, lane: Lane, f: impl FnOnce(&mut Self) -> R) -> R {
        let inbox = self.inbox.clone();
        let out = inbox.with_lane(lane, || f(self));
        self.process_inbox();
        out
    }

    /// Runs `f` at sync priority and renders and commits its updates
    /// before returning.
    pub fn flush_sync<R>(&mut self, f: impl FnOnce(&mut Self) -> R) -> Result<R> {
        let out = self.run_with_priority(Lanes::SYNC, f);
        self.flush_microtasks()?;
        Ok(out)
    }

    /// Drains synchronous work. Hosts call this from the microtask they
    /// were asked for in [`HostConfig::schedule_microtask`].
    pub fn flush_microtasks(&mut self) -> Result<()> {
        self.scheduler.microtask_started();
        self.process_inbox();
        self.flush_sync_callbacks()
    }

    /// Runs one macrotask slice. Returns `false` when nothing was queued.
    pub fn run_next_task(&mut self) -> Result<bool> {
        self.flush_microtasks()?;
        let Some(next) = self.scheduler.pop() else {
            return Ok(false);
        };
        self.scheduler.start_slice();
        let result = match next.task {
            Task::Render(root) => {
                match self.perform_concurrent_work_on_root(root, next.id, next.expired) {
                    Ok(true) => {
                        self.scheduler.requeue(next.id);
                        Ok(())
                    }
                    Ok(false) => {
                        self.scheduler.finish(next.id);
                        Ok(())
                    }
                    Err(e) => {
                        self.scheduler.finish(next.id);
                        Err(e)
                    }
                }
            }
            Task::PassiveEffects(root) => {
                self.scheduler.finish(next.id);
                self.flush_passive_effects(root).map(|_| ())
            }
        };
        result?;
        self.flush_microtasks()?;
        Ok(true)
    }

    /// Runs tasks until none are left.
    pub fn run_until_idle(&mut self) -> Result<()> {
        while self.run_next_task()? {}
        self.flush_microtasks()
    }

    pub fn has_pending_work(&self) -> bool {
        self.inbox.has_scheduled() || self.scheduler.has_sync_work() || self.scheduler.has_tasks()
    }

    pub(crate) fn process_inbox(&mut self) {
        for (unit, lane) in self.inbox.take_scheduled() {
            self.schedule_update_on_fiber(unit, lane);
        }
    }

    pub(crate) fn schedule_update_on_fiber(&mut self, unit: WorkId, lane: Lane) {
        let Some(root) = self.mark_update_from_fiber_to_root(unit) else {
            if self.config.dev_warnings {
                log::warn!("state update on an unmounted component was dropped");
            }
            return;
        };
        let rendering_this_root = self.wip_root == Some(root);
        let r = &mut self.roots[root];
        r.pending_lanes |= lane;
        if rendering_this_root {
            r.interleaved_lanes |= lane;
        }
        self.ensure_root_is_scheduled(root);
    }

    fn mark_update_from_fiber_to_root(&self, unit: WorkId) -> Option<RootId> {
        let mut node = self.tree.get(unit)?;
        while let Some(parent) = node.parent {
            node = self.tree.get(parent)?;
        }
        match (node.tag, &node.state_node) {
            (WorkTag::HostRoot, StateNode::Root(id)) if self.roots.contains_key(*id) => Some(*id),
            _ => None,
        }
    }

    pub(crate) fn ensure_root_is_scheduled(&mut self, root: RootId) {
        let Some(r) = self.roots.get_mut(root) else {
            return;
        };
        let lane = r.pending_lanes.highest_priority();
        let existing = r.callback_node;

        if lane.is_empty() {
            if let Some(id) = existing {
                self.scheduler.cancel(id);
            }
            r.callback_node = None;
            r.callback_priority = Lanes::NONE;
            return;
        }

        if lane == r.callback_priority {
            return;
        }
        if let Some(id) = existing {
            self.scheduler.cancel(id);
        }

        if lane == Lanes::SYNC {
            log::debug!("root {root:?}: sync work queued");
            r.callback_node = None;
            if self.scheduler.queue_sync(root) {
                self.host.schedule_microtask();
            }
        } else {
            let priority = lanes_to_scheduler_priority(lane);
            log::debug!("root {root:?}: {lane:?} render scheduled at {priority:?}");
            r.callback_node = Some(self.scheduler.schedule(priority, Task::Render(root)));
        }
        r.callback_priority = lane;
    }

    pub(crate) fn flush_sync_callbacks(&mut self) -> Result<()> {
        if self.flushing_sync {
            return Ok(());
        }
        self.flushing_sync = true;
        let mut result = Ok(());
        while let Some(root) = self.scheduler.pop_sync() {
            result = self.perform_sync_work_on_root(root);
            if result.is_err() {
                break;
            }
        }
        self.flushing_sync = false;
        result
    }

    fn perform_sync_work_on_root(&mut self, root: RootId) -> Result<()> {
        let Some(r) = self.roots.get(root) else {
            return Ok(());
        };
        if r.pending_lanes.highest_priority() != Lanes::SYNC {
            // Handled already, or something less urgent is left.
            if let Some(r) = self.roots.get_mut(root)
                && r.callback_priority == Lanes::SYNC
            {
                r.callback_priority = Lanes::NONE;
            }
            self.ensure_root_is_scheduled(root);
            return Ok(());
        }

        self.flush_passive_effects(root)?;
        match self.render_root(root, Lanes::SYNC, false)? {
            RenderStatus::Completed => self.commit_root(root),
            RenderStatus::Incomplete => Ok(()),
        }
    }

    /// Returns `true` when the task should be continued.
    fn perform_concurrent_work_on_root(
        &mut self,
        root: RootId,
        task: TaskId,
        did_timeout: bool,
    ) -> Result<bool> {
        if !self.roots.contains_key(root) {
            return Ok(false);
        }
        if self.flush_passive_effects(root)?
            && self.roots[root].callback_node != Some(task)
        {
            // Effects scheduled something more urgent; this task is stale.
            return Ok(false);
        }

        let lane = self.roots[root].pending_lanes.highest_priority();
        if lane.is_empty() {
            return Ok(false);
        }
        let time_slice = !did_timeout && lane != Lanes::SYNC;

        match self.render_root(root, lane, time_slice)? {
            RenderStatus::Incomplete => Ok(self.roots[root].callback_node == Some(task)),
            RenderStatus::Completed => {
                self.commit_root(root)?;
                Ok(false)
            }
        }
    }

    fn render_root(&mut self, root: RootId, lane: Lane, time_slice: bool) -> Result<RenderStatus> {
        if self.wip_root != Some(root) || self.wip_root_render_lane != lane || self.wip.is_none() {
            self.prepare_fresh_stack(root, lane);
        } else {
            log::debug!("root {root:?}: resuming {lane:?} render");
        }

        let mut retries = 0;
        loop {
            let pass = if time_slice {
                self.work_loop_concurrent()
            } else {
                self.work_loop_sync()
            };
            match pass {
                Ok(()) => break,
                Err(err) if retries < self.config.max_render_retries => {
                    retries += 1;
                    log::warn!("render of root {root:?} failed, retrying from scratch: {err}");
                    self.prepare_fresh_stack(root, lane);
                }
                Err(err) => {
                    log::warn!("render of root {root:?} failed again; dropping {lane:?} updates");
                    self.discard_render();
                    let r = &mut self.roots[root];
                    r.pending_lanes.remove(lane);
                    r.callback_node = None;
                    r.callback_priority = Lanes::NONE;
                    self.ensure_root_is_scheduled(root);
                    return Err(err);
                }
            }
        }

        if self.wip.is_some() {
            log::debug!("root {root:?}: yielded after {} units", self.units_rendered);
            return Ok(RenderStatus::Incomplete);
        }

        let r = &mut self.roots[root];
        let finished = r.current;
        r.finished_work = self.tree[finished].alternate;
        r.finished_lane = lane;
        self.wip_root = None;
        self.wip_root_render_lane = Lanes::NONE;
        Ok(RenderStatus::Completed)
    }

    /// Throws away any render in progress and starts a new one for `root`.
    fn prepare_fresh_stack(&mut self, root: RootId, lane: Lane) {
        self.discard_render();
        let r = &mut self.roots[root];
        r.interleaved_lanes = Lanes::NONE;
        let current = r.current;
        let wip = self.tree.create_work_in_progress(current, PendingInput::Empty);
        self.wip = Some(wip);
        self.wip_root = Some(root);
        self.wip_root_render_lane = lane;
        self.units_rendered = 0;
        log::debug!("root {root:?}: starting {lane:?} render");
    }

    fn discard_render(&mut self) {
        if let Some(root) = self.wip_root.take()
            && self.wip.is_some()
        {
            log::debug!("root {root:?}: discarding unfinished render");
        }
        self.wip = None;
        self.wip_root_render_lane = Lanes::NONE;
        for id in self.created.drain(..) {
            self.tree.remove(id);
        }
        self.hooks.contexts.clear();
    }

    fn work_loop_sync(&mut self) -> Result<()> {
        while let Some(unit) = self.wip {
            self.perform_unit_of_work(unit)?;
        }
        Ok(())
    }

    /// At least one unit per slice, so a slow clock cannot stall the render.
    fn work_loop_concurrent(&mut self) -> Result<()> {
        while let Some(unit) = self.wip {
            self.perform_unit_of_work(unit)?;
            if self.scheduler.should_yield() {
                break;
            }
        }
        Ok(())
    }

    fn perform_unit_of_work(&mut self, unit: WorkId) -> Result<()> {
        log::trace!("begin {}", self.tree[unit].label());
        let next = self.begin_work(unit)?;
        let input = self.tree[unit].pending_input.clone();
        self.tree[unit].memoized_input = Some(input);
        self.units_rendered += 1;
        match next {
            Some(child) => {
                self.wip = Some(child);
                Ok(())
            }
            None => self.complete_unit_of_work(unit),
        }
    }

    fn complete_unit_of_work(&mut self, unit: WorkId) -> Result<()> {
        let mut node = Some(unit);
        while let Some(n) = node {
            self.complete_work(n)?;
            if let Some(sibling) = self.tree[n].sibling {
                self.wip = Some(sibling);
                return Ok(());
            }
            node = self.tree[n].parent;
            self.wip = node;
        }
        Ok(())
    }

    /// Depth-first listing of the committed tree of `root`.
    pub fn inspect(&self, root: RootHandle) -> Result<Vec<InspectedUnit>> {
        let r = self.roots.get(root.0).ok_or(ReconcileError::UnknownRoot)?;
        let mut out = Vec::new();
        let mut stack = vec![(r.current, 0usize)];
        while let Some((id, depth)) = stack.pop() {
            let Some(unit) = self.tree.get(id) else {
                continue;
            };
            out.push(InspectedUnit {
                depth,
                tag: unit.tag,
                label: unit.label(),
                key: unit.key.as_ref().map(|k| k.to_string()),
                flags: unit.flags,
            });
            let children: Vec<WorkId> = self.tree.children(id).collect();
            stack.extend(children.into_iter().rev().map(|c| (c, depth + 1)));
        }
        Ok(out)
    }
}
