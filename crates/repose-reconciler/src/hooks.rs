//! Component-local state and effects.
//!
//! Hooks are positional: the n-th hook call of a render binds to the n-th
//! cell recorded by the previous render of the same component instance.
//! The previous cells are lent to [`Hooks`] for the duration of one render
//! and handed back afterwards, so a discarded render leaves the committed
//! cells intact.

use std::any::Any;
use std::cell::{Cell, RefCell};
use std::rc::Rc;

use crate::context::{Context, ContextStack};
use crate::effects::{Deps, Dispose, EffectRecord, EffectRef, deps_equal};
use crate::error::{ReconcileError, Result};
use crate::fiber::WorkId;
use crate::flags::{Flags, HookFlags};
use crate::lanes::{Lane, Lanes};
use crate::update_queue::{Action, SharedQueue, StateCell, Update, UpdateList};

/// One recorded hook call.
pub(crate) enum HookCell {
    /// Holds a `StateHook<S>`.
    State(Box<dyn Any>),
    Effect(EffectRef),
    Transition(StartTransition),
}

struct StateHook<S> {
    cell: StateCell<S>,
    queue: SharedQueue<S>,
    setter: SetState<S>,
}

/// Where setters leave their scheduling requests. Shared between the
/// reconciler and every setter it handed out, so calling a setter never
/// needs access to the reconciler itself.
pub(crate) struct UpdateInbox {
    update_lane: Cell<Lane>,
    scheduled: RefCell<Vec<(WorkId, Lane)>>,
}

impl Default for UpdateInbox {
    fn default() -> Self {
        Self {
            update_lane: Cell::new(Lanes::DEFAULT),
            scheduled: RefCell::new(Vec::new()),
        }
    }
}

impl UpdateInbox {
    /// Lane for an update triggered right now.
    pub fn request_update_lane(&self) -> Lane {
        self.update_lane.get()
    }

    pub fn schedule(&self, unit: WorkId, lane: Lane) {
        self.scheduled.borrow_mut().push((unit, lane));
    }

    pub fn take_scheduled(&self) -> Vec<(WorkId, Lane)> {
        std::mem::take(&mut *self.scheduled.borrow_mut())
    }

    pub fn has_scheduled(&self) -> bool {
        !self.scheduled.borrow().is_empty()
    }

    /// Runs `f` with every update it triggers tagged `lane`.
    pub fn with_lane<R>(&self, lane: Lane, f: impl FnOnce() -> R) -> R {
        let prev = self.update_lane.replace(lane);
        let out = f();
        self.update_lane.set(prev);
        out
    }
}

/// Setter bound to one state cell. Clones share the cell.
pub struct SetState<S> {
    unit: WorkId,
    queue: SharedQueue<S>,
    inbox: Rc<UpdateInbox>,
}

impl<S> Clone for SetState<S> {
    fn clone(&self) -> Self {
        Self {
            unit: self.unit,
            queue: self.queue.clone(),
            inbox: self.inbox.clone(),
        }
    }
}

impl<S> std::fmt::Debug for SetState<S> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SetState").field("unit", &self.unit).finish_non_exhaustive()
    }
}

impl<S: 'static> SetState<S> {
    /// Replaces the state on the next render.
    pub fn set(&self, value: S) {
        self.dispatch(Action::Replace(value));
    }

    /// Derives the next state from the previous one on the next render.
    pub fn update(&self, f: impl Fn(&S) -> S + 'static) {
        self.dispatch(Action::Reduce(Rc::new(f)));
    }

    pub fn dispatch(&self, action: Action<S>) {
        let lane = self.inbox.request_update_lane();
        self.queue.borrow_mut().enqueue(Update::new(action, lane));
        self.inbox.schedule(self.unit, lane);
    }
}

/// Starts a transition: a state change the user is not waiting on.
#[derive(Clone)]
pub struct StartTransition {
    set_pending: SetState<bool>,
    inbox: Rc<UpdateInbox>,
}

impl StartTransition {
    /// Flags the transition as pending at the current priority, then runs
    /// `f` with its updates at transition priority.
    pub fn start(&self, f: impl FnOnce()) {
        self.set_pending.set(true);
        self.inbox.with_lane(Lanes::TRANSITION, || {
            f();
            self.set_pending.set(false);
        });
    }
}

/// What one component render produced.
pub(crate) struct HookOutput {
    pub cells: Vec<HookCell>,
    /// The lent cells of the previous render, to be handed back.
    pub previous: Option<Vec<HookCell>>,
    pub effects: Vec<EffectRef>,
    pub flags: Flags,
}

/// Hook context passed to every function component.
pub struct Hooks {
    rendering: Option<WorkId>,
    component: Rc<str>,
    render_lanes: Lanes,
    previous: Option<Vec<HookCell>>,
    cells: Vec<HookCell>,
    cursor: usize,
    effects: Vec<EffectRef>,
    flags: Flags,
    inbox: Rc<UpdateInbox>,
    pub(crate) contexts: ContextStack,
    dev_warnings: bool,
}

impl Hooks {
    pub(crate) fn new(inbox: Rc<UpdateInbox>, dev_warnings: bool) -> Self {
        Self {
            rendering: None,
            component: Rc::from(""),
            render_lanes: Lanes::NONE,
            previous: None,
            cells: Vec::new(),
            cursor: 0,
            effects: Vec::new(),
            flags: Flags::NONE,
            inbox,
            contexts: ContextStack::default(),
            dev_warnings,
        }
    }

    pub(crate) fn begin(
        &mut self,
        unit: WorkId,
        component: Rc<str>,
        render_lanes: Lanes,
        previous: Option<Vec<HookCell>>,
    ) {
        self.rendering = Some(unit);
        self.component = component;
        self.render_lanes = render_lanes;
        self.previous = previous;
        self.cells.clear();
        self.cursor = 0;
        self.effects.clear();
        self.flags = Flags::NONE;
    }

    pub(crate) fn finish(&mut self) -> HookOutput {
        if self.dev_warnings
            && let Some(prev) = &self.previous
            && self.cells.len() < prev.len()
        {
            log::warn!(
                "component `{}` called {} hooks, fewer than the {} of its previous render",
                self.component,
                self.cells.len(),
                prev.len()
            );
        }
        self.rendering = None;
        HookOutput {
            cells: std::mem::take(&mut self.cells),
            previous: self.previous.take(),
            effects: std::mem::take(&mut self.effects),
            flags: std::mem::replace(&mut self.flags, Flags::NONE),
        }
    }

    /// Name of the component currently rendering.
    pub fn component_name(&self) -> &str {
        &self.component
    }

    /// Lanes of the render in progress.
    pub fn render_lanes(&self) -> Lanes {
        self.render_lanes
    }

    fn next_index(&mut self) -> Result<usize> {
        if self.rendering.is_none() {
            return Err(ReconcileError::HookOutsideRender);
        }
        let index = self.cursor;
        self.cursor += 1;
        Ok(index)
    }

    fn previous_cell(&mut self, index: usize) -> Result<Option<&mut HookCell>> {
        match &mut self.previous {
            None => Ok(None),
            Some(prev) => match prev.get_mut(index) {
                Some(cell) => Ok(Some(cell)),
                None => Err(ReconcileError::HookCountMismatch {
                    component: self.component.to_string(),
                    index,
                }),
            },
        }
    }

    fn kind_mismatch(&self, index: usize) -> ReconcileError {
        ReconcileError::HookKindMismatch {
            component: self.component.to_string(),
            index,
        }
    }

    /// State cell. `init` runs on mount only; later renders replay the
    /// updates queued since, filtered by the render's lanes.
    pub fn use_state<S: Clone + 'static>(
        &mut self,
        init: impl FnOnce() -> S,
    ) -> Result<(S, SetState<S>)> {
        let index = self.next_index()?;
        let render_lanes = self.render_lanes;
        let hook = match self.previous_cell(index)? {
            None => {
                let unit = self.rendering.ok_or(ReconcileError::HookOutsideRender)?;
                let queue: SharedQueue<S> = Rc::new(RefCell::new(UpdateList::new()));
                StateHook {
                    cell: StateCell::new(init()),
                    setter: SetState {
                        unit,
                        queue: queue.clone(),
                        inbox: self.inbox.clone(),
                    },
                    queue,
                }
            }
            Some(HookCell::State(prev)) => match prev.downcast_mut::<StateHook<S>>() {
                Some(prev) => {
                    let pending = prev.queue.borrow_mut().take();
                    StateHook {
                        cell: prev.cell.rebase(pending, render_lanes),
                        queue: prev.queue.clone(),
                        setter: prev.setter.clone(),
                    }
                }
                None => return Err(self.kind_mismatch(index)),
            },
            Some(_) => return Err(self.kind_mismatch(index)),
        };
        let out = (hook.cell.memoized.clone(), hook.setter.clone());
        self.cells.push(HookCell::State(Box::new(hook)));
        Ok(out)
    }

    /// Passive effect. `deps` of `None` runs after every commit, an empty
    /// list runs once, otherwise it re-runs whenever a dependency changes.
    pub fn use_effect(
        &mut self,
        create: impl FnOnce() -> Option<Dispose> + 'static,
        deps: Option<Deps>,
    ) -> Result<()> {
        let index = self.next_index()?;
        let (destroy, changed) = match self.previous_cell(index)? {
            None => (None, true),
            Some(HookCell::Effect(prev)) => {
                let prev = prev.borrow();
                let same = match (&deps, &prev.deps) {
                    (Some(next), Some(before)) => deps_equal(next, before),
                    _ => false,
                };
                (prev.destroy.clone(), !same)
            }
            Some(_) => return Err(self.kind_mismatch(index)),
        };

        let mut tag = HookFlags::PASSIVE;
        if changed {
            tag |= HookFlags::HAS_EFFECT;
            self.flags |= Flags::PASSIVE_EFFECT;
        }
        let record: EffectRef = Rc::new(RefCell::new(EffectRecord {
            tag,
            create: Some(Box::new(create)),
            destroy,
            deps,
        }));
        self.effects.push(record.clone());
        self.cells.push(HookCell::Effect(record));
        Ok(())
    }

    /// `(is_pending, start)`. Updates made inside `start` render at
    /// transition priority; `is_pending` is `true` until they commit.
    pub fn use_transition(&mut self) -> Result<(bool, StartTransition)> {
        let (pending, set_pending) = self.use_state(|| false)?;
        let index = self.next_index()?;
        let start = match self.previous_cell(index)? {
            None => StartTransition {
                set_pending,
                inbox: self.inbox.clone(),
            },
            Some(HookCell::Transition(prev)) => prev.clone(),
            Some(_) => return Err(self.kind_mismatch(index)),
        };
        self.cells.push(HookCell::Transition(start.clone()));
        Ok((pending, start))
    }

    /// Value of the nearest enclosing provider of `context`, or its default.
    pub fn use_context<T: Clone + 'static>(&mut self, context: &Context<T>) -> Result<T> {
        if self.rendering.is_none() {
            return Err(ReconcileError::HookOutsideRender);
        }
        Ok(self.contexts.read(context))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::deps;
    use slotmap::SlotMap;

    fn unit_id() -> WorkId {
        let mut ids: SlotMap<WorkId, ()> = SlotMap::with_key();
        ids.insert(())
    }

    fn hooks() -> Hooks {
        Hooks::new(Rc::new(UpdateInbox::default()), false)
    }

    #[test]
    fn hook_outside_render_is_rejected() {
        let mut h = hooks();
        assert!(matches!(
            h.use_state(|| 0),
            Err(ReconcileError::HookOutsideRender)
        ));
    }

    #[test]
    fn state_replays_queued_updates() {
        let mut h = hooks();
        let unit = unit_id();
        h.begin(unit, "Counter".into(), Lanes::DEFAULT, None);
        let (n, set) = h.use_state(|| 1).unwrap();
        assert_eq!(n, 1);
        let out = h.finish();

        set.update(|n| n + 1);
        set.update(|n| n * 10);
        assert_eq!(h.inbox.take_scheduled().len(), 2);

        h.begin(unit, "Counter".into(), Lanes::DEFAULT, Some(out.cells));
        let (n, _) = h.use_state(|| 1).unwrap();
        assert_eq!(n, 20);
    }

    #[test]
    fn extra_hook_is_a_count_mismatch() {
        let mut h = hooks();
        let unit = unit_id();
        h.begin(unit, "Grow".into(), Lanes::DEFAULT, None);
        h.use_state(|| 0).unwrap();
        let out = h.finish();

        h.begin(unit, "Grow".into(), Lanes::DEFAULT, Some(out.cells));
        h.use_state(|| 0).unwrap();
        let err = h.use_state(|| 0).unwrap_err();
        assert!(matches!(
            err,
            ReconcileError::HookCountMismatch { ref component, index: 1 } if component == "Grow"
        ));
    }

    #[test]
    fn reordered_hooks_are_a_kind_mismatch() {
        let mut h = hooks();
        let unit = unit_id();
        h.begin(unit, "Swap".into(), Lanes::DEFAULT, None);
        h.use_state(|| 0).unwrap();
        let out = h.finish();

        h.begin(unit, "Swap".into(), Lanes::DEFAULT, Some(out.cells));
        let err = h.use_effect(|| None, None).unwrap_err();
        assert!(matches!(err, ReconcileError::HookKindMismatch { index: 0, .. }));
    }

    #[test]
    fn effect_flags_follow_dependencies() {
        let mut h = hooks();
        let unit = unit_id();
        h.begin(unit, "Fx".into(), Lanes::DEFAULT, None);
        h.use_effect(|| None, Some(deps![1])).unwrap();
        let out = h.finish();
        assert!(out.flags.contains(Flags::PASSIVE_EFFECT));

        h.begin(unit, "Fx".into(), Lanes::DEFAULT, Some(out.cells));
        h.use_effect(|| None, Some(deps![1])).unwrap();
        let out = h.finish();
        assert!(out.flags.is_empty());
        assert!(!out.effects[0].borrow().needs_run());

        h.begin(unit, "Fx".into(), Lanes::DEFAULT, Some(out.cells));
        h.use_effect(|| None, Some(deps![2])).unwrap();
        let out = h.finish();
        assert!(out.effects[0].borrow().needs_run());
    }
}
