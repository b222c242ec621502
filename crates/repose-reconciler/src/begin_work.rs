use std::panic::{AssertUnwindSafe, catch_unwind};
use std::rc::Rc;

use crate::child_reconciler::ChildReconciler;
use crate::element::{Component, ElementType, Node, Props};
use crate::error::{ReconcileError, Result};
use crate::fiber::{MemoizedState, PendingInput, WorkId, WorkTag};
use crate::flags::Flags;
use crate::host_config::HostConfig;
use crate::update_queue::StateCell;
use crate::work_loop::Reconciler;

impl<H: HostConfig> Reconciler<H> {
    /// Renders one unit and reconciles its children. Returns the first
    /// child to continue with.
    pub(crate) fn begin_work(&mut self, wip: WorkId) -> Result<Option<WorkId>> {
        match self.tree[wip].tag {
            WorkTag::HostRoot => self.update_host_root(wip),
            WorkTag::HostComponent => self.update_host_component(wip),
            WorkTag::HostText => Ok(None),
            WorkTag::FunctionComponent => self.update_function_component(wip),
            WorkTag::Fragment => {
                let children = match &self.tree[wip].pending_input {
                    PendingInput::Children(node) => node.clone(),
                    _ => Node::Empty,
                };
                Ok(self.reconcile_children(wip, &children))
            }
            WorkTag::ContextProvider => self.update_context_provider(wip),
        }
    }

    fn reconcile_children(&mut self, wip: WorkId, children: &Node) -> Option<WorkId> {
        let (current_first, track_effects) = match self.tree[wip].alternate {
            Some(current) => (self.tree[current].child, true),
            None => (None, false),
        };
        let child = ChildReconciler {
            tree: &mut self.tree,
            created: &mut self.created,
            track_effects,
            strategy: self.config.list_diff,
            dev_warnings: self.config.dev_warnings,
        }
        .reconcile(wip, current_first, children);
        self.tree[wip].child = child;
        child
    }

    fn update_host_root(&mut self, wip: WorkId) -> Result<Option<WorkId>> {
        let pending = self.tree[wip]
            .root_queue
            .as_ref()
            .map(|q| q.borrow_mut().take())
            .unwrap_or_default();
        let lanes = self.wip_root_render_lane;

        let next = match self.tree[wip].alternate {
            Some(current) => match &mut self.tree[current].memoized_state {
                MemoizedState::Root(cell) => cell.rebase(pending, lanes),
                _ => StateCell::new(Node::Empty).rebase(pending, lanes),
            },
            None => StateCell::new(Node::Empty).rebase(pending, lanes),
        };
        let children = next.memoized.clone();
        self.tree[wip].memoized_state = MemoizedState::Root(next);
        Ok(self.reconcile_children(wip, &children))
    }

    fn update_host_component(&mut self, wip: WorkId) -> Result<Option<WorkId>> {
        self.mark_ref(wip);
        let children = self.tree[wip]
            .pending_input
            .props()
            .map(|p| p.children.clone())
            .unwrap_or_default();
        Ok(self.reconcile_children(wip, &children))
    }

    fn mark_ref(&mut self, wip: WorkId) {
        let unit = &self.tree[wip];
        let current_ref = unit.alternate.and_then(|c| self.tree[c].node_ref.as_ref());
        let changed = match (current_ref, unit.node_ref.as_ref()) {
            (None, None) => false,
            (Some(a), Some(b)) => !a.ptr_eq(b),
            _ => true,
        };
        if changed {
            self.tree[wip].flags |= Flags::REF;
        }
    }

    fn update_function_component(&mut self, wip: WorkId) -> Result<Option<WorkId>> {
        let Some(ElementType::Component(component)) = self.tree[wip].ty.clone() else {
            if self.config.dev_warnings {
                log::warn!("function component unit without a component type");
            }
            return Ok(None);
        };
        let props = self.tree[wip]
            .pending_input
            .props()
            .cloned()
            .unwrap_or_default();
        let children = self.render_with_hooks(wip, &component, &props)?;
        Ok(self.reconcile_children(wip, &children))
    }

    fn render_with_hooks(
        &mut self,
        wip: WorkId,
        component: &Component,
        props: &Rc<Props>,
    ) -> Result<Node> {
        let current = self.tree[wip].alternate;
        let previous = current.and_then(|c| {
            match std::mem::take(&mut self.tree[c].memoized_state) {
                MemoizedState::Hooks(cells) => Some(cells),
                _ => None,
            }
        });

        self.hooks
            .begin(wip, component.name_rc(), self.wip_root_render_lane, previous);
        let hooks = &mut self.hooks;
        let result = catch_unwind(AssertUnwindSafe(|| component.render(hooks, props)));
        let out = self.hooks.finish();

        if let (Some(current), Some(previous)) = (current, out.previous) {
            self.tree[current].memoized_state = MemoizedState::Hooks(previous);
        }

        let children = match result {
            Ok(children) => children?,
            Err(payload) => {
                let message = if let Some(s) = payload.downcast_ref::<String>() {
                    s.clone()
                } else if let Some(s) = payload.downcast_ref::<&str>() {
                    s.to_string()
                } else {
                    "Unknown panic".to_string()
                };
                return Err(ReconcileError::ComponentPanicked {
                    component: component.name().to_string(),
                    message,
                });
            }
        };

        let unit = &mut self.tree[wip];
        unit.memoized_state = MemoizedState::Hooks(out.cells);
        unit.effects = out.effects;
        unit.flags |= out.flags;
        Ok(children)
    }

    fn update_context_provider(&mut self, wip: WorkId) -> Result<Option<WorkId>> {
        let unit = &self.tree[wip];
        let Some(ElementType::Provider(id)) = unit.ty else {
            return Ok(None);
        };
        let props = unit.pending_input.props().cloned().unwrap_or_default();
        self.hooks.contexts.push(id, props.value.clone());
        Ok(self.reconcile_children(wip, &props.children))
    }
}
