//! Applies a finished render to the host.
//!
//! Sub-phases run in a fixed order: mutation (placements, updates,
//! deletions, detaching old refs), the tree swap, then layout (attaching
//! new refs). Passive effects are only collected here and flushed later by
//! their own task.

use crate::error::Result;
use crate::fiber::{StateNode, WorkId, WorkTag};
use crate::flags::{Flags, HookFlags};
use crate::host_config::HostConfig;
use crate::lanes::{Lanes, SchedulerPriority};
use crate::root::{RootHandle, RootId};
use crate::scheduler::Task;
use crate::work_loop::{CommitInfo, Reconciler};

impl<H: HostConfig> Reconciler<H> {
    pub(crate) fn commit_root(&mut self, root: RootId) -> Result<()> {
        let r = &mut self.roots[root];
        let Some(finished) = r.finished_work.take() else {
            return Ok(());
        };
        let lane = std::mem::replace(&mut r.finished_lane, Lanes::NONE);
        log::debug!("root {root:?}: committing {lane:?} render");

        r.pending_lanes = r.pending_lanes.difference(lane) | r.interleaved_lanes;
        r.interleaved_lanes = Lanes::NONE;
        r.callback_node = None;
        r.callback_priority = Lanes::NONE;
        self.created.clear();

        let unit = &self.tree[finished];
        let effects = unit.flags | unit.subtree_flags;

        if effects.intersects(Flags::PASSIVE_MASK) && !r.passive_scheduled {
            r.passive_scheduled = true;
            self.scheduler
                .schedule(SchedulerPriority::Normal, Task::PassiveEffects(root));
        }

        let mut host_mutations = 0;
        if effects.intersects(Flags::MUTATION_MASK | Flags::PASSIVE_MASK) {
            host_mutations = self.commit_mutation_effects(root, finished)?;
            self.roots[root].current = finished;
            self.commit_layout_effects(finished);
        } else {
            self.roots[root].current = finished;
        }

        self.ensure_root_is_scheduled(root);

        let info = CommitInfo {
            root: RootHandle(root),
            lane,
            effects,
            host_mutations,
            units_rendered: self.units_rendered,
        };
        log::debug!(
            "root {root:?}: committed {} host mutations, effects {:?}",
            info.host_mutations,
            info.effects
        );
        if let Some(observer) = self.observer.as_mut() {
            observer(&info);
        }
        Ok(())
    }

    /// Walks every unit with pending mutation or passive work, children
    /// before parents. Returns how many host mutations were applied.
    fn commit_mutation_effects(&mut self, root: RootId, finished: WorkId) -> Result<usize> {
        let mut mutations = 0;
        let mut next = Some(finished);
        while let Some(n) = next {
            let unit = &self.tree[n];
            if let Some(child) = unit.child
                && unit
                    .subtree_flags
                    .intersects(Flags::MUTATION_MASK | Flags::PASSIVE_MASK)
            {
                next = Some(child);
                continue;
            }

            let mut at = n;
            next = loop {
                mutations += self.commit_mutation_on_unit(root, at)?;
                let unit = &mut self.tree[at];
                unit.subtree_flags &= Flags::LAYOUT_MASK;
                if at == finished {
                    break None;
                }
                if let Some(sibling) = unit.sibling {
                    break Some(sibling);
                }
                match unit.parent {
                    Some(parent) => at = parent,
                    None => break None,
                }
            };
        }
        Ok(mutations)
    }

    fn commit_mutation_on_unit(&mut self, root: RootId, unit: WorkId) -> Result<usize> {
        let flags = self.tree[unit].flags;
        let mut mutations = 0;

        if flags.contains(Flags::PLACEMENT) {
            mutations += self.commit_placement(unit)?;
            self.tree[unit].flags.remove(Flags::PLACEMENT);
        }
        if flags.contains(Flags::UPDATE) {
            mutations += self.commit_update(unit)?;
            self.tree[unit].flags.remove(Flags::UPDATE);
        }
        if flags.contains(Flags::CHILD_DELETION) {
            let deletions = std::mem::take(&mut self.tree[unit].deletions);
            for child in deletions {
                mutations += self.commit_deletion(root, child)?;
            }
            self.tree[unit].flags.remove(Flags::CHILD_DELETION);
        }
        if flags.contains(Flags::PASSIVE_EFFECT) {
            let effects = self.tree[unit].effects.clone();
            self.roots[root].pending_passive.update.extend(effects);
            self.tree[unit].flags.remove(Flags::PASSIVE_EFFECT);
        }
        if flags.contains(Flags::REF)
            && let Some(current) = self.tree[unit].alternate
            && let Some(old) = &self.tree[current].node_ref
        {
            old.detach();
        }
        Ok(mutations)
    }

    fn commit_placement(&mut self, unit: WorkId) -> Result<usize> {
        let Some(parent) = self.host_parent(unit) else {
            log::warn!("placement of {} has no host parent", self.tree[unit].label());
            return Ok(0);
        };
        let before = self.host_sibling(unit);
        self.insert_or_append_placement_node(unit, &parent, before.as_ref())
    }

    fn insert_or_append_placement_node(
        &mut self,
        unit: WorkId,
        parent: &H::Instance,
        before: Option<&H::Instance>,
    ) -> Result<usize> {
        if self.tree[unit].is_host() {
            let Some(instance) = self.tree[unit].state_node.host().cloned() else {
                return Ok(0);
            };
            match before {
                Some(before) => self
                    .host
                    .insert_child_to_container(&instance, parent, before)?,
                None => self.host.append_child_to_container(parent, &instance)?,
            }
            return Ok(1);
        }

        let mut mutations = 0;
        let children: Vec<WorkId> = self.tree.children(unit).collect();
        for child in children {
            mutations += self.insert_or_append_placement_node(child, parent, before)?;
        }
        Ok(mutations)
    }

    /// Host node of the closest host ancestor, or the root container.
    fn host_parent(&self, unit: WorkId) -> Option<H::Instance> {
        let mut parent = self.tree[unit].parent;
        while let Some(p) = parent {
            let node = &self.tree[p];
            match (&node.tag, &node.state_node) {
                (WorkTag::HostComponent, StateNode::Host(instance)) => {
                    return Some(instance.clone());
                }
                (WorkTag::HostRoot, StateNode::Root(root)) => {
                    return self.roots.get(*root).map(|r| r.container.clone());
                }
                _ => parent = node.parent,
            }
        }
        None
    }

    /// First host node after `unit` in document order that is already in
    /// place, i.e. not itself being placed.
    fn host_sibling(&self, unit: WorkId) -> Option<H::Instance> {
        let mut node = unit;
        'siblings: loop {
            while self.tree[node].sibling.is_none() {
                match self.tree[node].parent {
                    Some(parent)
                        if !matches!(
                            self.tree[parent].tag,
                            WorkTag::HostComponent | WorkTag::HostRoot
                        ) =>
                    {
                        node = parent;
                    }
                    _ => return None,
                }
            }
            let sibling = self.tree[node].sibling?;
            node = sibling;

            // Descend to the first host node, skipping subtrees that move.
            while !self.tree[node].is_host() {
                if self.tree[node].flags.contains(Flags::PLACEMENT) {
                    continue 'siblings;
                }
                match self.tree[node].child {
                    Some(child) => node = child,
                    None => continue 'siblings,
                }
            }
            if !self.tree[node].flags.contains(Flags::PLACEMENT) {
                return self.tree[node].state_node.host().cloned();
            }
        }
    }

    fn commit_update(&mut self, unit: WorkId) -> Result<usize> {
        let node = &self.tree[unit];
        let Some(instance) = node.state_node.host() else {
            return Ok(0);
        };
        match node.tag {
            WorkTag::HostText => {
                let text = node.pending_input.text().unwrap_or_default();
                self.host.commit_text_update(instance, text)?;
            }
            WorkTag::HostComponent => {
                let ty = node.host_type().unwrap_or_default();
                let new = node.pending_input.props().cloned().unwrap_or_default();
                let old = node
                    .alternate
                    .and_then(|c| self.tree[c].memoized_input.as_ref())
                    .and_then(|input| input.props())
                    .cloned()
                    .unwrap_or_default();
                self.host.commit_update(instance, ty, &old, &new)?;
            }
            tag => {
                log::warn!("update flag on {tag:?} unit ignored");
                return Ok(0);
            }
        }
        Ok(1)
    }

    /// Removes the host nodes of a deleted subtree, queues its effect
    /// cleanups, clears its refs, and frees its units.
    fn commit_deletion(&mut self, root: RootId, child: WorkId) -> Result<usize> {
        let mut host_nodes: Vec<H::Instance> = Vec::new();
        let mut stack = vec![(child, false)];
        while let Some((id, inside_host)) = stack.pop() {
            let unit = &self.tree[id];
            match unit.tag {
                WorkTag::HostComponent | WorkTag::HostText => {
                    if !inside_host && let Some(instance) = unit.state_node.host() {
                        host_nodes.push(instance.clone());
                    }
                    if let Some(node_ref) = &unit.node_ref {
                        node_ref.detach();
                    }
                }
                WorkTag::FunctionComponent => {
                    for effect in &unit.effects {
                        effect.borrow_mut().tag.remove(HookFlags::HAS_EFFECT);
                    }
                    self.roots[root]
                        .pending_passive
                        .unmount
                        .extend(unit.effects.iter().cloned());
                }
                _ => {}
            }
            let inside = inside_host || unit.is_host();
            let children: Vec<WorkId> = self.tree.children(id).collect();
            stack.extend(children.into_iter().rev().map(|c| (c, inside)));
        }

        let mut mutations = 0;
        if let Some(parent) = self.host_parent(child) {
            for node in &host_nodes {
                self.host.remove_child(node, &parent)?;
                mutations += 1;
            }
        }

        let freed = self.tree.remove_subtree(child);
        log::trace!("freed {freed} units of a deleted subtree");
        Ok(mutations)
    }

    /// Attaches refs of units placed or re-pointed in this commit.
    fn commit_layout_effects(&mut self, finished: WorkId) {
        let mut next = Some(finished);
        while let Some(n) = next {
            let unit = &self.tree[n];
            if let Some(child) = unit.child
                && unit.subtree_flags.intersects(Flags::LAYOUT_MASK)
            {
                next = Some(child);
                continue;
            }

            let mut at = n;
            next = loop {
                let unit = &mut self.tree[at];
                if unit.flags.contains(Flags::REF) {
                    if let (Some(node_ref), Some(instance)) =
                        (&unit.node_ref, unit.state_node.host())
                    {
                        node_ref.attach(Box::new(instance.clone()));
                    }
                    unit.flags.remove(Flags::REF);
                }
                unit.subtree_flags = Flags::NONE;
                if at == finished {
                    break None;
                }
                if let Some(sibling) = unit.sibling {
                    break Some(sibling);
                }
                match unit.parent {
                    Some(parent) => at = parent,
                    None => break None,
                }
            };
        }
    }

    /// Runs pending effect cleanups, then pending effects, for `root`.
    /// Returns whether anything ran; with nothing pending it does nothing.
    pub(crate) fn flush_passive_effects(&mut self, root: RootId) -> Result<bool> {
        let Some(r) = self.roots.get_mut(root) else {
            return Ok(false);
        };
        r.passive_scheduled = false;
        if r.pending_passive.is_empty() {
            return Ok(false);
        }
        let pending = std::mem::take(&mut r.pending_passive);
        log::debug!(
            "root {root:?}: flushing passive effects ({} unmounted, {} updated)",
            pending.unmount.len(),
            pending.update.len()
        );

        for effect in &pending.unmount {
            let destroy = {
                let mut record = effect.borrow_mut();
                record.create = None;
                record.destroy.take()
            };
            if let Some(destroy) = destroy {
                destroy.run();
            }
        }

        for effect in &pending.update {
            let destroy = {
                let mut record = effect.borrow_mut();
                if !record.needs_run() {
                    continue;
                }
                record.destroy.take()
            };
            if let Some(destroy) = destroy {
                destroy.run();
            }
        }

        for effect in &pending.update {
            let create = {
                let mut record = effect.borrow_mut();
                if !record.needs_run() {
                    continue;
                }
                record.tag.remove(HookFlags::HAS_EFFECT);
                record.create.take()
            };
            if let Some(create) = create {
                let destroy = create();
                effect.borrow_mut().destroy = destroy;
            }
        }

        self.process_inbox();
        self.flush_sync_callbacks()?;
        Ok(true)
    }
}
