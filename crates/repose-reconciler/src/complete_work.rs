use crate::element::ElementType;
use crate::error::Result;
use crate::fiber::{PendingInput, StateNode, WorkId, WorkTag};
use crate::flags::Flags;
use crate::host_config::HostConfig;
use crate::work_loop::Reconciler;

impl<H: HostConfig> Reconciler<H> {
    /// Finishes a unit whose children are all complete: creates or diffs
    /// its host node, then folds the children's flags into it.
    pub(crate) fn complete_work(&mut self, wip: WorkId) -> Result<()> {
        log::trace!("complete {}", self.tree[wip].label());
        let unit = &self.tree[wip];
        let current = unit.alternate.filter(|_| unit.state_node.host().is_some());

        match unit.tag {
            WorkTag::HostComponent => match current {
                Some(current) => {
                    let old = self.tree[current]
                        .memoized_input
                        .as_ref()
                        .and_then(PendingInput::props);
                    let new = unit.pending_input.props();
                    let changed = match (old, new) {
                        (Some(old), Some(new)) => old.attrs != new.attrs,
                        (None, None) => false,
                        _ => true,
                    };
                    if changed {
                        self.tree[wip].flags |= Flags::UPDATE;
                    }
                }
                None => {
                    let ty = unit.host_type().unwrap_or_default().to_owned();
                    let props = unit.pending_input.props().cloned().unwrap_or_default();
                    let instance = self.host.create_instance(&ty, &props)?;
                    self.append_all_children(&instance, wip)?;
                    self.tree[wip].state_node = StateNode::Host(instance);
                }
            },
            WorkTag::HostText => {
                let new = unit.pending_input.text().unwrap_or_default().to_owned();
                match current {
                    Some(current) => {
                        let old = self.tree[current]
                            .memoized_input
                            .as_ref()
                            .and_then(PendingInput::text);
                        if old != Some(new.as_str()) {
                            self.tree[wip].flags |= Flags::UPDATE;
                        }
                    }
                    None => {
                        let instance = self.host.create_text_instance(&new)?;
                        self.tree[wip].state_node = StateNode::Host(instance);
                    }
                }
            }
            WorkTag::ContextProvider => {
                if let Some(ElementType::Provider(id)) = unit.ty {
                    self.hooks.contexts.pop(id);
                }
            }
            WorkTag::HostRoot | WorkTag::FunctionComponent | WorkTag::Fragment => {}
        }

        self.bubble_properties(wip);
        Ok(())
    }

    /// Appends the top-level host nodes below `wip` to its fresh instance.
    fn append_all_children(&mut self, parent: &H::Instance, wip: WorkId) -> Result<()> {
        let mut node = self.tree[wip].child;
        'walk: while let Some(n) = node {
            let unit = &self.tree[n];
            if unit.is_host() {
                if let Some(child) = unit.state_node.host() {
                    self.host.append_initial_child(parent, child)?;
                }
            } else if let Some(child) = unit.child {
                node = Some(child);
                continue;
            }

            let mut at = n;
            loop {
                if let Some(sibling) = self.tree[at].sibling {
                    node = Some(sibling);
                    continue 'walk;
                }
                match self.tree[at].parent {
                    Some(parent) if parent != wip => at = parent,
                    _ => break 'walk,
                }
            }
        }
        Ok(())
    }

    fn bubble_properties(&mut self, wip: WorkId) {
        let mut subtree_flags = Flags::NONE;
        let mut child = self.tree[wip].child;
        while let Some(c) = child {
            let unit = &mut self.tree[c];
            subtree_flags |= unit.subtree_flags | unit.flags;
            unit.parent = Some(wip);
            child = unit.sibling;
        }
        self.tree[wip].subtree_flags |= subtree_flags;
    }
}
