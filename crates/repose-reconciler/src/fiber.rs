//! The double-buffered work tree.
//!
//! Both generations of every unit live in one arena. A unit and its
//! `alternate` are the current and in-progress versions of the same logical
//! node; the in-progress twin is created lazily the first time a render
//! touches the node and reused by every later render.

use std::ops::{Index, IndexMut};
use std::rc::Rc;

use slotmap::{SlotMap, new_key_type};
use smallvec::SmallVec;

use crate::effects::EffectRef;
use crate::element::{Element, ElementType, Key, Node, NodeRef, Props};
use crate::flags::Flags;
use crate::hooks::HookCell;
use crate::root::RootId;
use crate::update_queue::{SharedQueue, StateCell};

new_key_type! {
    pub struct WorkId;
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum WorkTag {
    HostRoot,
    HostComponent,
    HostText,
    FunctionComponent,
    Fragment,
    ContextProvider,
}

/// Input a unit renders from.
#[derive(Clone, Debug, Default)]
pub enum PendingInput {
    #[default]
    Empty,
    Props(Rc<Props>),
    Text(Rc<str>),
    /// Child list of a fragment.
    Children(Node),
}

impl PendingInput {
    pub(crate) fn for_element(el: &Element) -> Self {
        match el.ty {
            ElementType::Fragment => PendingInput::Children(el.props.children.clone()),
            _ => PendingInput::Props(el.props.clone()),
        }
    }

    pub fn props(&self) -> Option<&Rc<Props>> {
        match self {
            PendingInput::Props(p) => Some(p),
            _ => None,
        }
    }

    pub fn text(&self) -> Option<&str> {
        match self {
            PendingInput::Text(t) => Some(t),
            _ => None,
        }
    }
}

#[derive(Clone, Debug)]
pub(crate) enum StateNode<I> {
    None,
    Host(I),
    Root(RootId),
}

impl<I> StateNode<I> {
    pub fn host(&self) -> Option<&I> {
        match self {
            StateNode::Host(i) => Some(i),
            _ => None,
        }
    }
}

#[derive(Default)]
pub(crate) enum MemoizedState {
    #[default]
    None,
    Root(StateCell<Node>),
    Hooks(Vec<HookCell>),
}

impl MemoizedState {
    /// The part of the memoized state a fresh in-progress twin starts from.
    /// Hook lists are rebuilt by every render, so they are not carried over.
    fn for_twin(&self) -> MemoizedState {
        match self {
            MemoizedState::Root(cell) => MemoizedState::Root(cell.clone()),
            _ => MemoizedState::None,
        }
    }
}

pub(crate) struct WorkUnit<I> {
    pub tag: WorkTag,
    pub key: Option<Key>,
    pub ty: Option<ElementType>,
    pub node_ref: Option<NodeRef>,

    pub pending_input: PendingInput,
    pub memoized_input: Option<PendingInput>,
    pub memoized_state: MemoizedState,
    /// Root units only: queue of pending root descriptions.
    pub root_queue: Option<SharedQueue<Node>>,
    /// Function components only: effect records of the last render, in
    /// declaration order.
    pub effects: Vec<EffectRef>,

    pub parent: Option<WorkId>,
    pub child: Option<WorkId>,
    pub sibling: Option<WorkId>,
    pub index: usize,

    pub state_node: StateNode<I>,

    pub flags: Flags,
    pub subtree_flags: Flags,
    pub deletions: SmallVec<[WorkId; 2]>,

    pub alternate: Option<WorkId>,
}

impl<I> WorkUnit<I> {
    pub fn new(tag: WorkTag, pending_input: PendingInput, key: Option<Key>) -> Self {
        Self {
            tag,
            key,
            ty: None,
            node_ref: None,
            pending_input,
            memoized_input: None,
            memoized_state: MemoizedState::None,
            root_queue: None,
            effects: Vec::new(),
            parent: None,
            child: None,
            sibling: None,
            index: 0,
            state_node: StateNode::None,
            flags: Flags::NONE,
            subtree_flags: Flags::NONE,
            deletions: SmallVec::new(),
            alternate: None,
        }
    }

    pub fn is_host(&self) -> bool {
        matches!(self.tag, WorkTag::HostComponent | WorkTag::HostText)
    }

    pub fn host_type(&self) -> Option<&str> {
        match &self.ty {
            Some(ElementType::Host(tag)) => Some(tag),
            _ => None,
        }
    }

    /// Short name for logs and inspection.
    pub fn label(&self) -> String {
        match (&self.tag, &self.ty) {
            (WorkTag::HostRoot, _) => "#root".to_owned(),
            (WorkTag::HostText, _) => match &self.pending_input {
                PendingInput::Text(t) => format!("#text {t:?}"),
                _ => "#text".to_owned(),
            },
            (_, Some(ty)) => format!("{ty:?}"),
            (tag, None) => format!("{tag:?}"),
        }
    }
}

pub(crate) struct WorkTree<I> {
    units: SlotMap<WorkId, WorkUnit<I>>,
}

impl<I> Default for WorkTree<I> {
    fn default() -> Self {
        Self {
            units: SlotMap::with_key(),
        }
    }
}

impl<I> Index<WorkId> for WorkTree<I> {
    type Output = WorkUnit<I>;
    fn index(&self, id: WorkId) -> &WorkUnit<I> {
        &self.units[id]
    }
}

impl<I> IndexMut<WorkId> for WorkTree<I> {
    fn index_mut(&mut self, id: WorkId) -> &mut WorkUnit<I> {
        &mut self.units[id]
    }
}

impl<I: Clone> WorkTree<I> {
    pub fn insert(&mut self, unit: WorkUnit<I>) -> WorkId {
        self.units.insert(unit)
    }

    pub fn get(&self, id: WorkId) -> Option<&WorkUnit<I>> {
        self.units.get(id)
    }

    pub fn len(&self) -> usize {
        self.units.len()
    }

    /// Returns the in-progress twin of `current`, allocating it on first
    /// use. The twin takes `input`, starts with no flags or deletions, and
    /// shares the current child list and memoized output.
    pub fn create_work_in_progress(&mut self, current: WorkId, input: PendingInput) -> WorkId {
        let wip = match self[current].alternate {
            Some(wip) => {
                let unit = &mut self[wip];
                unit.pending_input = input;
                unit.flags = Flags::NONE;
                unit.subtree_flags = Flags::NONE;
                unit.deletions.clear();
                wip
            }
            None => {
                let cur = &self[current];
                let mut unit = WorkUnit::new(cur.tag, input, cur.key.clone());
                unit.state_node = cur.state_node.clone();
                unit.alternate = Some(current);
                let wip = self.insert(unit);
                self[current].alternate = Some(wip);
                wip
            }
        };

        let cur = &self[current];
        let ty = cur.ty.clone();
        let node_ref = cur.node_ref.clone();
        let child = cur.child;
        let memoized_input = cur.memoized_input.clone();
        let memoized_state = cur.memoized_state.for_twin();
        let root_queue = cur.root_queue.clone();

        let unit = &mut self[wip];
        unit.ty = ty;
        unit.node_ref = node_ref;
        unit.child = child;
        unit.memoized_input = memoized_input;
        unit.memoized_state = memoized_state;
        unit.root_queue = root_queue;
        wip
    }

    /// Maps an element description to a fresh unit. Unsupported type tags
    /// produce nothing.
    pub fn create_from_element(&mut self, el: &Element, dev_warnings: bool) -> Option<WorkId> {
        let tag = match &el.ty {
            ElementType::Host(_) => WorkTag::HostComponent,
            ElementType::Component(_) => WorkTag::FunctionComponent,
            ElementType::Fragment => WorkTag::Fragment,
            ElementType::Provider(_) => WorkTag::ContextProvider,
            ElementType::Unsupported(tag) => {
                if dev_warnings {
                    log::warn!("unsupported element type `{tag}`; it renders nothing");
                }
                return None;
            }
        };
        let mut unit = WorkUnit::new(tag, PendingInput::for_element(el), el.key.clone());
        unit.ty = Some(el.ty.clone());
        unit.node_ref = el.node_ref.clone();
        Some(self.insert(unit))
    }

    pub fn create_text(&mut self, content: Rc<str>) -> WorkId {
        self.insert(WorkUnit::new(WorkTag::HostText, PendingInput::Text(content), None))
    }

    /// Fragment unit for a list nested inside a child list.
    pub fn create_fragment(&mut self, children: Node) -> WorkId {
        let mut unit = WorkUnit::new(WorkTag::Fragment, PendingInput::Children(children), None);
        unit.ty = Some(ElementType::Fragment);
        self.insert(unit)
    }

    pub fn remove(&mut self, id: WorkId) -> Option<WorkUnit<I>> {
        self.units.remove(id)
    }

    /// Removes `root`, everything below it, and the twins of all of those.
    /// Returns how many units were reclaimed.
    pub fn remove_subtree(&mut self, root: WorkId) -> usize {
        let mut removed = 0;
        let mut stack = vec![root];
        while let Some(id) = stack.pop() {
            let Some(unit) = self.units.remove(id) else {
                continue;
            };
            removed += 1;
            if let Some(child) = unit.child {
                stack.push(child);
            }
            if id != root
                && let Some(sibling) = unit.sibling
            {
                stack.push(sibling);
            }
            if let Some(alt) = unit.alternate
                && self.units.remove(alt).is_some()
            {
                removed += 1;
            }
        }
        removed
    }

    /// Direct children of `id`, in order.
    pub fn children(&self, id: WorkId) -> Children<'_, I> {
        Children {
            tree: self,
            next: self[id].child,
        }
    }
}

pub(crate) struct Children<'a, I> {
    tree: &'a WorkTree<I>,
    next: Option<WorkId>,
}

impl<I> Iterator for Children<'_, I> {
    type Item = WorkId;
    fn next(&mut self) -> Option<WorkId> {
        let id = self.next?;
        self.next = self.tree.units.get(id).and_then(|u| u.sibling);
        Some(id)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::element::h;

    #[test]
    fn twin_is_allocated_once_and_reused() {
        let mut tree: WorkTree<u32> = WorkTree::default();
        let el = h("div").key("a");
        let current = tree.create_from_element(&el, false).unwrap();
        tree[current].state_node = StateNode::Host(7);

        let wip = tree.create_work_in_progress(current, PendingInput::Empty);
        assert_eq!(tree[wip].alternate, Some(current));
        assert_eq!(tree[current].alternate, Some(wip));
        assert_eq!(tree[wip].key, Some(Key::from("a")));
        assert_eq!(tree[wip].state_node.host(), Some(&7));

        tree[wip].flags = Flags::UPDATE;
        tree[wip].deletions.push(current);
        let again = tree.create_work_in_progress(current, PendingInput::Empty);
        assert_eq!(again, wip);
        assert_eq!(tree[again].flags, Flags::NONE);
        assert!(tree[again].deletions.is_empty());
        assert_eq!(tree.len(), 2);
    }

    #[test]
    fn unsupported_element_produces_no_unit() {
        let mut tree: WorkTree<u32> = WorkTree::default();
        let el = Element::unsupported("portal");
        assert!(tree.create_from_element(&el, false).is_none());
        assert_eq!(tree.len(), 0);
    }

    #[test]
    fn remove_subtree_keeps_siblings_of_the_root() {
        let mut tree: WorkTree<u32> = WorkTree::default();
        let parent = tree.create_from_element(&h("ul"), false).unwrap();
        let a = tree.create_text("a".into());
        let b = tree.create_text("b".into());
        let inner = tree.create_text("inner".into());
        tree[parent].child = Some(a);
        tree[a].sibling = Some(b);
        tree[a].child = Some(inner);
        let twin = tree.create_work_in_progress(a, PendingInput::Empty);

        assert_eq!(tree.remove_subtree(a), 3);
        assert!(tree.get(twin).is_none());
        assert!(tree.get(inner).is_none());
        assert!(tree.get(b).is_some());
        assert!(tree.get(parent).is_some());
    }
}
