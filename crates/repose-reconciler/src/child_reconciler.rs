//! Matches a unit's previous children against the children it just produced.

use std::collections::HashMap;
use std::rc::Rc;

use crate::config::ListDiffStrategy;
use crate::element::{Element, Key, Node};
use crate::fiber::{PendingInput, WorkId, WorkTag, WorkTree};
use crate::flags::Flags;

/// Lookup key for a previous child in a list diff.
#[derive(Clone, Debug, PartialEq, Eq, Hash)]
enum ChildSlot {
    Key(Key),
    Index(usize),
}

pub(crate) struct ChildReconciler<'a, I> {
    pub tree: &'a mut WorkTree<I>,
    /// Units allocated by the current render, released if it is discarded.
    pub created: &'a mut Vec<WorkId>,
    /// `false` while mounting a fresh subtree: no placements or deletions
    /// are recorded since everything below is inserted at once.
    pub track_effects: bool,
    pub strategy: ListDiffStrategy,
    pub dev_warnings: bool,
}

impl<I: Clone> ChildReconciler<'_, I> {
    /// Builds `parent`'s new child list and returns its first child.
    pub fn reconcile(
        &mut self,
        parent: WorkId,
        current_first: Option<WorkId>,
        new_child: &Node,
    ) -> Option<WorkId> {
        match new_child {
            Node::Element(el) => {
                let unit = self.reconcile_single_element(parent, current_first, el)?;
                Some(self.place_single_child(unit))
            }
            Node::Text(content) => {
                let unit = self.reconcile_single_text(parent, current_first, content);
                Some(self.place_single_child(unit))
            }
            Node::List(items) => self.reconcile_children_array(parent, current_first, items),
            Node::Empty => {
                self.delete_remaining_children(parent, current_first);
                None
            }
        }
    }

    fn delete_child(&mut self, parent: WorkId, child: WorkId) {
        if !self.track_effects {
            return;
        }
        let unit = &mut self.tree[parent];
        unit.deletions.push(child);
        unit.flags |= Flags::CHILD_DELETION;
    }

    fn delete_remaining_children(&mut self, parent: WorkId, mut child: Option<WorkId>) {
        if !self.track_effects {
            return;
        }
        while let Some(c) = child {
            child = self.tree[c].sibling;
            self.delete_child(parent, c);
        }
    }

    fn use_fiber(&mut self, current: WorkId, input: PendingInput) -> WorkId {
        let wip = self.tree.create_work_in_progress(current, input);
        let unit = &mut self.tree[wip];
        unit.index = 0;
        unit.sibling = None;
        wip
    }

    fn reuse_for_element(&mut self, current: WorkId, parent: WorkId, el: &Element) -> WorkId {
        let wip = self.use_fiber(current, PendingInput::for_element(el));
        let unit = &mut self.tree[wip];
        unit.node_ref = el.node_ref.clone();
        unit.parent = Some(parent);
        wip
    }

    fn create_element(&mut self, parent: WorkId, el: &Element) -> Option<WorkId> {
        let unit = self.tree.create_from_element(el, self.dev_warnings)?;
        self.tree[unit].parent = Some(parent);
        self.created.push(unit);
        Some(unit)
    }

    fn create_text(&mut self, parent: WorkId, content: &Rc<str>) -> WorkId {
        let unit = self.tree.create_text(content.clone());
        self.tree[unit].parent = Some(parent);
        self.created.push(unit);
        unit
    }

    fn place_single_child(&mut self, unit: WorkId) -> WorkId {
        if self.track_effects && self.tree[unit].alternate.is_none() {
            self.tree[unit].flags |= Flags::PLACEMENT;
        }
        unit
    }

    fn reconcile_single_element(
        &mut self,
        parent: WorkId,
        mut current: Option<WorkId>,
        el: &Element,
    ) -> Option<WorkId> {
        while let Some(c) = current {
            let unit = &self.tree[c];
            if unit.key == el.key {
                if unit.tag != WorkTag::HostText && unit.ty.as_ref() == Some(&el.ty) {
                    let sibling = unit.sibling;
                    let existing = self.reuse_for_element(c, parent, el);
                    self.delete_remaining_children(parent, sibling);
                    return Some(existing);
                }
                // Same key, different type: nothing after it can match.
                self.delete_remaining_children(parent, Some(c));
                break;
            }
            let next = unit.sibling;
            self.delete_child(parent, c);
            current = next;
        }
        self.create_element(parent, el)
    }

    fn reconcile_single_text(
        &mut self,
        parent: WorkId,
        mut current: Option<WorkId>,
        content: &Rc<str>,
    ) -> WorkId {
        while let Some(c) = current {
            let unit = &self.tree[c];
            let next = unit.sibling;
            if unit.tag == WorkTag::HostText {
                let existing = self.use_fiber(c, PendingInput::Text(content.clone()));
                self.tree[existing].parent = Some(parent);
                self.delete_remaining_children(parent, next);
                return existing;
            }
            self.delete_child(parent, c);
            current = next;
        }
        self.create_text(parent, content)
    }

    fn reconcile_children_array(
        &mut self,
        parent: WorkId,
        current_first: Option<WorkId>,
        items: &[Node],
    ) -> Option<WorkId> {
        let mut existing: HashMap<ChildSlot, WorkId> = HashMap::new();
        let mut cur = current_first;
        while let Some(c) = cur {
            let unit = &self.tree[c];
            let slot = match &unit.key {
                Some(key) => ChildSlot::Key(key.clone()),
                None => ChildSlot::Index(unit.index),
            };
            cur = unit.sibling;
            if let Some(displaced) = existing.insert(slot, c) {
                if self.dev_warnings {
                    log::warn!(
                        "duplicate child key {:?}; the earlier sibling is removed",
                        self.tree[displaced].key
                    );
                }
                self.delete_child(parent, displaced);
            }
        }

        let mut first_new: Option<WorkId> = None;
        let mut last_new: Option<WorkId> = None;
        let mut last_placed_index = 0;
        // (new unit, previous position) of every reused child, in new order.
        let mut reused: Vec<(WorkId, usize)> = Vec::new();

        for (i, item) in items.iter().enumerate() {
            let Some(unit) = self.update_from_map(parent, &mut existing, i, item) else {
                continue;
            };
            self.tree[unit].index = i;
            self.tree[unit].parent = Some(parent);

            match last_new {
                Some(last) => self.tree[last].sibling = Some(unit),
                None => first_new = Some(unit),
            }
            last_new = Some(unit);

            if !self.track_effects {
                continue;
            }
            match self.tree[unit].alternate {
                Some(before) => {
                    let old_index = self.tree[before].index;
                    match self.strategy {
                        ListDiffStrategy::Greedy => {
                            if old_index < last_placed_index {
                                self.tree[unit].flags |= Flags::PLACEMENT;
                            } else {
                                last_placed_index = old_index;
                            }
                        }
                        ListDiffStrategy::MinimalMoves => reused.push((unit, old_index)),
                    }
                }
                None => self.tree[unit].flags |= Flags::PLACEMENT,
            }
        }

        if self.track_effects && self.strategy == ListDiffStrategy::MinimalMoves {
            let old: Vec<usize> = reused.iter().map(|&(_, i)| i).collect();
            let stays = longest_increasing_run(&old);
            for (&(unit, _), stays) in reused.iter().zip(stays) {
                if !stays {
                    self.tree[unit].flags |= Flags::PLACEMENT;
                }
            }
        }

        let mut leftovers: Vec<WorkId> = existing.into_values().collect();
        leftovers.sort_by_key(|&c| self.tree[c].index);
        for c in leftovers {
            self.delete_child(parent, c);
        }

        first_new
    }

    fn update_from_map(
        &mut self,
        parent: WorkId,
        existing: &mut HashMap<ChildSlot, WorkId>,
        index: usize,
        item: &Node,
    ) -> Option<WorkId> {
        match item {
            Node::Text(content) => {
                let slot = ChildSlot::Index(index);
                if let Some(&before) = existing.get(&slot)
                    && self.tree[before].tag == WorkTag::HostText
                {
                    existing.remove(&slot);
                    return Some(self.use_fiber(before, PendingInput::Text(content.clone())));
                }
                Some(self.create_text(parent, content))
            }
            Node::Element(el) => {
                let slot = match &el.key {
                    Some(key) => ChildSlot::Key(key.clone()),
                    None => ChildSlot::Index(index),
                };
                if let Some(&before) = existing.get(&slot) {
                    let unit = &self.tree[before];
                    if unit.tag != WorkTag::HostText && unit.ty.as_ref() == Some(&el.ty) {
                        existing.remove(&slot);
                        return Some(self.reuse_for_element(before, parent, el));
                    }
                }
                self.create_element(parent, el)
            }
            Node::List(children) => {
                let slot = ChildSlot::Index(index);
                let input = PendingInput::Children(Node::List(children.clone()));
                if let Some(&before) = existing.get(&slot)
                    && self.tree[before].tag == WorkTag::Fragment
                {
                    existing.remove(&slot);
                    return Some(self.use_fiber(before, input));
                }
                let unit = self.tree.create_fragment(Node::List(children.clone()));
                self.tree[unit].parent = Some(parent);
                self.created.push(unit);
                Some(unit)
            }
            Node::Empty => None,
        }
    }
}

/// Marks the members of one longest strictly increasing subsequence of
/// `seq`. Reused children on that subsequence keep their relative order and
/// need no move.
pub(crate) fn longest_increasing_run(seq: &[usize]) -> Vec<bool> {
    // tails[k]: position in `seq` of the smallest tail of a run of length k+1.
    let mut tails: Vec<usize> = Vec::with_capacity(seq.len());
    let mut prev: Vec<Option<usize>> = vec![None; seq.len()];

    for (i, &value) in seq.iter().enumerate() {
        let k = tails.partition_point(|&t| seq[t] < value);
        if k > 0 {
            prev[i] = Some(tails[k - 1]);
        }
        if k == tails.len() {
            tails.push(i);
        } else {
            tails[k] = i;
        }
    }

    let mut keep = vec![false; seq.len()];
    let mut at = tails.last().copied();
    while let Some(i) = at {
        keep[i] = true;
        at = prev[i];
    }
    keep
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::element::h;
    use crate::fiber::WorkUnit;

    struct Fixture {
        tree: WorkTree<u32>,
        created: Vec<WorkId>,
        parent: WorkId,
    }

    impl Fixture {
        fn new() -> Self {
            let mut tree = WorkTree::default();
            let parent = tree.insert(WorkUnit::new(WorkTag::HostRoot, PendingInput::Empty, None));
            Self {
                tree,
                created: Vec::new(),
                parent,
            }
        }

        fn reconcile(
            &mut self,
            current_first: Option<WorkId>,
            node: &Node,
            track_effects: bool,
            strategy: ListDiffStrategy,
        ) -> Option<WorkId> {
            ChildReconciler {
                tree: &mut self.tree,
                created: &mut self.created,
                track_effects,
                strategy,
                dev_warnings: false,
            }
            .reconcile(self.parent, current_first, node)
        }

        /// Mounts `node` and returns the first child as if it had been
        /// committed.
        fn mount(&mut self, node: &Node) -> Option<WorkId> {
            self.reconcile(None, node, false, ListDiffStrategy::default())
        }

        fn siblings(&self, first: Option<WorkId>) -> Vec<WorkId> {
            let mut out = Vec::new();
            let mut at = first;
            while let Some(id) = at {
                out.push(id);
                at = self.tree[id].sibling;
            }
            out
        }
    }

    fn keyed(keys: &[&str]) -> Node {
        keys.iter().map(|k| Node::from(h("li").key(*k))).collect()
    }

    fn placed(fx: &Fixture, units: &[WorkId]) -> Vec<String> {
        units
            .iter()
            .filter(|&&u| fx.tree[u].flags.contains(Flags::PLACEMENT))
            .map(|&u| fx.tree[u].key.as_ref().map(|k| k.to_string()).unwrap_or_default())
            .collect()
    }

    #[test]
    fn mount_records_no_effects() {
        let mut fx = Fixture::new();
        let first = fx.mount(&keyed(&["1", "2", "3"]));
        let units = fx.siblings(first);
        assert_eq!(units.len(), 3);
        assert!(units.iter().all(|&u| fx.tree[u].flags.is_empty()));
        assert!(fx.tree[fx.parent].deletions.is_empty());
        assert_eq!(fx.created.len(), 3);
    }

    #[test]
    fn moving_last_to_front_places_only_that_child() {
        let mut fx = Fixture::new();
        let first = fx.mount(&keyed(&["1", "2", "3"]));
        let next = fx.reconcile(
            first,
            &keyed(&["3", "1", "2"]),
            true,
            ListDiffStrategy::MinimalMoves,
        );
        let units = fx.siblings(next);
        assert_eq!(placed(&fx, &units), vec!["3"]);
        assert!(units.iter().all(|&u| fx.tree[u].alternate.is_some()));
        assert!(fx.tree[fx.parent].deletions.is_empty());
    }

    #[test]
    fn greedy_strategy_moves_everything_after_the_first_disorder() {
        let mut fx = Fixture::new();
        let first = fx.mount(&keyed(&["1", "2", "3"]));
        let next = fx.reconcile(first, &keyed(&["3", "1", "2"]), true, ListDiffStrategy::Greedy);
        let units = fx.siblings(next);
        assert_eq!(placed(&fx, &units), vec!["1", "2"]);
    }

    #[test]
    fn removed_key_is_deleted_and_survivor_untouched() {
        let mut fx = Fixture::new();
        let first = fx.mount(&keyed(&["1", "2"]));
        let old = fx.siblings(first);
        let next = fx.reconcile(first, &keyed(&["2"]), true, ListDiffStrategy::MinimalMoves);
        let units = fx.siblings(next);
        assert_eq!(units.len(), 1);
        assert_eq!(fx.tree[units[0]].alternate, Some(old[1]));
        assert!(fx.tree[units[0]].flags.is_empty());
        let parent = &fx.tree[fx.parent];
        assert_eq!(parent.deletions.as_slice(), &[old[0]]);
        assert!(parent.flags.contains(Flags::CHILD_DELETION));
    }

    #[test]
    fn single_child_with_changed_type_is_recreated() {
        let mut fx = Fixture::new();
        let first = fx.mount(&h("div").into());
        let next = fx.reconcile(first, &h("span").into(), true, ListDiffStrategy::default());
        let unit = next.unwrap();
        assert!(fx.tree[unit].alternate.is_none());
        assert!(fx.tree[unit].flags.contains(Flags::PLACEMENT));
        assert_eq!(fx.tree[fx.parent].deletions.as_slice(), &[first.unwrap()]);
    }

    #[test]
    fn single_element_deletes_non_matching_siblings() {
        let mut fx = Fixture::new();
        let first = fx.mount(&keyed(&["a", "b", "c"]));
        let old = fx.siblings(first);
        let next = fx.reconcile(first, &h("li").key("b").into(), true, ListDiffStrategy::default());
        assert_eq!(fx.tree[next.unwrap()].alternate, Some(old[1]));
        assert_eq!(fx.tree[fx.parent].deletions.as_slice(), &[old[0], old[2]]);
    }

    #[test]
    fn text_is_reused_by_kind() {
        let mut fx = Fixture::new();
        let first = fx.mount(&Node::from("0"));
        let next = fx.reconcile(first, &Node::from("1"), true, ListDiffStrategy::default());
        let unit = next.unwrap();
        assert_eq!(fx.tree[unit].alternate, first);
        assert!(fx.tree[unit].flags.is_empty());
        assert_eq!(fx.tree[unit].pending_input.text(), Some("1"));
    }

    #[test]
    fn nested_list_becomes_fragment() {
        let mut fx = Fixture::new();
        let node = Node::List(vec![h("a").into(), keyed(&["x", "y"])]);
        let first = fx.mount(&node);
        let units = fx.siblings(first);
        assert_eq!(units.len(), 2);
        assert_eq!(fx.tree[units[1]].tag, WorkTag::Fragment);

        let next = fx.reconcile(first, &node, true, ListDiffStrategy::default());
        let again = fx.siblings(next);
        assert_eq!(fx.tree[again[1]].alternate, Some(units[1]));
        assert!(again.iter().all(|&u| fx.tree[u].flags.is_empty()));
    }

    #[test]
    fn empty_deletes_all_previous_children() {
        let mut fx = Fixture::new();
        let first = fx.mount(&keyed(&["1", "2"]));
        assert!(fx.reconcile(first, &Node::Empty, true, ListDiffStrategy::default()).is_none());
        assert_eq!(fx.tree[fx.parent].deletions.len(), 2);
    }

    #[test]
    fn increasing_run_prefers_longest() {
        assert_eq!(longest_increasing_run(&[2, 0, 1]), vec![false, true, true]);
        assert_eq!(longest_increasing_run(&[0, 1, 2]), vec![true, true, true]);
        assert_eq!(longest_increasing_run(&[1, 2, 0]), vec![true, true, false]);
        assert!(longest_increasing_run(&[]).is_empty());
    }
}
