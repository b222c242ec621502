//! An in-memory host tree for driving the reconciler without a real UI.
//!
//! [`NoopHost`] keeps its nodes in an arena, checks every structural request
//! (a node has at most one parent, removals and insertion anchors must name
//! actual children) and records each mutation as a [`HostOp`]. Tests read
//! the result back with [`NoopHost::to_markup`] and the op log.

use std::collections::BTreeMap;
use std::fmt::Write as _;

use repose_reconciler::{AttrValue, HostConfig, HostError, Props};
use slotmap::{SlotMap, new_key_type};

new_key_type! {
    pub struct NodeId;
}

#[derive(Clone, Debug, PartialEq)]
pub enum NodeKind {
    Container,
    Element {
        ty: String,
        attrs: BTreeMap<String, AttrValue>,
    },
    Text(String),
}

#[derive(Clone, Debug)]
pub struct HostNode {
    pub kind: NodeKind,
    pub parent: Option<NodeId>,
    pub children: Vec<NodeId>,
}

impl HostNode {
    fn new(kind: NodeKind) -> Self {
        Self {
            kind,
            parent: None,
            children: Vec::new(),
        }
    }
}

/// One host mutation, in the order the reconciler requested it.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum HostOp {
    CreateInstance(NodeId),
    CreateText(NodeId),
    AppendInitial { parent: NodeId, child: NodeId },
    Append { container: NodeId, child: NodeId },
    Insert { container: NodeId, child: NodeId, before: NodeId },
    Remove { container: NodeId, child: NodeId },
    SetText(NodeId),
    Update(NodeId),
}

impl HostOp {
    /// Whether this op changed a tree that may be on screen. Building
    /// detached nodes does not count.
    pub fn is_mutation(&self) -> bool {
        !matches!(
            self,
            HostOp::CreateInstance(_) | HostOp::CreateText(_) | HostOp::AppendInitial { .. }
        )
    }
}

#[derive(Default)]
pub struct NoopHost {
    nodes: SlotMap<NodeId, HostNode>,
    ops: Vec<HostOp>,
    microtasks: usize,
}

impl NoopHost {
    pub fn new() -> Self {
        Self::default()
    }

    /// A fresh root container to mount a tree into.
    pub fn create_container(&mut self) -> NodeId {
        self.nodes.insert(HostNode::new(NodeKind::Container))
    }

    pub fn node(&self, id: NodeId) -> Option<&HostNode> {
        self.nodes.get(id)
    }

    pub fn children(&self, id: NodeId) -> &[NodeId] {
        self.nodes.get(id).map_or(&[], |n| n.children.as_slice())
    }

    pub fn ops(&self) -> &[HostOp] {
        &self.ops
    }

    pub fn take_ops(&mut self) -> Vec<HostOp> {
        std::mem::take(&mut self.ops)
    }

    /// How many times the reconciler asked for a microtask.
    pub fn microtasks_requested(&self) -> usize {
        self.microtasks
    }

    /// Serializes the subtree under `id`. Containers render only their
    /// children; attributes are written in name order.
    pub fn to_markup(&self, id: NodeId) -> String {
        let mut out = String::new();
        self.write_markup(id, &mut out);
        out
    }

    fn write_markup(&self, id: NodeId, out: &mut String) {
        let Some(node) = self.nodes.get(id) else {
            return;
        };
        match &node.kind {
            NodeKind::Container => {
                for &child in &node.children {
                    self.write_markup(child, out);
                }
            }
            NodeKind::Element { ty, attrs } => {
                out.push('<');
                out.push_str(ty);
                for (name, value) in attrs {
                    let _ = write!(out, " {name}=\"{value}\"");
                }
                out.push('>');
                for &child in &node.children {
                    self.write_markup(child, out);
                }
                let _ = write!(out, "</{ty}>");
            }
            NodeKind::Text(text) => out.push_str(text),
        }
    }

    /// Short name of a node for logs and error messages.
    pub fn label(&self, id: NodeId) -> String {
        match self.nodes.get(id).map(|n| &n.kind) {
            None => format!("{id:?}"),
            Some(NodeKind::Container) => "#container".to_string(),
            Some(NodeKind::Element { ty, .. }) => format!("<{ty}>"),
            Some(NodeKind::Text(text)) => format!("{text:?}"),
        }
    }

    /// One line per op. Moved and removed nodes are shown with their
    /// current content.
    pub fn describe_ops(&self, ops: &[HostOp]) -> String {
        ops.iter()
            .map(|op| match *op {
                HostOp::CreateInstance(id) | HostOp::CreateText(id) => {
                    format!("create {}", self.label(id))
                }
                HostOp::AppendInitial { parent, child } => {
                    format!("append-initial {} to {}", self.label(child), self.label(parent))
                }
                HostOp::Append { container, child } => format!(
                    "append {} to {}",
                    self.to_markup(child),
                    self.label(container)
                ),
                HostOp::Insert {
                    container,
                    child,
                    before,
                } => format!(
                    "insert {} before {} in {}",
                    self.to_markup(child),
                    self.to_markup(before),
                    self.label(container)
                ),
                HostOp::Remove { container, child } => format!(
                    "remove {} from {}",
                    self.to_markup(child),
                    self.label(container)
                ),
                HostOp::SetText(id) => format!("set-text {}", self.label(id)),
                HostOp::Update(id) => format!("update {}", self.to_markup(id)),
            })
            .collect::<Vec<_>>()
            .join("\n")
    }

    fn get_mut(&mut self, id: NodeId) -> Result<&mut HostNode, HostError> {
        self.nodes
            .get_mut(id)
            .ok_or_else(|| HostError::UnknownInstance(format!("{id:?}")))
    }

    fn ensure_exists(&self, id: NodeId) -> Result<(), HostError> {
        if self.nodes.contains_key(id) {
            Ok(())
        } else {
            Err(HostError::UnknownInstance(format!("{id:?}")))
        }
    }

    /// Detaches `child` from `parent` if it is there, so it can be placed
    /// again. A child of any other parent is an error.
    fn take_for_placement(&mut self, parent: NodeId, child: NodeId) -> Result<(), HostError> {
        self.ensure_exists(parent)?;
        match self.get_mut(child)?.parent {
            None => Ok(()),
            Some(p) if p == parent => {
                self.get_mut(parent)?.children.retain(|&c| c != child);
                Ok(())
            }
            Some(_) => Err(HostError::AlreadyParented {
                child: self.label(child),
            }),
        }
    }

    fn append(&mut self, parent: NodeId, child: NodeId) -> Result<(), HostError> {
        self.take_for_placement(parent, child)?;
        self.get_mut(parent)?.children.push(child);
        self.get_mut(child)?.parent = Some(parent);
        Ok(())
    }
}

impl HostConfig for NoopHost {
    type Instance = NodeId;

    fn create_instance(&mut self, ty: &str, props: &Props) -> Result<NodeId, HostError> {
        let id = self.nodes.insert(HostNode::new(NodeKind::Element {
            ty: ty.to_string(),
            attrs: props.attrs.clone(),
        }));
        self.ops.push(HostOp::CreateInstance(id));
        Ok(id)
    }

    fn create_text_instance(&mut self, content: &str) -> Result<NodeId, HostError> {
        let id = self
            .nodes
            .insert(HostNode::new(NodeKind::Text(content.to_string())));
        self.ops.push(HostOp::CreateText(id));
        Ok(id)
    }

    fn append_initial_child(&mut self, parent: &NodeId, child: &NodeId) -> Result<(), HostError> {
        self.append(*parent, *child)?;
        self.ops.push(HostOp::AppendInitial {
            parent: *parent,
            child: *child,
        });
        Ok(())
    }

    fn append_child_to_container(
        &mut self,
        container: &NodeId,
        child: &NodeId,
    ) -> Result<(), HostError> {
        self.append(*container, *child)?;
        self.ops.push(HostOp::Append {
            container: *container,
            child: *child,
        });
        Ok(())
    }

    fn insert_child_to_container(
        &mut self,
        child: &NodeId,
        container: &NodeId,
        before: &NodeId,
    ) -> Result<(), HostError> {
        let (child, container, before) = (*child, *container, *before);
        if !self.children(container).contains(&before) {
            return Err(HostError::MissingBefore {
                before: self.label(before),
                parent: self.label(container),
            });
        }
        self.take_for_placement(container, child)?;
        let node = self.get_mut(container)?;
        let index = node
            .children
            .iter()
            .position(|&c| c == before)
            .unwrap_or(node.children.len());
        node.children.insert(index, child);
        self.get_mut(child)?.parent = Some(container);
        self.ops.push(HostOp::Insert {
            container,
            child,
            before,
        });
        Ok(())
    }

    fn remove_child(&mut self, child: &NodeId, container: &NodeId) -> Result<(), HostError> {
        let (child, container) = (*child, *container);
        if !self.children(container).contains(&child) {
            return Err(HostError::NotAChild {
                child: self.label(child),
                parent: self.label(container),
            });
        }
        self.get_mut(container)?.children.retain(|&c| c != child);
        self.get_mut(child)?.parent = None;
        self.ops.push(HostOp::Remove { container, child });
        Ok(())
    }

    fn commit_text_update(&mut self, instance: &NodeId, content: &str) -> Result<(), HostError> {
        let label = self.label(*instance);
        match &mut self.get_mut(*instance)?.kind {
            NodeKind::Text(text) => {
                *text = content.to_string();
            }
            _ => return Err(HostError::Other(format!("{label} is not a text node"))),
        }
        self.ops.push(HostOp::SetText(*instance));
        Ok(())
    }

    fn commit_update(
        &mut self,
        instance: &NodeId,
        ty: &str,
        _old_props: &Props,
        new_props: &Props,
    ) -> Result<(), HostError> {
        let label = self.label(*instance);
        match &mut self.get_mut(*instance)?.kind {
            NodeKind::Element { ty: current, attrs } if current == ty => {
                *attrs = new_props.attrs.clone();
            }
            _ => return Err(HostError::Other(format!("{label} is not a <{ty}> element"))),
        }
        self.ops.push(HostOp::Update(*instance));
        Ok(())
    }

    fn schedule_microtask(&mut self) {
        log::trace!("microtask requested");
        self.microtasks += 1;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn element(host: &mut NoopHost, ty: &str) -> NodeId {
        host.create_instance(ty, &Props::default()).unwrap()
    }

    #[test]
    fn builds_and_serializes_a_tree() {
        let mut host = NoopHost::new();
        let root = host.create_container();
        let div = host
            .create_instance("div", &{
                let mut p = Props::default();
                p.attrs.insert("id".into(), "a".into());
                p
            })
            .unwrap();
        let one = host.create_text_instance("1").unwrap();
        let span = element(&mut host, "span");
        let x = host.create_text_instance("x").unwrap();
        host.append_initial_child(&span, &x).unwrap();
        host.append_initial_child(&div, &one).unwrap();
        host.append_initial_child(&div, &span).unwrap();
        host.append_child_to_container(&root, &div).unwrap();

        assert_eq!(host.to_markup(root), r#"<div id="a">1<span>x</span></div>"#);
        assert_eq!(host.ops().iter().filter(|op| op.is_mutation()).count(), 1);
    }

    #[test]
    fn appending_an_existing_child_moves_it() {
        let mut host = NoopHost::new();
        let root = host.create_container();
        let a = host.create_text_instance("a").unwrap();
        let b = host.create_text_instance("b").unwrap();
        host.append_child_to_container(&root, &a).unwrap();
        host.append_child_to_container(&root, &b).unwrap();
        host.append_child_to_container(&root, &a).unwrap();
        assert_eq!(host.to_markup(root), "ba");
        assert_eq!(host.children(root).len(), 2);
    }

    #[test]
    fn insert_moves_before_anchor() {
        let mut host = NoopHost::new();
        let root = host.create_container();
        let [a, b, c] = ["a", "b", "c"].map(|t| host.create_text_instance(t).unwrap());
        for n in [a, b, c] {
            host.append_child_to_container(&root, &n).unwrap();
        }
        host.insert_child_to_container(&c, &root, &a).unwrap();
        assert_eq!(host.to_markup(root), "cab");
        host.insert_child_to_container(&a, &root, &b).unwrap();
        assert_eq!(host.to_markup(root), "cab");
    }

    #[test]
    fn structural_errors() {
        let mut host = NoopHost::new();
        let first = host.create_container();
        let second = host.create_container();
        let node = element(&mut host, "p");
        let stray = element(&mut host, "i");
        host.append_child_to_container(&first, &node).unwrap();

        assert!(matches!(
            host.append_child_to_container(&second, &node),
            Err(HostError::AlreadyParented { .. })
        ));
        assert!(matches!(
            host.remove_child(&stray, &first),
            Err(HostError::NotAChild { .. })
        ));
        assert!(matches!(
            host.insert_child_to_container(&stray, &first, &stray),
            Err(HostError::MissingBefore { .. })
        ));
        assert!(matches!(
            host.commit_text_update(&node, "x"),
            Err(HostError::Other(_))
        ));
    }

    #[test]
    fn remove_detaches() {
        let mut host = NoopHost::new();
        let root = host.create_container();
        let node = element(&mut host, "p");
        host.append_child_to_container(&root, &node).unwrap();
        host.remove_child(&node, &root).unwrap();
        assert_eq!(host.to_markup(root), "");
        assert_eq!(host.node(node).and_then(|n| n.parent), None);
        // Detached nodes can be placed again.
        host.append_child_to_container(&root, &node).unwrap();
        assert_eq!(host.to_markup(root), "<p></p>");
    }

    #[test]
    fn describes_ops() {
        let mut host = NoopHost::new();
        let root = host.create_container();
        let t = host.create_text_instance("hi").unwrap();
        host.append_child_to_container(&root, &t).unwrap();
        host.commit_text_update(&t, "yo").unwrap();
        let ops = host.take_ops();
        insta::assert_snapshot!(host.describe_ops(&ops), @r#"
        create "yo"
        append yo to #container
        set-text "yo"
        "#);
        assert!(host.ops().is_empty());
    }

    #[test]
    fn counts_microtask_requests() {
        let mut host = NoopHost::new();
        host.schedule_microtask();
        host.schedule_microtask();
        assert_eq!(host.microtasks_requested(), 2);
    }
}
