//! Declarative descriptions handed to the reconciler.
//!
//! A [`Node`] is what a component returns and what a root renders: nothing,
//! a piece of text, one [`Element`], or an ordered list of nodes. Elements are
//! cheap to clone; their props sit behind an `Rc`.

use std::any::Any;
use std::cell::RefCell;
use std::collections::BTreeMap;
use std::fmt;
use std::rc::Rc;

use crate::context::{Context, ContextId};
use crate::error::Result;
use crate::hooks::Hooks;

pub type RenderFn = dyn Fn(&mut Hooks, &Props) -> Result<Node>;

/// A function component. Identity is the allocation of its render function:
/// build a `Component` once and clone it, otherwise every render sees a new
/// type and remounts the subtree.
#[derive(Clone)]
pub struct Component {
    name: Rc<str>,
    render: Rc<RenderFn>,
}

impl Component {
    pub fn new(
        name: impl Into<Rc<str>>,
        render: impl Fn(&mut Hooks, &Props) -> Result<Node> + 'static,
    ) -> Self {
        Self {
            name: name.into(),
            render: Rc::new(render),
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub(crate) fn name_rc(&self) -> Rc<str> {
        self.name.clone()
    }

    /// An element rendering this component with empty props.
    pub fn element(&self) -> Element {
        Element::component(self)
    }

    pub(crate) fn render(&self, hooks: &mut Hooks, props: &Props) -> Result<Node> {
        (self.render)(hooks, props)
    }
}

impl PartialEq for Component {
    fn eq(&self, other: &Self) -> bool {
        Rc::ptr_eq(&self.render, &other.render)
    }
}

impl fmt::Debug for Component {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Component({})", self.name)
    }
}

#[derive(Clone)]
pub enum ElementType {
    /// A host element such as `"div"`.
    Host(Rc<str>),
    Component(Component),
    Fragment,
    Provider(ContextId),
    /// A type tag the reconciler has no work-unit kind for. Reported in
    /// development mode and otherwise ignored.
    Unsupported(Rc<str>),
}

impl PartialEq for ElementType {
    fn eq(&self, other: &Self) -> bool {
        match (self, other) {
            (ElementType::Host(a), ElementType::Host(b)) => a == b,
            (ElementType::Component(a), ElementType::Component(b)) => a == b,
            (ElementType::Fragment, ElementType::Fragment) => true,
            (ElementType::Provider(a), ElementType::Provider(b)) => a == b,
            (ElementType::Unsupported(a), ElementType::Unsupported(b)) => a == b,
            _ => false,
        }
    }
}

impl fmt::Debug for ElementType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ElementType::Host(tag) => write!(f, "{tag}"),
            ElementType::Component(c) => write!(f, "{}", c.name()),
            ElementType::Fragment => write!(f, "Fragment"),
            ElementType::Provider(id) => write!(f, "Provider({})", id.0),
            ElementType::Unsupported(tag) => write!(f, "Unsupported({tag})"),
        }
    }
}

#[derive(Clone, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct Key(Rc<str>);

impl Key {
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for Key {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for Key {
    fn from(s: &str) -> Self {
        Key(s.into())
    }
}

impl From<String> for Key {
    fn from(s: String) -> Self {
        Key(s.into())
    }
}

macro_rules! key_from_int {
    ($($t:ty),*) => {
        $(impl From<$t> for Key {
            fn from(n: $t) -> Self {
                Key(n.to_string().into())
            }
        })*
    };
}
key_from_int!(i32, i64, u32, u64, usize);

#[derive(Clone, Debug)]
pub enum AttrValue {
    Str(Rc<str>),
    Int(i64),
    Float(f64),
    Bool(bool),
}

/// Floats compare by bit pattern, so an unchanged `NaN` is equal to itself.
impl PartialEq for AttrValue {
    fn eq(&self, other: &Self) -> bool {
        match (self, other) {
            (AttrValue::Str(a), AttrValue::Str(b)) => a == b,
            (AttrValue::Int(a), AttrValue::Int(b)) => a == b,
            (AttrValue::Float(a), AttrValue::Float(b)) => a.to_bits() == b.to_bits(),
            (AttrValue::Bool(a), AttrValue::Bool(b)) => a == b,
            _ => false,
        }
    }
}

impl Eq for AttrValue {}

impl AttrValue {
    pub fn as_str(&self) -> Option<&str> {
        match self {
            AttrValue::Str(s) => Some(s),
            _ => None,
        }
    }

    pub fn as_int(&self) -> Option<i64> {
        match self {
            AttrValue::Int(n) => Some(*n),
            _ => None,
        }
    }

    pub fn as_bool(&self) -> Option<bool> {
        match self {
            AttrValue::Bool(b) => Some(*b),
            _ => None,
        }
    }
}

impl fmt::Display for AttrValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            AttrValue::Str(s) => f.write_str(s),
            AttrValue::Int(n) => write!(f, "{n}"),
            AttrValue::Float(x) => write!(f, "{x}"),
            AttrValue::Bool(b) => write!(f, "{b}"),
        }
    }
}

impl From<&str> for AttrValue {
    fn from(s: &str) -> Self {
        AttrValue::Str(s.into())
    }
}
impl From<String> for AttrValue {
    fn from(s: String) -> Self {
        AttrValue::Str(s.into())
    }
}
impl From<i64> for AttrValue {
    fn from(n: i64) -> Self {
        AttrValue::Int(n)
    }
}
impl From<i32> for AttrValue {
    fn from(n: i32) -> Self {
        AttrValue::Int(n.into())
    }
}
impl From<f64> for AttrValue {
    fn from(x: f64) -> Self {
        AttrValue::Float(x)
    }
}
impl From<bool> for AttrValue {
    fn from(b: bool) -> Self {
        AttrValue::Bool(b)
    }
}

/// Input of an element: host attributes, children, and for providers the
/// provided value.
#[derive(Clone, Default)]
pub struct Props {
    pub attrs: BTreeMap<String, AttrValue>,
    pub children: Node,
    pub value: Option<Rc<dyn Any>>,
}

impl Props {
    pub fn get(&self, name: &str) -> Option<&AttrValue> {
        self.attrs.get(name)
    }

    pub fn get_str(&self, name: &str) -> Option<&str> {
        self.get(name).and_then(AttrValue::as_str)
    }

    pub fn get_int(&self, name: &str) -> Option<i64> {
        self.get(name).and_then(AttrValue::as_int)
    }

    pub fn get_bool(&self, name: &str) -> Option<bool> {
        self.get(name).and_then(AttrValue::as_bool)
    }
}

impl fmt::Debug for Props {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Props")
            .field("attrs", &self.attrs)
            .field("children", &self.children)
            .field("value", &self.value.as_ref().map(|_| "<value>"))
            .finish()
    }
}

/// Slot filled with the host instance of the element it is attached to once
/// that element is committed, and emptied when it is removed.
#[derive(Clone, Default)]
pub struct NodeRef(Rc<RefCell<Option<Box<dyn Any>>>>);

impl NodeRef {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn get<T: Clone + 'static>(&self) -> Option<T> {
        self.0
            .borrow()
            .as_ref()
            .and_then(|b| b.downcast_ref::<T>())
            .cloned()
    }

    pub fn is_attached(&self) -> bool {
        self.0.borrow().is_some()
    }

    pub fn ptr_eq(&self, other: &NodeRef) -> bool {
        Rc::ptr_eq(&self.0, &other.0)
    }

    pub(crate) fn attach(&self, instance: Box<dyn Any>) {
        *self.0.borrow_mut() = Some(instance);
    }

    pub(crate) fn detach(&self) {
        self.0.borrow_mut().take();
    }
}

impl fmt::Debug for NodeRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_tuple("NodeRef").field(&self.is_attached()).finish()
    }
}

#[derive(Clone, Debug)]
pub struct Element {
    pub ty: ElementType,
    pub key: Option<Key>,
    pub node_ref: Option<NodeRef>,
    pub props: Rc<Props>,
}

impl Element {
    pub fn new(ty: ElementType) -> Self {
        Self {
            ty,
            key: None,
            node_ref: None,
            props: Rc::new(Props::default()),
        }
    }

    pub fn host(tag: impl Into<Rc<str>>) -> Self {
        Self::new(ElementType::Host(tag.into()))
    }

    pub fn component(component: &Component) -> Self {
        Self::new(ElementType::Component(component.clone()))
    }

    pub fn fragment(children: impl IntoIterator<Item = Node>) -> Self {
        Self::new(ElementType::Fragment).children(children)
    }

    pub fn provider<T: 'static>(context: &Context<T>, value: T) -> Self {
        let mut el = Self::new(ElementType::Provider(context.id()));
        Rc::make_mut(&mut el.props).value = Some(Rc::new(value));
        el
    }

    pub fn unsupported(tag: impl Into<Rc<str>>) -> Self {
        Self::new(ElementType::Unsupported(tag.into()))
    }

    pub fn key(mut self, key: impl Into<Key>) -> Self {
        self.key = Some(key.into());
        self
    }

    pub fn node_ref(mut self, r: &NodeRef) -> Self {
        self.node_ref = Some(r.clone());
        self
    }

    pub fn attr(mut self, name: impl Into<String>, value: impl Into<AttrValue>) -> Self {
        Rc::make_mut(&mut self.props)
            .attrs
            .insert(name.into(), value.into());
        self
    }

    /// Appends one child. A single child stays a single child; a second one
    /// turns the children into a list.
    pub fn child(mut self, child: impl Into<Node>) -> Self {
        let props = Rc::make_mut(&mut self.props);
        let child = child.into();
        props.children = match std::mem::take(&mut props.children) {
            Node::Empty => child,
            Node::List(mut items) => {
                items.push(child);
                Node::List(items)
            }
            single => Node::List(vec![single, child]),
        };
        self
    }

    pub fn children(mut self, children: impl IntoIterator<Item = Node>) -> Self {
        Rc::make_mut(&mut self.props).children = Node::List(children.into_iter().collect());
        self
    }

    pub fn text(mut self, content: impl Into<Rc<str>>) -> Self {
        Rc::make_mut(&mut self.props).children = Node::Text(content.into());
        self
    }
}

#[derive(Clone, Debug, Default)]
pub enum Node {
    #[default]
    Empty,
    Text(Rc<str>),
    Element(Element),
    List(Vec<Node>),
}

impl Node {
    pub fn is_empty(&self) -> bool {
        matches!(self, Node::Empty)
    }
}

impl From<Element> for Node {
    fn from(el: Element) -> Self {
        Node::Element(el)
    }
}
impl From<&str> for Node {
    fn from(s: &str) -> Self {
        Node::Text(s.into())
    }
}
impl From<String> for Node {
    fn from(s: String) -> Self {
        Node::Text(s.into())
    }
}
macro_rules! node_from_number {
    ($($t:ty),*) => {
        $(impl From<$t> for Node {
            fn from(n: $t) -> Self {
                Node::Text(n.to_string().into())
            }
        })*
    };
}
node_from_number!(i32, i64, u32, u64, usize, f64);

impl From<Vec<Node>> for Node {
    fn from(items: Vec<Node>) -> Self {
        Node::List(items)
    }
}
impl From<Option<Node>> for Node {
    fn from(node: Option<Node>) -> Self {
        node.unwrap_or_default()
    }
}
impl FromIterator<Node> for Node {
    fn from_iter<I: IntoIterator<Item = Node>>(iter: I) -> Self {
        Node::List(iter.into_iter().collect())
    }
}

/// Shorthand for [`Element::host`].
pub fn h(tag: impl Into<Rc<str>>) -> Element {
    Element::host(tag)
}

pub fn text(content: impl Into<Rc<str>>) -> Node {
    Node::Text(content.into())
}

pub fn fragment(children: impl IntoIterator<Item = Node>) -> Node {
    Element::fragment(children).into()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn float_attrs_compare_by_bits() {
        assert_eq!(AttrValue::Float(f64::NAN), AttrValue::Float(f64::NAN));
        assert_ne!(AttrValue::Float(0.0), AttrValue::Float(-0.0));
        assert_eq!(AttrValue::from(1.5), AttrValue::Float(1.5));
        assert_ne!(AttrValue::Int(1), AttrValue::Float(1.0));
    }
}
