//! Context providers.
//!
//! A provider pushes its value while its subtree is begun and pops it when
//! the provider completes, so readers see the nearest enclosing value, or
//! the context default outside any provider.

use std::any::Any;
use std::rc::Rc;
use std::sync::atomic::{AtomicU64, Ordering};

use crate::element::Element;

static NEXT_CONTEXT_ID: AtomicU64 = AtomicU64::new(1);

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub struct ContextId(pub(crate) u64);

#[derive(Clone)]
pub struct Context<T> {
    id: ContextId,
    default: T,
}

impl<T: 'static> Context<T> {
    pub fn new(default: T) -> Self {
        Self {
            id: ContextId(NEXT_CONTEXT_ID.fetch_add(1, Ordering::Relaxed)),
            default,
        }
    }

    pub fn id(&self) -> ContextId {
        self.id
    }

    pub fn default_value(&self) -> &T {
        &self.default
    }

    pub fn provider(&self, value: T) -> Element {
        Element::provider(self, value)
    }
}

#[derive(Default)]
pub(crate) struct ContextStack {
    frames: Vec<(ContextId, Option<Rc<dyn Any>>)>,
}

impl ContextStack {
    pub fn push(&mut self, id: ContextId, value: Option<Rc<dyn Any>>) {
        self.frames.push((id, value));
    }

    pub fn pop(&mut self, id: ContextId) {
        match self.frames.pop() {
            Some((top, _)) if top == id => {}
            other => log::warn!(
                "context stack out of balance: popped {:?} while completing provider {:?}",
                other.map(|(top, _)| top),
                id
            ),
        }
    }

    pub fn read<T: Clone + 'static>(&self, context: &Context<T>) -> T {
        for (id, value) in self.frames.iter().rev() {
            if *id != context.id() {
                continue;
            }
            if let Some(v) = value
                && let Some(v) = v.downcast_ref::<T>()
            {
                return v.clone();
            }
            break;
        }
        context.default_value().clone()
    }

    pub fn clear(&mut self) {
        self.frames.clear();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn nearest_provider_wins() {
        let theme = Context::new("light");
        let mut stack = ContextStack::default();
        assert_eq!(stack.read(&theme), "light");

        stack.push(theme.id(), Some(Rc::new("dark")));
        stack.push(theme.id(), Some(Rc::new("contrast")));
        assert_eq!(stack.read(&theme), "contrast");

        stack.pop(theme.id());
        assert_eq!(stack.read(&theme), "dark");
        stack.pop(theme.id());
        assert_eq!(stack.read(&theme), "light");
    }

    #[test]
    fn unrelated_contexts_do_not_shadow() {
        let a = Context::new(1i32);
        let b = Context::new(2i32);
        let mut stack = ContextStack::default();
        stack.push(a.id(), Some(Rc::new(10i32)));
        stack.push(b.id(), Some(Rc::new(20i32)));
        assert_eq!(stack.read(&a), 10);
        assert_eq!(stack.read(&b), 20);
    }
}
