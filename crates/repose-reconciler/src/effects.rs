use std::any::Any;
use std::cell::RefCell;
use std::rc::Rc;

use smallvec::SmallVec;

use crate::flags::HookFlags;

/// Cleanup returned by an effect. Cloning shares the callback; it runs at
/// most once no matter how many clones call [`Dispose::run`].
#[derive(Clone)]
pub struct Dispose(Rc<RefCell<Option<Box<dyn FnOnce()>>>>);

impl Dispose {
    pub fn new(f: impl FnOnce() + 'static) -> Self {
        Self(Rc::new(RefCell::new(Some(Box::new(f)))))
    }

    /// Runs at most once (safe to call multiple times).
    pub fn run(&self) {
        let f = self.0.borrow_mut().take();
        if let Some(f) = f {
            f()
        }
    }
}

/// Helper to register cleanup inside an effect.
pub fn on_unmount(f: impl FnOnce() + 'static) -> Option<Dispose> {
    Some(Dispose::new(f))
}

/// A value an effect depends on. Two dependencies are the same when they
/// hold the same type and compare equal.
pub trait Dependency: Any {
    fn same_as(&self, other: &dyn Dependency) -> bool;
    fn as_any(&self) -> &dyn Any;
}

impl<T: PartialEq + 'static> Dependency for T {
    fn same_as(&self, other: &dyn Dependency) -> bool {
        other.as_any().downcast_ref::<T>() == Some(self)
    }

    fn as_any(&self) -> &dyn Any {
        self
    }
}

pub type Deps = SmallVec<[Rc<dyn Dependency>; 4]>;

/// Builds a [`Deps`] list: `deps![count, name.clone()]`.
#[macro_export]
macro_rules! deps {
    ($($dep:expr),* $(,)?) => {
        {
            #[allow(unused_mut)]
            let mut deps = $crate::effects::Deps::new();
            $(deps.push(::std::rc::Rc::new($dep) as ::std::rc::Rc<dyn $crate::effects::Dependency>);)*
            deps
        }
    };
}

pub(crate) fn deps_equal(next: &Deps, prev: &Deps) -> bool {
    next.len() == prev.len() && next.iter().zip(prev).all(|(a, b)| a.same_as(b.as_ref()))
}

pub(crate) type EffectCreate = Box<dyn FnOnce() -> Option<Dispose>>;

pub(crate) struct EffectRecord {
    pub tag: HookFlags,
    pub create: Option<EffectCreate>,
    pub destroy: Option<Dispose>,
    pub deps: Option<Deps>,
}

pub(crate) type EffectRef = Rc<RefCell<EffectRecord>>;

impl EffectRecord {
    pub fn needs_run(&self) -> bool {
        self.tag.contains(HookFlags::PASSIVE | HookFlags::HAS_EFFECT)
    }
}
