//! # Reconciler
//!
//! `repose-reconciler` keeps a host tree (a DOM, a widget toolkit, the
//! in-memory tree of `repose-noop`) in sync with a declarative description
//! of it. Application code describes *what* the tree should look like with
//! [`Node`]s and function [`Component`]s; the reconciler works out the
//! smallest set of host mutations that gets there and applies them through a
//! [`HostConfig`].
//!
//! ## Describing a tree
//!
//! ```rust
//! use repose_reconciler::*;
//!
//! let items: Node = ["a", "b"]
//!     .iter()
//!     .map(|k| Node::from(h("li").key(*k).text(*k)))
//!     .collect();
//! let list = h("ul").attr("class", "items").child(items);
//! assert!(matches!(list.props.children, Node::List(_)));
//! ```
//!
//! Keys identify list items across renders; give them to every item of a
//! list that can reorder.
//!
//! ## Components and hooks
//!
//! A component is a render function over [`Hooks`] and its [`Props`]. Hooks
//! are positional: call the same hooks in the same order on every render.
//!
//! ```rust
//! use repose_reconciler::*;
//!
//! let counter = Component::new("Counter", |hooks, _props| {
//!     let (count, set_count) = hooks.use_state(|| 0)?;
//!     hooks.use_effect(
//!         move || {
//!             set_count.update(|n| n + 1);
//!             None
//!         },
//!         Some(deps![]),
//!     )?;
//!     Ok(h("span").text(count.to_string()).into())
//! });
//! let _root_node: Node = counter.element().into();
//! ```
//!
//! - `use_state` returns the current value and a [`SetState`] handle. Setting
//!   state never re-renders synchronously; it queues an update at the
//!   current priority.
//! - `use_effect` runs after commit. `None` deps run after every commit,
//!   `deps![]` once, `deps![a, b]` whenever `a` or `b` changes.
//! - `use_context` reads the nearest [`Context`] provider; `use_transition`
//!   marks updates as non-urgent.
//!
//! ## Driving the engine
//!
//! [`Reconciler::create_root`] mounts a container, [`Reconciler::update_root`]
//! queues a new description for it. Work then runs from the driver calls:
//!
//! - [`Reconciler::flush_microtasks`] for sync-priority work (the host is told
//!   through [`HostConfig::schedule_microtask`]),
//! - [`Reconciler::run_next_task`] for one time-sliced slice of everything
//!   else, [`Reconciler::run_until_idle`] to drain all of it.
//!
//! Renders are interruptible at unit boundaries and restart when more urgent
//! work arrives; commits are atomic.

pub mod config;
pub mod context;
pub mod effects;
pub mod element;
pub mod error;
pub mod flags;
pub mod hooks;
pub mod host_config;
pub mod lanes;
pub mod root;
pub mod scheduler;
pub mod update_queue;
pub mod work_loop;

mod begin_work;
mod child_reconciler;
mod commit;
mod complete_work;
mod fiber;

pub use config::*;
pub use context::{Context, ContextId};
pub use effects::{Dependency, Deps, Dispose, on_unmount};
pub use element::*;
pub use error::*;
pub use fiber::{WorkId, WorkTag};
pub use flags::{Flags, HookFlags};
pub use hooks::{Hooks, SetState, StartTransition};
pub use host_config::HostConfig;
pub use lanes::*;
pub use root::{RootHandle, RootId};
pub use scheduler::{Clock, ManualClock, SystemClock, TaskId};
pub use update_queue::Action;
pub use work_loop::{CommitInfo, InspectedUnit, Reconciler};
