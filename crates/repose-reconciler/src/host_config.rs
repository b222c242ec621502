use std::fmt::Debug;

use crate::element::Props;
use crate::error::HostError;

/// Adapter between the reconciler and a concrete host tree.
///
/// Instances are handles; the reconciler clones them freely and never looks
/// inside. Root containers are instances too. Mutations are only requested
/// during commit, after the render that produced them has completed.
pub trait HostConfig {
    type Instance: Clone + Debug + 'static;

    fn create_instance(&mut self, ty: &str, props: &Props) -> Result<Self::Instance, HostError>;

    fn create_text_instance(&mut self, content: &str) -> Result<Self::Instance, HostError>;

    /// Builds up a subtree that is not attached to the document yet.
    fn append_initial_child(
        &mut self,
        parent: &Self::Instance,
        child: &Self::Instance,
    ) -> Result<(), HostError>;

    /// Appends `child` as the last child of `container`, moving it if it is
    /// already a child of `container`.
    fn append_child_to_container(
        &mut self,
        container: &Self::Instance,
        child: &Self::Instance,
    ) -> Result<(), HostError>;

    /// Inserts `child` right before `before`, moving it if it is already a
    /// child of `container`.
    fn insert_child_to_container(
        &mut self,
        child: &Self::Instance,
        container: &Self::Instance,
        before: &Self::Instance,
    ) -> Result<(), HostError>;

    fn remove_child(
        &mut self,
        child: &Self::Instance,
        container: &Self::Instance,
    ) -> Result<(), HostError>;

    fn commit_text_update(
        &mut self,
        instance: &Self::Instance,
        content: &str,
    ) -> Result<(), HostError>;

    fn commit_update(
        &mut self,
        instance: &Self::Instance,
        ty: &str,
        old_props: &Props,
        new_props: &Props,
    ) -> Result<(), HostError>;

    /// Synchronous work is pending. The host must call
    /// [`Reconciler::flush_microtasks`](crate::Reconciler::flush_microtasks)
    /// before it returns to its event loop.
    fn schedule_microtask(&mut self) {}
}
