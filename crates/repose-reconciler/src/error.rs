use thiserror::Error;

/// Failures reported by a [`HostConfig`](crate::HostConfig) implementation.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum HostError {
    #[error("host child {child} already belongs to another parent")]
    AlreadyParented { child: String },
    #[error("host node {child} is not a child of {parent}")]
    NotAChild { child: String, parent: String },
    #[error("insertion anchor {before} is not a child of {parent}")]
    MissingBefore { before: String, parent: String },
    #[error("unknown host instance {0}")]
    UnknownInstance(String),
    #[error("{0}")]
    Other(String),
}

#[derive(Debug, Error)]
pub enum ReconcileError {
    /// Hook identity is positional; a component may not call more hooks than
    /// it did during its previous render.
    #[error("component `{component}` called more hooks than during its previous render (hook #{index})")]
    HookCountMismatch { component: String, index: usize },

    #[error("component `{component}` called hooks in a different order (hook #{index})")]
    HookKindMismatch { component: String, index: usize },

    #[error("hooks can only be called while a function component is rendering")]
    HookOutsideRender,

    #[error("component `{component}` panicked: {message}")]
    ComponentPanicked { component: String, message: String },

    /// Returned by component code to abort its render.
    #[error("render failed: {0}")]
    Render(String),

    #[error("root is not mounted in this reconciler")]
    UnknownRoot,

    #[error(transparent)]
    Host(#[from] HostError),
}

impl ReconcileError {
    pub fn render(msg: impl Into<String>) -> Self {
        ReconcileError::Render(msg.into())
    }
}

pub type Result<T, E = ReconcileError> = std::result::Result<T, E>;
