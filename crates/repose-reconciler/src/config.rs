use std::time::Duration;

/// How keyed child lists decide which reused children to move.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub enum ListDiffStrategy {
    /// Keep the longest run of children whose previous positions are already
    /// increasing; move everything else.
    #[default]
    MinimalMoves,
    /// Single left-to-right pass tracking the highest previous position
    /// placed so far. Moves every reused child whose previous position is
    /// below it.
    Greedy,
}

#[derive(Clone, Debug)]
pub struct ReconcilerConfig {
    /// Budget for one cooperative render slice.
    pub time_slice: Duration,
    /// Log development warnings (unsupported element types, updates on
    /// unmounted components, ...).
    pub dev_warnings: bool,
    /// Fresh render attempts after a render-phase error before the error is
    /// surfaced.
    pub max_render_retries: u32,
    pub list_diff: ListDiffStrategy,
}

impl Default for ReconcilerConfig {
    fn default() -> Self {
        Self {
            time_slice: Duration::from_millis(5),
            dev_warnings: cfg!(debug_assertions),
            max_render_retries: 1,
            list_diff: ListDiffStrategy::default(),
        }
    }
}

impl ReconcilerConfig {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn time_slice(mut self, slice: Duration) -> Self {
        self.time_slice = slice;
        self
    }

    pub fn dev_warnings(mut self, on: bool) -> Self {
        self.dev_warnings = on;
        self
    }

    pub fn max_render_retries(mut self, retries: u32) -> Self {
        self.max_render_retries = retries;
        self
    }

    pub fn list_diff(mut self, strategy: ListDiffStrategy) -> Self {
        self.list_diff = strategy;
        self
    }
}
