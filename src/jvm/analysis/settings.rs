/// Knobs shared by the dataflow engines
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Settings {
    /// Maximum number of `(block, context)` states processed before giving up
    ///
    /// Every state is processed at least once, and again each time its incoming frame changes. A
    /// lattice of finite height always converges well within the default. Running out means the
    /// lattice is unsound, and is reported as [`crate::jvm::Error::NonTerminating`].
    pub iteration_budget: usize,

    /// Record slots whose merged value is a lattice conflict
    ///
    /// Conflicts are never fatal. Turning this off only skips the bookkeeping.
    pub record_conflicts: bool,
}

impl Settings {
    pub const DEFAULT_ITERATION_BUDGET: usize = 100_000;
}

impl Default for Settings {
    fn default() -> Self {
        Settings {
            iteration_budget: Self::DEFAULT_ITERATION_BUDGET,
            record_conflicts: true,
        }
    }
}
