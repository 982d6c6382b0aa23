//! Module pass trait and per-pass statistics.

use crate::diagnostics::Diagnostics;
use crate::error::{PassError, PassResult};
use crate::ir::IrModule;

/// A whole-module rewrite. Passes never mutate their input; they return a
/// fresh module that may share unchanged subtrees with it.
pub trait ModulePass: std::fmt::Debug {
    /// Name of this pass
    fn name(&self) -> &str;

    /// Run the pass on a module
    fn run(&self, module: &IrModule) -> PassResult<PassOutput>;
}

/// Statistics collected while running a pass
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct PassStats {
    /// Expressions visited (memo hits excluded)
    pub nodes_visited: usize,
    /// Expressions served from the memo or reused as already checked
    pub nodes_reused: usize,
    /// Checked types attached to an existing node
    pub types_attached: usize,
    /// Nodes replaced by a new node
    pub nodes_rebuilt: usize,
    /// Bindings rewritten by a lowering pass
    pub bindings_rewritten: usize,
}

impl PassStats {
    pub fn new() -> Self {
        Self::default()
    }

    /// Merge statistics from another pass
    pub fn merge(&mut self, other: &PassStats) {
        self.nodes_visited += other.nodes_visited;
        self.nodes_reused += other.nodes_reused;
        self.types_attached += other.types_attached;
        self.nodes_rebuilt += other.nodes_rebuilt;
        self.bindings_rewritten += other.bindings_rewritten;
    }
}

/// Output of a single pass
#[derive(Debug)]
pub struct PassOutput {
    pub module: IrModule,
    /// Recoverable diagnostics; a fatal one turns into `PassError` instead
    pub diagnostics: Diagnostics,
    pub stats: PassStats,
}

/// Convert a fatal abort into the pass-boundary error.
pub(crate) fn invariant_violation(pass: &str, diagnostics: Diagnostics) -> PassError {
    PassError::InvariantViolation {
        pass: pass.to_string(),
        rendered: diagnostics.render(),
        diagnostics: diagnostics.into_vec(),
    }
}
