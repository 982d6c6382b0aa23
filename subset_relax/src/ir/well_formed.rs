//! Structural invariant checks.
//!
//! A module is well formed when:
//! - every `Var`/`DataflowVar` use is bound earlier in an enclosing scope;
//! - every variable is bound exactly once;
//! - `DataflowVar`s are bound only in `Pure` blocks and used only inside the
//!   block that binds them, including expressions nested in that block;
//! - binding targets and function parameters are variables.
//!
//! The checker reports every violation it finds rather than stopping at the
//! first; the passes assume these invariants and abort on the ones they trip.

use super::expr::{Binding, BindingBlock, Expr, ExprId, ExprKind, Purity};
use super::module::{IrModule, ModuleEntry};
use crate::diagnostics::{DiagnosticKind, Diagnostics};
use crate::error::PassResult;
use crate::pass::{invariant_violation, ModulePass, PassOutput, PassStats};
use rustc_hash::FxHashSet;

/// Check `module` and return one diagnostic per violation.
pub fn check_well_formed(module: &IrModule) -> Diagnostics {
    let mut checker = WellFormedChecker::default();
    for (name, entry) in module.entries() {
        let ModuleEntry::Function(func) = entry else {
            continue;
        };
        checker.diags.set_context(Some(name));
        match func.kind() {
            ExprKind::Function { .. } => checker.visit(func),
            _ => checker.violation(func, format!("entry '{}' is not a function", name)),
        }
    }
    checker.diags.set_context(None);
    checker.diags
}

#[derive(Debug, Default)]
struct WellFormedChecker {
    diags: Diagnostics,
    /// Every variable bound so far, across the whole module.
    bound: FxHashSet<ExprId>,
    /// Variables visible at the current point, innermost scope last.
    scopes: Vec<FxHashSet<ExprId>>,
    /// `DataflowVar`s of each enclosing pure block within the current
    /// function, innermost last.
    dataflow: Vec<FxHashSet<ExprId>>,
    /// Composite nodes already checked; shared subtrees are checked once.
    visited: FxHashSet<ExprId>,
}

impl WellFormedChecker {
    fn violation(&mut self, at: &Expr, message: String) {
        self.diags
            .error(DiagnosticKind::InvariantViolation, at.span(), message);
    }

    fn in_scope(&self, var: &Expr) -> bool {
        self.scopes.iter().rev().any(|s| s.contains(&var.id()))
    }

    fn name_of(var: &Expr) -> &str {
        var.name_hint().unwrap_or("<anonymous>")
    }

    fn visit(&mut self, expr: &Expr) {
        match expr.kind() {
            ExprKind::Var { .. } => {
                if !self.in_scope(expr) {
                    let message = format!(
                        "variable '{}' is used before it is bound",
                        Self::name_of(expr)
                    );
                    self.violation(expr, message);
                }
                return;
            }
            ExprKind::DataflowVar { .. } => {
                let local = self.dataflow.iter().any(|d| d.contains(&expr.id()));
                if !local {
                    let message = if self.bound.contains(&expr.id()) {
                        format!(
                            "dataflow variable '{}' is used outside the block that binds it",
                            Self::name_of(expr)
                        )
                    } else {
                        format!(
                            "variable '{}' is used before it is bound",
                            Self::name_of(expr)
                        )
                    };
                    self.violation(expr, message);
                }
                return;
            }
            _ => {}
        }
        if !self.visited.insert(expr.id()) {
            return;
        }
        match expr.kind() {
            ExprKind::Var { .. }
            | ExprKind::DataflowVar { .. }
            | ExprKind::GlobalVar { .. }
            | ExprKind::ShapeExpr { .. }
            | ExprKind::ExternFunc { .. }
            | ExprKind::Op { .. } => {}
            ExprKind::Call { callee, args, .. } => {
                self.visit(callee);
                args.iter().for_each(|a| self.visit(a));
            }
            ExprKind::Tuple { fields } => fields.iter().for_each(|f| self.visit(f)),
            ExprKind::TupleGetItem { tuple, .. } => self.visit(tuple),
            ExprKind::If {
                cond,
                true_branch,
                false_branch,
            } => {
                self.visit(cond);
                self.visit(true_branch);
                self.visit(false_branch);
            }
            ExprKind::Function { params, body, .. } => {
                let outer_dataflow = std::mem::take(&mut self.dataflow);
                self.scopes.push(FxHashSet::default());
                for param in params {
                    if param.is_dataflow_var() {
                        let message = format!(
                            "parameter '{}' must be a Var, not a DataflowVar",
                            Self::name_of(param)
                        );
                        self.violation(param, message);
                    }
                    self.bind(param, Purity::General);
                }
                self.visit(body);
                self.scopes.pop();
                self.dataflow = outer_dataflow;
            }
            ExprKind::SeqExpr { blocks, body } => {
                self.scopes.push(FxHashSet::default());
                for block in blocks {
                    self.visit_block(block);
                }
                self.visit(body);
                self.scopes.pop();
            }
        }
    }

    fn visit_block(&mut self, block: &BindingBlock) {
        if block.is_pure() {
            self.dataflow.push(FxHashSet::default());
        }
        for binding in &block.bindings {
            match binding {
                Binding::VarBinding { var, value, .. } => {
                    self.visit(value);
                    self.bind(var, block.purity);
                }
                Binding::MatchShape { var, value, .. } => {
                    self.visit(value);
                    if let Some(var) = var {
                        self.bind(var, block.purity);
                    }
                }
            }
        }
        if block.is_pure() {
            self.dataflow.pop();
        }
    }

    fn bind(&mut self, var: &Expr, purity: Purity) {
        match var.kind() {
            ExprKind::Var { .. } => {}
            ExprKind::DataflowVar { .. } if purity == Purity::Pure => {}
            ExprKind::DataflowVar { .. } => {
                let message = format!(
                    "dataflow variable '{}' is bound outside a pure block",
                    Self::name_of(var)
                );
                self.violation(var, message);
            }
            other => {
                let message = format!("binding target is not a variable: {:?}", other);
                self.violation(var, message);
                return;
            }
        }
        if !self.bound.insert(var.id()) {
            let message = format!("variable '{}' is bound more than once", Self::name_of(var));
            self.violation(var, message);
        }
        match (var.is_dataflow_var(), self.dataflow.last_mut()) {
            (true, Some(dataflow)) => {
                dataflow.insert(var.id());
            }
            _ => {
                if let Some(scope) = self.scopes.last_mut() {
                    scope.insert(var.id());
                }
            }
        }
    }
}

/// Well-formedness check as a pipeline pass. Any violation aborts the
/// pipeline; the module is passed through unchanged otherwise.
#[derive(Debug, Clone, Copy, Default)]
pub struct WellFormed;

impl WellFormed {
    pub const NAME: &'static str = "well_formed";
}

impl ModulePass for WellFormed {
    fn name(&self) -> &str {
        Self::NAME
    }

    fn run(&self, module: &IrModule) -> PassResult<PassOutput> {
        let diagnostics = check_well_formed(module);
        tracing::debug!(violations = diagnostics.len(), "well-formedness checked");
        if !diagnostics.is_empty() {
            return Err(invariant_violation(Self::NAME, diagnostics));
        }
        Ok(PassOutput {
            module: module.clone(),
            diagnostics,
            stats: PassStats::new(),
        })
    }
}
