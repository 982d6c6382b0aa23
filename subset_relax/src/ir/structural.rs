//! Structural (value-based) equality and hashing of expressions and modules.
//!
//! Node ids and spans are ignored. Variables compare by kind, name and
//! annotation. Both walks are memoized by node id, so shared subexpressions
//! are compared or hashed once.

use super::expr::{Binding, BindingBlock, Expr, ExprId, ExprKind};
use super::module::{IrModule, ModuleEntry, TypeTable};
use rustc_hash::{FxHashMap, FxHashSet, FxHasher};
use std::hash::{Hash, Hasher};

/// Structural equality of two expressions, ignoring checked types.
pub fn structural_eq(lhs: &Expr, rhs: &Expr) -> bool {
    StructuralEq::new(None).expr_eq(lhs, rhs)
}

/// Structural equality of two modules: same entries in the same order,
/// structurally equal bodies, and equal checked types on corresponding nodes.
pub fn module_structural_eq(lhs: &IrModule, rhs: &IrModule) -> bool {
    if lhs.len() != rhs.len() {
        return false;
    }
    let mut cmp = StructuralEq::new(Some((lhs.types(), rhs.types())));
    lhs.entries()
        .zip(rhs.entries())
        .all(|((ln, le), (rn, re))| {
            ln == rn
                && match (le, re) {
                    (ModuleEntry::Function(a), ModuleEntry::Function(b)) => cmp.expr_eq(a, b),
                    (ModuleEntry::Foreign(a), ModuleEntry::Foreign(b)) => a == b,
                    _ => false,
                }
        })
}

struct StructuralEq<'a> {
    types: Option<(&'a TypeTable, &'a TypeTable)>,
    equal: FxHashSet<(ExprId, ExprId)>,
}

impl<'a> StructuralEq<'a> {
    fn new(types: Option<(&'a TypeTable, &'a TypeTable)>) -> Self {
        Self {
            types,
            equal: FxHashSet::default(),
        }
    }

    fn expr_eq(&mut self, a: &Expr, b: &Expr) -> bool {
        match self.types {
            None if a.same_as(b) => return true,
            Some((lt, rt)) if lt.get(a.id()) != rt.get(b.id()) => return false,
            _ => {}
        }
        if self.equal.contains(&(a.id(), b.id())) {
            return true;
        }
        let eq = self.kind_eq(a.kind(), b.kind());
        if eq {
            self.equal.insert((a.id(), b.id()));
        }
        eq
    }

    fn exprs_eq(&mut self, a: &[Expr], b: &[Expr]) -> bool {
        a.len() == b.len() && a.iter().zip(b).all(|(x, y)| self.expr_eq(x, y))
    }

    fn kind_eq(&mut self, a: &ExprKind, b: &ExprKind) -> bool {
        use ExprKind::*;
        match (a, b) {
            (
                Var {
                    name: n1,
                    annotation: a1,
                },
                Var {
                    name: n2,
                    annotation: a2,
                },
            )
            | (
                DataflowVar {
                    name: n1,
                    annotation: a1,
                },
                DataflowVar {
                    name: n2,
                    annotation: a2,
                },
            ) => n1 == n2 && a1 == a2,
            (GlobalVar { name: n1 }, GlobalVar { name: n2 }) => n1 == n2,
            (
                Call {
                    callee: c1,
                    args: a1,
                    attrs: t1,
                },
                Call {
                    callee: c2,
                    args: a2,
                    attrs: t2,
                },
            ) => t1 == t2 && self.expr_eq(c1, c2) && self.exprs_eq(a1, a2),
            (Tuple { fields: f1 }, Tuple { fields: f2 }) => self.exprs_eq(f1, f2),
            (
                TupleGetItem {
                    tuple: t1,
                    index: i1,
                },
                TupleGetItem {
                    tuple: t2,
                    index: i2,
                },
            ) => i1 == i2 && self.expr_eq(t1, t2),
            (
                If {
                    cond: c1,
                    true_branch: t1,
                    false_branch: f1,
                },
                If {
                    cond: c2,
                    true_branch: t2,
                    false_branch: f2,
                },
            ) => self.expr_eq(c1, c2) && self.expr_eq(t1, t2) && self.expr_eq(f1, f2),
            (
                Function {
                    params: p1,
                    body: b1,
                    ret_type: r1,
                },
                Function {
                    params: p2,
                    body: b2,
                    ret_type: r2,
                },
            ) => r1 == r2 && self.exprs_eq(p1, p2) && self.expr_eq(b1, b2),
            (
                SeqExpr {
                    blocks: bl1,
                    body: b1,
                },
                SeqExpr {
                    blocks: bl2,
                    body: b2,
                },
            ) => {
                bl1.len() == bl2.len()
                    && bl1.iter().zip(bl2).all(|(x, y)| self.block_eq(x, y))
                    && self.expr_eq(b1, b2)
            }
            (ShapeExpr { dims: d1 }, ShapeExpr { dims: d2 }) => d1 == d2,
            (
                ExternFunc {
                    global_symbol: s1,
                },
                ExternFunc {
                    global_symbol: s2,
                },
            ) => s1 == s2,
            (Op { name: n1 }, Op { name: n2 }) => n1 == n2,
            _ => false,
        }
    }

    fn block_eq(&mut self, a: &BindingBlock, b: &BindingBlock) -> bool {
        a.purity == b.purity
            && a.bindings.len() == b.bindings.len()
            && a
                .bindings
                .iter()
                .zip(&b.bindings)
                .all(|(x, y)| self.binding_eq(x, y))
    }

    fn binding_eq(&mut self, a: &Binding, b: &Binding) -> bool {
        match (a, b) {
            (
                Binding::VarBinding {
                    var: v1, value: e1, ..
                },
                Binding::VarBinding {
                    var: v2, value: e2, ..
                },
            ) => self.expr_eq(v1, v2) && self.expr_eq(e1, e2),
            (
                Binding::MatchShape {
                    var: v1,
                    value: e1,
                    pattern: p1,
                    ..
                },
                Binding::MatchShape {
                    var: v2,
                    value: e2,
                    pattern: p2,
                    ..
                },
            ) => {
                let vars_eq = match (v1, v2) {
                    (Some(x), Some(y)) => self.expr_eq(x, y),
                    (None, None) => true,
                    _ => false,
                };
                vars_eq && p1 == p2 && self.expr_eq(e1, e2)
            }
            _ => false,
        }
    }
}

/// Structural hash consistent with [`structural_eq`].
pub fn structural_hash(expr: &Expr) -> u64 {
    StructuralHasher::default().hash_expr(expr)
}

#[derive(Default)]
struct StructuralHasher {
    memo: FxHashMap<ExprId, u64>,
}

impl StructuralHasher {
    fn hash_expr(&mut self, expr: &Expr) -> u64 {
        if let Some(h) = self.memo.get(&expr.id()) {
            return *h;
        }
        let mut state = FxHasher::default();
        let kind = expr.kind();
        std::mem::discriminant(kind).hash(&mut state);
        match kind {
            ExprKind::Var { name, annotation } | ExprKind::DataflowVar { name, annotation } => {
                name.hash(&mut state);
                annotation.hash(&mut state);
            }
            ExprKind::GlobalVar { name } | ExprKind::Op { name } => name.hash(&mut state),
            ExprKind::ExternFunc { global_symbol } => global_symbol.hash(&mut state),
            ExprKind::Call {
                callee,
                args,
                attrs,
            } => {
                self.hash_expr(callee).hash(&mut state);
                self.hash_all(args, &mut state);
                attrs.hash(&mut state);
            }
            ExprKind::Tuple { fields } => self.hash_all(fields, &mut state),
            ExprKind::TupleGetItem { tuple, index } => {
                self.hash_expr(tuple).hash(&mut state);
                index.hash(&mut state);
            }
            ExprKind::If {
                cond,
                true_branch,
                false_branch,
            } => {
                self.hash_expr(cond).hash(&mut state);
                self.hash_expr(true_branch).hash(&mut state);
                self.hash_expr(false_branch).hash(&mut state);
            }
            ExprKind::Function {
                params,
                body,
                ret_type,
            } => {
                self.hash_all(params, &mut state);
                self.hash_expr(body).hash(&mut state);
                ret_type.hash(&mut state);
            }
            ExprKind::SeqExpr { blocks, body } => {
                blocks.len().hash(&mut state);
                for block in blocks {
                    block.purity.hash(&mut state);
                    block.bindings.len().hash(&mut state);
                    for binding in &block.bindings {
                        match binding {
                            Binding::VarBinding { var, value, .. } => {
                                0u8.hash(&mut state);
                                self.hash_expr(var).hash(&mut state);
                                self.hash_expr(value).hash(&mut state);
                            }
                            Binding::MatchShape {
                                var,
                                value,
                                pattern,
                                ..
                            } => {
                                1u8.hash(&mut state);
                                var.as_ref()
                                    .map(|v| self.hash_expr(v))
                                    .hash(&mut state);
                                self.hash_expr(value).hash(&mut state);
                                pattern.hash(&mut state);
                            }
                        }
                    }
                }
                self.hash_expr(body).hash(&mut state);
            }
            ExprKind::ShapeExpr { dims } => dims.hash(&mut state),
        }
        let h = state.finish();
        self.memo.insert(expr.id(), h);
        h
    }

    fn hash_all(&mut self, exprs: &[Expr], state: &mut FxHasher) {
        exprs.len().hash(state);
        for e in exprs {
            self.hash_expr(e).hash(state);
        }
    }
}
