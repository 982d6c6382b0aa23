//! Memoized, sharing-preserving expression rewriting.
//!
//! Implementors override the hooks they care about; the `walk_*` functions
//! provide the default structural recursion. A node is rebuilt only when one
//! of its children changed identity, so untouched subtrees stay shared with
//! the input.

use super::expr::{Binding, BindingBlock, Expr, ExprId, ExprKind};
use crate::diagnostics::Fatal;
use rustc_hash::FxHashMap;

pub trait ExprMutator {
    /// Per-pass memo: input node id → rewritten node.
    fn memo(&mut self) -> &mut FxHashMap<ExprId, Expr>;

    /// Called when `old` was rewritten into a different node `new`.
    fn on_rebuilt(&mut self, _old: &Expr, _new: &Expr) {}

    fn mutate(&mut self, expr: &Expr) -> Result<Expr, Fatal> {
        if let Some(done) = self.memo().get(&expr.id()) {
            return Ok(done.clone());
        }
        let new = self.mutate_node(expr)?;
        if !new.same_as(expr) {
            self.on_rebuilt(expr, &new);
        }
        self.memo().insert(expr.id(), new.clone());
        Ok(new)
    }

    fn mutate_node(&mut self, expr: &Expr) -> Result<Expr, Fatal> {
        walk_expr(self, expr)
    }

    fn mutate_blocks(&mut self, blocks: &[BindingBlock]) -> Result<Vec<BindingBlock>, Fatal> {
        blocks.iter().map(|b| self.mutate_block(b)).collect()
    }

    fn mutate_block(&mut self, block: &BindingBlock) -> Result<BindingBlock, Fatal> {
        walk_block(self, block)
    }

    fn mutate_binding(&mut self, binding: &Binding) -> Result<Binding, Fatal> {
        walk_binding(self, binding)
    }
}

fn mutate_all<M: ExprMutator + ?Sized>(
    m: &mut M,
    exprs: &[Expr],
    same: &mut bool,
) -> Result<Vec<Expr>, Fatal> {
    let mut out = Vec::with_capacity(exprs.len());
    for e in exprs {
        let new = m.mutate(e)?;
        *same &= new.same_as(e);
        out.push(new);
    }
    Ok(out)
}

/// Default recursion: rewrite children, rebuild if any changed.
pub fn walk_expr<M: ExprMutator + ?Sized>(m: &mut M, expr: &Expr) -> Result<Expr, Fatal> {
    let mut same = true;
    let kind = match expr.kind() {
        ExprKind::Var { .. }
        | ExprKind::DataflowVar { .. }
        | ExprKind::GlobalVar { .. }
        | ExprKind::ShapeExpr { .. }
        | ExprKind::ExternFunc { .. }
        | ExprKind::Op { .. } => return Ok(expr.clone()),
        ExprKind::Call {
            callee,
            args,
            attrs,
        } => {
            let new_callee = m.mutate(callee)?;
            same &= new_callee.same_as(callee);
            let new_args = mutate_all(m, args, &mut same)?;
            ExprKind::Call {
                callee: new_callee,
                args: new_args,
                attrs: attrs.clone(),
            }
        }
        ExprKind::Tuple { fields } => ExprKind::Tuple {
            fields: mutate_all(m, fields, &mut same)?,
        },
        ExprKind::TupleGetItem { tuple, index } => {
            let new_tuple = m.mutate(tuple)?;
            same &= new_tuple.same_as(tuple);
            ExprKind::TupleGetItem {
                tuple: new_tuple,
                index: *index,
            }
        }
        ExprKind::If {
            cond,
            true_branch,
            false_branch,
        } => {
            let new_cond = m.mutate(cond)?;
            let new_true = m.mutate(true_branch)?;
            let new_false = m.mutate(false_branch)?;
            same &= new_cond.same_as(cond)
                && new_true.same_as(true_branch)
                && new_false.same_as(false_branch);
            ExprKind::If {
                cond: new_cond,
                true_branch: new_true,
                false_branch: new_false,
            }
        }
        ExprKind::Function {
            params,
            body,
            ret_type,
        } => {
            let new_params = mutate_all(m, params, &mut same)?;
            let new_body = m.mutate(body)?;
            same &= new_body.same_as(body);
            ExprKind::Function {
                params: new_params,
                body: new_body,
                ret_type: ret_type.clone(),
            }
        }
        ExprKind::SeqExpr { blocks, body } => {
            let new_blocks = m.mutate_blocks(blocks)?;
            same &= new_blocks.len() == blocks.len()
                && new_blocks.iter().zip(blocks).all(|(a, b)| a.same_as(b));
            let new_body = m.mutate(body)?;
            same &= new_body.same_as(body);
            ExprKind::SeqExpr {
                blocks: new_blocks,
                body: new_body,
            }
        }
    };
    if same {
        Ok(expr.clone())
    } else {
        Ok(expr.rebuild(kind))
    }
}

pub fn walk_block<M: ExprMutator + ?Sized>(
    m: &mut M,
    block: &BindingBlock,
) -> Result<BindingBlock, Fatal> {
    let mut same = true;
    let mut bindings = Vec::with_capacity(block.bindings.len());
    for binding in &block.bindings {
        let new = m.mutate_binding(binding)?;
        same &= new.same_as(binding);
        bindings.push(new);
    }
    if same {
        return Ok(block.clone());
    }
    Ok(BindingBlock {
        bindings,
        purity: block.purity,
        span: block.span,
    })
}

pub fn walk_binding<M: ExprMutator + ?Sized>(
    m: &mut M,
    binding: &Binding,
) -> Result<Binding, Fatal> {
    match binding {
        Binding::VarBinding { var, value, span } => Ok(Binding::VarBinding {
            var: m.mutate(var)?,
            value: m.mutate(value)?,
            span: *span,
        }),
        Binding::MatchShape {
            var,
            value,
            pattern,
            span,
        } => Ok(Binding::MatchShape {
            var: var.as_ref().map(|v| m.mutate(v)).transpose()?,
            value: m.mutate(value)?,
            pattern: pattern.clone(),
            span: *span,
        }),
    }
}
