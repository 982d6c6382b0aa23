//! Explicit allocation.
//!
//! ```text
//! y = relax.call_dps(shape, f, (x))
//! -->
//! alloc0 = relax.builtin.alloc_tensor(shape)
//! y = f(x, alloc0)
//! ```
//!
//! Only bindings of `Pure` blocks are rewritten. The first rewritten block of
//! a sequence and every block after it become `General`.

use super::{assemble, plain_var, rewrite_functions, Lowering};
use crate::diagnostics::{Diagnostics, Fatal};
use crate::error::PassResult;
use crate::ir::attrs::ATTR_DTYPE;
use crate::ir::builtins;
use crate::ir::visit::walk_block;
use crate::ir::{
    AttrValue, Attrs, Binding, BindingBlock, Expr, ExprId, ExprKind, ExprMutator, IrModule,
    Purity, Type, TypeTable,
};
use crate::pass::{invariant_violation, ModulePass, PassOutput, PassStats};
use crate::span::Span;
use rustc_hash::FxHashMap;

fn is_compute_binding(binding: &Binding) -> bool {
    matches!(binding, Binding::VarBinding { value, .. } if value.call_op_name() == Some(builtins::CALL_DPS))
}

#[derive(Debug)]
struct ExplicitAllocRewriter {
    types: TypeTable,
    memo: FxHashMap<ExprId, Expr>,
    diags: Diagnostics,
    stats: PassStats,
    next_alloc: usize,
}

impl ExplicitAllocRewriter {
    fn new(types: TypeTable) -> Self {
        Self {
            types,
            memo: FxHashMap::default(),
            diags: Diagnostics::new(),
            stats: PassStats::new(),
            next_alloc: 0,
        }
    }

    /// Rewrite a binding target of a block that became `General`.
    fn rebind(&mut self, var: &Expr) -> Result<Expr, Fatal> {
        let current = self.mutate(var)?;
        match plain_var(&current, &mut self.types) {
            Some(plain) => {
                self.memo.insert(var.id(), plain.clone());
                Ok(plain)
            }
            None => Ok(current),
        }
    }

    fn rewrite_block(&mut self, block: &BindingBlock) -> Result<BindingBlock, Fatal> {
        let mut bindings = Vec::with_capacity(block.bindings.len() + 1);
        for binding in &block.bindings {
            match binding {
                Binding::VarBinding { var, value, span } if is_compute_binding(binding) => {
                    let (alloc, call) = self.lower_compute(var, value, *span)?;
                    bindings.push(alloc);
                    let var = self.rebind(var)?;
                    bindings.push(Binding::VarBinding {
                        var,
                        value: call,
                        span: *span,
                    });
                    self.stats.bindings_rewritten += 1;
                }
                Binding::VarBinding { var, value, span } => {
                    let value = self.mutate(value)?;
                    let var = self.rebind(var)?;
                    bindings.push(Binding::VarBinding {
                        var,
                        value,
                        span: *span,
                    });
                }
                Binding::MatchShape {
                    var,
                    value,
                    pattern,
                    span,
                } => {
                    let value = self.mutate(value)?;
                    let var = var.as_ref().map(|v| self.rebind(v)).transpose()?;
                    bindings.push(Binding::MatchShape {
                        var,
                        value,
                        pattern: pattern.clone(),
                        span: *span,
                    });
                }
            }
        }
        Ok(BindingBlock {
            bindings,
            purity: Purity::General,
            span: block.span,
        })
    }

    /// Returns the allocation binding and the destination-passing call.
    fn lower_compute(
        &mut self,
        var: &Expr,
        value: &Expr,
        span: Span,
    ) -> Result<(Binding, Expr), Fatal> {
        let args = match value.kind() {
            ExprKind::Call { args, .. } if args.len() == 3 => args,
            ExprKind::Call { args, .. } => {
                return Err(self.diags.emit_fatal(
                    value.span(),
                    format!(
                        "'{}' expects (shape, function, arguments), got {} argument(s)",
                        builtins::CALL_DPS,
                        args.len()
                    ),
                ));
            }
            _ => return Err(self.diags.emit_fatal(value.span(), "expected a call")),
        };
        let shape = self.mutate(&args[0])?;
        let func = self.mutate(&args[1])?;
        let packed = self.mutate(&args[2])?;

        let dtype = var
            .annotation()
            .or_else(|| self.types.get(var.id()))
            .and_then(Type::as_tensor)
            .and_then(|(_, dtype)| dtype);
        let mut attrs = Attrs::new();
        if let Some(dtype) = dtype {
            attrs.insert(ATTR_DTYPE, AttrValue::DType(dtype));
        }
        let rank = match shape.kind() {
            ExprKind::ShapeExpr { dims } => Some(dims.len()),
            _ => None,
        };
        let alloc_ty = Type::dyn_tensor(rank, dtype);

        let alloc_call = Expr::new(
            ExprKind::Call {
                callee: Expr::op(builtins::ALLOC_TENSOR),
                args: vec![shape],
                attrs,
            },
            value.span(),
        );
        let alloc_var = Expr::new(
            ExprKind::Var {
                name: format!("alloc{}", self.next_alloc),
                annotation: None,
            },
            span,
        );
        self.next_alloc += 1;
        self.types.insert(alloc_call.id(), alloc_ty.clone());
        self.types.insert(alloc_var.id(), alloc_ty);

        let mut call_args = match packed.kind() {
            ExprKind::Tuple { fields } => fields.clone(),
            _ => vec![packed.clone()],
        };
        call_args.push(alloc_var.clone());
        let call = Expr::new(
            ExprKind::Call {
                callee: func,
                args: call_args,
                attrs: Attrs::new(),
            },
            value.span(),
        );
        self.types.carry(value.id(), call.id());
        tracing::trace!(var = var.name_hint(), alloc = %alloc_var.id(), "call_dps lowered");

        Ok((
            Binding::VarBinding {
                var: alloc_var,
                value: alloc_call,
                span,
            },
            call,
        ))
    }
}

impl ExprMutator for ExplicitAllocRewriter {
    fn memo(&mut self) -> &mut FxHashMap<ExprId, Expr> {
        &mut self.memo
    }

    fn on_rebuilt(&mut self, old: &Expr, new: &Expr) {
        self.types.carry(old.id(), new.id());
        self.stats.nodes_rebuilt += 1;
    }

    fn mutate_blocks(&mut self, blocks: &[BindingBlock]) -> Result<Vec<BindingBlock>, Fatal> {
        let mut general = false;
        let mut out = Vec::with_capacity(blocks.len());
        for block in blocks {
            general |= block.is_pure() && block.bindings.iter().any(is_compute_binding);
            let new = if general && block.is_pure() {
                self.rewrite_block(block)?
            } else {
                walk_block(self, block)?
            };
            out.push(new);
        }
        Ok(out)
    }
}

impl Lowering for ExplicitAllocRewriter {
    fn diagnostics(&mut self) -> &mut Diagnostics {
        &mut self.diags
    }
}

/// Run explicit allocation over a whole module.
pub fn explicit_alloc(module: &IrModule) -> PassResult<PassOutput> {
    tracing::debug!(functions = module.len(), "explicit allocation started");
    let mut rewriter = ExplicitAllocRewriter::new(module.types().clone());
    match rewrite_functions(module, &mut rewriter) {
        Ok(entries) => {
            tracing::debug!(
                rewritten = rewriter.stats.bindings_rewritten,
                "explicit allocation finished"
            );
            Ok(PassOutput {
                module: assemble(entries, rewriter.types),
                diagnostics: rewriter.diags,
                stats: rewriter.stats,
            })
        }
        Err(Fatal) => Err(invariant_violation(ExplicitAlloc::NAME, rewriter.diags)),
    }
}

/// Explicit allocation as a pipeline pass.
#[derive(Debug, Clone, Copy, Default)]
pub struct ExplicitAlloc;

impl ExplicitAlloc {
    pub const NAME: &'static str = "explicit_alloc";
}

impl ModulePass for ExplicitAlloc {
    fn name(&self) -> &str {
        Self::NAME
    }

    fn run(&self, module: &IrModule) -> PassResult<PassOutput> {
        explicit_alloc(module)
    }
}
