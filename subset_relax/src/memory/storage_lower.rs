//! Storage lowering.
//!
//! ```text
//! x = relax.builtin.alloc_tensor((m, n))
//! -->
//! storage0 = vm.builtin.alloc_storage((m * n * 4,), (64,), (1,))
//! x = vm.builtin.alloc_tensor(storage0, (0,), (m, n))
//! ```
//!
//! A storage allocation is typed as a flat byte buffer, `Tensor[rank=1, uint8]`.

use super::{assemble, plain_var, rewrite_functions, Lowering};
use crate::config::MemoryConfig;
use crate::diagnostics::{Diagnostics, Fatal};
use crate::error::PassResult;
use crate::ir::attrs::{ATTR_ALIGNMENT, ATTR_DEVICE_TYPE, ATTR_DTYPE, ATTR_OFFSET};
use crate::ir::builtins;
use crate::ir::visit::walk_block;
use crate::ir::{
    AttrValue, Attrs, Binding, BindingBlock, DataType, Expr, ExprId, ExprKind, ExprMutator,
    IrModule, PrimExpr, Purity, Type, TypeTable,
};
use crate::pass::{invariant_violation, ModulePass, PassOutput, PassStats};
use crate::span::Span;
use rustc_hash::FxHashMap;

fn is_alloc_binding(binding: &Binding) -> bool {
    matches!(binding, Binding::VarBinding { value, .. } if value.call_op_name() == Some(builtins::ALLOC_TENSOR))
}

/// Byte size of a tensor of `shape` and `dtype`, as a one-element shape.
///
/// Constant shapes fold to a constant. Symbolic `ShapeExpr`s produce the
/// same formula over [`PrimExpr`]s. Any other shape value produces IR calls
/// computing it at run time.
pub fn storage_size(shape: &Expr, dtype: DataType) -> Expr {
    if let ExprKind::ShapeExpr { dims } = shape.kind() {
        let total = dims
            .iter()
            .try_fold(dtype.storage_bytes(), |acc, dim| acc.checked_mul(dim.as_const()?));
        if let Some(total) = total {
            return Expr::shape(vec![PrimExpr::Int(total)]);
        }
        let count = dims
            .iter()
            .cloned()
            .reduce(PrimExpr::mul)
            .unwrap_or(PrimExpr::Int(1));
        let bytes = PrimExpr::floor_div(
            PrimExpr::add(PrimExpr::Int(dtype.total_bits()), PrimExpr::Int(7)),
            PrimExpr::Int(8),
        );
        return Expr::shape(vec![PrimExpr::mul(count, bytes)]);
    }
    let count = Expr::call(Expr::op(builtins::PROD), vec![shape.clone()]);
    let bits_rounded = Expr::call(
        Expr::op(builtins::ADD),
        vec![
            Expr::shape(vec![PrimExpr::Int(dtype.total_bits())]),
            Expr::shape(vec![PrimExpr::Int(7)]),
        ],
    );
    let bytes = Expr::call(
        Expr::op(builtins::FLOOR_DIVIDE),
        vec![bits_rounded, Expr::shape(vec![PrimExpr::Int(8)])],
    );
    Expr::call(Expr::op(builtins::MULTIPLY), vec![count, bytes])
}

/// Evaluate a size produced by [`storage_size`].
///
/// `env` binds symbolic dimensions; `shapes` gives the value of shape-typed
/// variables by name. Returns `None` if anything is unbound or not a size
/// computation.
pub fn evaluate_storage_size(
    size: &Expr,
    env: &FxHashMap<String, i64>,
    shapes: &FxHashMap<String, Vec<i64>>,
) -> Option<i64> {
    match eval_shape(size, env, shapes)?.as_slice() {
        [value] => Some(*value),
        _ => None,
    }
}

fn eval_shape(
    expr: &Expr,
    env: &FxHashMap<String, i64>,
    shapes: &FxHashMap<String, Vec<i64>>,
) -> Option<Vec<i64>> {
    match expr.kind() {
        ExprKind::ShapeExpr { dims } => dims.iter().map(|d| d.eval(env)).collect(),
        ExprKind::Var { name, .. } | ExprKind::DataflowVar { name, .. } => shapes.get(name).cloned(),
        ExprKind::Call { callee, args, .. } => {
            let ExprKind::Op { name } = callee.kind() else {
                return None;
            };
            let scalar = |e: &Expr| match eval_shape(e, env, shapes)?.as_slice() {
                [v] => Some(*v),
                _ => None,
            };
            let value = match (name.as_str(), args.as_slice()) {
                (builtins::PROD, [x]) => eval_shape(x, env, shapes)?
                    .iter()
                    .try_fold(1i64, |acc, d| acc.checked_mul(*d))?,
                (builtins::ADD, [a, b]) => scalar(a)?.checked_add(scalar(b)?)?,
                (builtins::SUBTRACT, [a, b]) => scalar(a)?.checked_sub(scalar(b)?)?,
                (builtins::MULTIPLY, [a, b]) => scalar(a)?.checked_mul(scalar(b)?)?,
                (builtins::FLOOR_DIVIDE, [a, b]) => {
                    let (a, b) = (scalar(a)?, scalar(b)?);
                    if b == 0 {
                        return None;
                    }
                    a.div_euclid(b)
                }
                _ => return None,
            };
            Some(vec![value])
        }
        _ => None,
    }
}

#[derive(Debug)]
struct StorageLowerRewriter<'c> {
    config: &'c MemoryConfig,
    types: TypeTable,
    memo: FxHashMap<ExprId, Expr>,
    diags: Diagnostics,
    stats: PassStats,
    next_storage: usize,
}

impl<'c> StorageLowerRewriter<'c> {
    fn new(config: &'c MemoryConfig, types: TypeTable) -> Self {
        Self {
            config,
            types,
            memo: FxHashMap::default(),
            diags: Diagnostics::new(),
            stats: PassStats::new(),
            next_storage: 0,
        }
    }

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

    fn lower_block(&mut self, block: &BindingBlock) -> Result<BindingBlock, Fatal> {
        let mut bindings = Vec::with_capacity(block.bindings.len() + 1);
        for binding in &block.bindings {
            match binding {
                Binding::VarBinding { var, value, span } if is_alloc_binding(binding) => {
                    let (storage, view) = self.lower_alloc(value, *span)?;
                    bindings.push(storage);
                    let var = self.rebind(var)?;
                    bindings.push(Binding::VarBinding {
                        var,
                        value: view,
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

    /// Returns the storage binding and the tensor view call.
    fn lower_alloc(&mut self, value: &Expr, span: Span) -> Result<(Binding, Expr), Fatal> {
        let (shape, attrs) = match value.kind() {
            ExprKind::Call { args, attrs, .. } if args.len() == 1 => (&args[0], attrs),
            ExprKind::Call { args, .. } => {
                return Err(self.diags.emit_fatal(
                    value.span(),
                    format!(
                        "'{}' expects a single shape argument, got {} argument(s)",
                        builtins::ALLOC_TENSOR,
                        args.len()
                    ),
                ));
            }
            _ => return Err(self.diags.emit_fatal(value.span(), "expected a call")),
        };
        let shape = self.mutate(shape)?;
        let dtype = attrs
            .get_dtype(ATTR_DTYPE)
            .unwrap_or(self.config.default_dtype);
        let MemoryConfig {
            alignment,
            device_type,
            ..
        } = *self.config;

        let storage_call = Expr::new(
            ExprKind::Call {
                callee: Expr::extern_func(builtins::VM_ALLOC_STORAGE),
                args: vec![
                    storage_size(&shape, dtype),
                    Expr::shape(vec![PrimExpr::Int(alignment)]),
                    Expr::shape(vec![PrimExpr::Int(device_type)]),
                ],
                attrs: Attrs::new()
                    .with(ATTR_DTYPE, AttrValue::DType(dtype))
                    .with(ATTR_ALIGNMENT, AttrValue::Int(alignment))
                    .with(ATTR_DEVICE_TYPE, AttrValue::Int(device_type)),
            },
            value.span(),
        );
        let storage = Expr::new(
            ExprKind::Var {
                name: format!("storage{}", self.next_storage),
                annotation: None,
            },
            span,
        );
        self.next_storage += 1;
        let storage_ty = Type::tensor(1, DataType::uint(8));
        self.types.insert(storage_call.id(), storage_ty.clone());
        self.types.insert(storage.id(), storage_ty);

        let view = Expr::new(
            ExprKind::Call {
                callee: Expr::extern_func(builtins::VM_ALLOC_TENSOR),
                args: vec![storage.clone(), Expr::shape(vec![PrimExpr::Int(0)]), shape],
                attrs: Attrs::new()
                    .with(ATTR_DTYPE, AttrValue::DType(dtype))
                    .with(ATTR_OFFSET, AttrValue::Int(0)),
            },
            value.span(),
        );
        self.types.carry(value.id(), view.id());
        tracing::trace!(storage = %storage.id(), %dtype, "alloc_tensor lowered");

        Ok((
            Binding::VarBinding {
                var: storage,
                value: storage_call,
                span,
            },
            view,
        ))
    }
}

impl ExprMutator for StorageLowerRewriter<'_> {
    fn memo(&mut self) -> &mut FxHashMap<ExprId, Expr> {
        &mut self.memo
    }

    fn on_rebuilt(&mut self, old: &Expr, new: &Expr) {
        self.types.carry(old.id(), new.id());
        self.stats.nodes_rebuilt += 1;
    }

    fn mutate_block(&mut self, block: &BindingBlock) -> Result<BindingBlock, Fatal> {
        if block.bindings.iter().any(is_alloc_binding) {
            self.lower_block(block)
        } else {
            walk_block(self, block)
        }
    }
}

impl Lowering for StorageLowerRewriter<'_> {
    fn diagnostics(&mut self) -> &mut Diagnostics {
        &mut self.diags
    }
}

/// Run storage lowering over a whole module.
pub fn lower_storage(module: &IrModule, config: &MemoryConfig) -> PassResult<PassOutput> {
    tracing::debug!(
        functions = module.len(),
        alignment = config.alignment,
        device_type = config.device_type,
        "storage lowering started"
    );
    let mut rewriter = StorageLowerRewriter::new(config, module.types().clone());
    match rewrite_functions(module, &mut rewriter) {
        Ok(entries) => {
            tracing::debug!(
                rewritten = rewriter.stats.bindings_rewritten,
                "storage lowering finished"
            );
            Ok(PassOutput {
                module: assemble(entries, rewriter.types),
                diagnostics: rewriter.diags,
                stats: rewriter.stats,
            })
        }
        Err(Fatal) => Err(invariant_violation(StorageLower::NAME, rewriter.diags)),
    }
}

/// Storage lowering as a pipeline pass.
#[derive(Debug, Clone, Default)]
pub struct StorageLower {
    config: MemoryConfig,
}

impl StorageLower {
    pub const NAME: &'static str = "storage_lower";

    pub fn new(config: MemoryConfig) -> Self {
        Self { config }
    }
}

impl ModulePass for StorageLower {
    fn name(&self) -> &str {
        Self::NAME
    }

    fn run(&self, module: &IrModule) -> PassResult<PassOutput> {
        lower_storage(module, &self.config)
    }
}
