//! Operator registry: op name → optional type inference rule.
//!
//! The inference engine only consumes [`OpRegistry::lookup`]. A small default
//! rule set for the arithmetic, shape and allocation primitives is provided by
//! [`OpRegistry::with_defaults`].

use crate::diagnostics::{DiagnosticKind, Diagnostics};
use crate::ir::attrs::{Attrs, ATTR_DTYPE};
use crate::ir::builtins;
use crate::ir::{DataType, Expr, ExprKind, Type};
use rustc_hash::FxHashMap;

/// Inputs to an inference rule.
#[derive(Debug)]
pub struct CallContext<'a> {
    pub op: &'a str,
    /// The call node with already-inferred children.
    pub call: &'a Expr,
    pub args: &'a [Expr],
    /// Checked type of each argument, `None` when unresolved.
    pub arg_types: &'a [Option<Type>],
    pub attrs: &'a Attrs,
}

impl CallContext<'_> {
    /// Report a problem with this call.
    pub fn error(&self, diags: &mut Diagnostics, kind: DiagnosticKind, message: impl Into<String>) {
        diags.error(kind, self.call.span(), message);
    }

    /// Require exactly `n` arguments, all typed.
    fn typed_args(&self, n: usize, diags: &mut Diagnostics) -> Option<Vec<&Type>> {
        if self.args.len() != n {
            self.error(
                diags,
                DiagnosticKind::Mismatch,
                format!(
                    "'{}' expects {} argument(s), got {}",
                    self.op,
                    n,
                    self.args.len()
                ),
            );
            return None;
        }
        let mut out = Vec::with_capacity(n);
        for (i, ty) in self.arg_types.iter().enumerate() {
            match ty {
                Some(ty) => out.push(ty),
                None => {
                    self.error(
                        diags,
                        DiagnosticKind::UnresolvedType,
                        format!("argument {} of '{}' has no type", i, self.op),
                    );
                    return None;
                }
            }
        }
        Some(out)
    }
}

/// Type inference rule of a primitive operator.
pub type InferRule = fn(&CallContext<'_>, &mut Diagnostics) -> Option<Type>;

#[derive(Debug, Clone, Default)]
pub struct OpRegistry {
    ops: FxHashMap<String, Option<InferRule>>,
}

impl OpRegistry {
    /// Create an empty registry
    pub fn new() -> Self {
        Self::default()
    }

    /// Registry with the built-in rules
    pub fn with_defaults() -> Self {
        let mut registry = Self::new();
        registry.register_defaults();
        registry
    }

    fn register_defaults(&mut self) {
        for op in [
            builtins::ADD,
            builtins::SUBTRACT,
            builtins::MULTIPLY,
            builtins::DIVIDE,
            builtins::FLOOR_DIVIDE,
        ] {
            self.register(op, infer_elementwise);
        }
        self.register(builtins::SHAPE_OF, infer_shape_of);
        self.register(builtins::PROD, infer_prod);
        self.register(builtins::ALLOC_TENSOR, infer_alloc_tensor);
        // Typed at the binding site.
        self.register_without_rule(builtins::CALL_DPS);
    }

    /// Register `name` with an inference rule, replacing any previous entry
    pub fn register(&mut self, name: &str, rule: InferRule) {
        self.ops.insert(name.to_string(), Some(rule));
    }

    /// Register `name` as a known op with no rule
    pub fn register_without_rule(&mut self, name: &str) {
        self.ops.insert(name.to_string(), None);
    }

    /// Inference rule for `name`, if one is registered
    pub fn lookup(&self, name: &str) -> Option<InferRule> {
        self.ops.get(name).copied().flatten()
    }

    pub fn contains(&self, name: &str) -> bool {
        self.ops.contains_key(name)
    }
}

/// Elementwise binary op with broadcasting: rank is the larger of the two,
/// dtypes must agree. Two shapes combine into a shape.
fn infer_elementwise(ctx: &CallContext<'_>, diags: &mut Diagnostics) -> Option<Type> {
    let tys = ctx.typed_args(2, diags)?;
    match (tys[0], tys[1]) {
        (Type::Shape, Type::Shape) => Some(Type::Shape),
        (
            Type::DynTensor {
                rank: r1,
                dtype: d1,
            },
            Type::DynTensor {
                rank: r2,
                dtype: d2,
            },
        ) => {
            let rank = match (r1, r2) {
                (Some(a), Some(b)) => Some(*a.max(b)),
                _ => None,
            };
            let dtype = match (d1, d2) {
                (Some(a), Some(b)) if a != b => {
                    ctx.error(
                        diags,
                        DiagnosticKind::Mismatch,
                        format!("'{}' operands have different dtypes {} and {}", ctx.op, a, b),
                    );
                    return None;
                }
                (Some(a), _) => Some(*a),
                (None, b) => *b,
            };
            Some(Type::dyn_tensor(rank, dtype))
        }
        (a, b) => {
            ctx.error(
                diags,
                DiagnosticKind::Mismatch,
                format!("'{}' cannot combine {} and {}", ctx.op, a, b),
            );
            None
        }
    }
}

fn infer_shape_of(ctx: &CallContext<'_>, diags: &mut Diagnostics) -> Option<Type> {
    let tys = ctx.typed_args(1, diags)?;
    if !tys[0].is_tensor() {
        ctx.error(
            diags,
            DiagnosticKind::Mismatch,
            format!("'{}' expects a tensor, got {}", ctx.op, tys[0]),
        );
        return None;
    }
    Some(Type::Shape)
}

/// Product of all elements: a rank-0 tensor, or a one-element shape.
fn infer_prod(ctx: &CallContext<'_>, diags: &mut Diagnostics) -> Option<Type> {
    let tys = ctx.typed_args(1, diags)?;
    match tys[0] {
        Type::Shape => Some(Type::Shape),
        Type::DynTensor { dtype, .. } => Some(Type::dyn_tensor(Some(0), *dtype)),
        other => {
            ctx.error(
                diags,
                DiagnosticKind::Mismatch,
                format!("'{}' expects a tensor or shape, got {}", ctx.op, other),
            );
            None
        }
    }
}

fn infer_alloc_tensor(ctx: &CallContext<'_>, diags: &mut Diagnostics) -> Option<Type> {
    let tys = ctx.typed_args(1, diags)?;
    if *tys[0] != Type::Shape {
        ctx.error(
            diags,
            DiagnosticKind::Mismatch,
            format!("'{}' expects a shape, got {}", ctx.op, tys[0]),
        );
        return None;
    }
    let rank = match ctx.args[0].kind() {
        ExprKind::ShapeExpr { dims } => Some(dims.len()),
        _ => None,
    };
    let dtype: Option<DataType> = ctx.attrs.get_dtype(ATTR_DTYPE);
    Some(Type::dyn_tensor(rank, dtype))
}
