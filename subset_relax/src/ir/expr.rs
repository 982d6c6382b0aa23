//! Expression, binding and block nodes.
//!
//! An [`Expr`] is a cheap, clonable handle to an immutable [`ExprNode`]. Every
//! node carries an explicit [`ExprId`]; identity (`same_as`) is id equality and
//! is what memo tables and the module's type table key on. Sharing a handle
//! shares the node, which is how the IR forms a DAG.
//!
//! Nodes are never mutated after construction. Rewrites build new nodes with
//! fresh ids and reuse the handles of unchanged children.

use super::attrs::Attrs;
use super::prim::PrimExpr;
use super::types::Type;
use crate::span::Span;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::rc::Rc;
use std::sync::atomic::{AtomicU64, Ordering};

static NEXT_EXPR_ID: AtomicU64 = AtomicU64::new(1);

/// Identity of an expression node.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct ExprId(u64);

impl ExprId {
    /// Allocate an id never handed out before in this process.
    ///
    /// A 64-bit counter cannot wrap within the lifetime of a process.
    pub fn fresh() -> Self {
        ExprId(NEXT_EXPR_ID.fetch_add(1, Ordering::Relaxed))
    }
}

impl fmt::Display for ExprId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "%{}", self.0)
    }
}

#[derive(Debug, Clone)]
pub enum ExprKind {
    Var {
        name: String,
        annotation: Option<Type>,
    },
    /// Variable local to a pure block.
    DataflowVar {
        name: String,
        annotation: Option<Type>,
    },
    GlobalVar {
        name: String,
    },
    Call {
        callee: Expr,
        args: Vec<Expr>,
        attrs: Attrs,
    },
    Tuple {
        fields: Vec<Expr>,
    },
    TupleGetItem {
        tuple: Expr,
        index: usize,
    },
    If {
        cond: Expr,
        true_branch: Expr,
        false_branch: Expr,
    },
    Function {
        params: Vec<Expr>,
        body: Expr,
        ret_type: Option<Type>,
    },
    SeqExpr {
        blocks: Vec<BindingBlock>,
        body: Expr,
    },
    ShapeExpr {
        dims: Vec<PrimExpr>,
    },
    /// Opaque external target, typed only at its binding site.
    ExternFunc {
        global_symbol: String,
    },
    /// Registered primitive operator.
    Op {
        name: String,
    },
}

#[derive(Debug)]
pub struct ExprNode {
    id: ExprId,
    span: Span,
    kind: ExprKind,
}

#[derive(Clone)]
pub struct Expr(Rc<ExprNode>);

impl fmt::Debug for Expr {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{:?}", self.0.id, self.0.kind)
    }
}

impl Expr {
    pub fn new(kind: ExprKind, span: Span) -> Self {
        Expr(Rc::new(ExprNode {
            id: ExprId::fresh(),
            span,
            kind,
        }))
    }

    pub fn id(&self) -> ExprId {
        self.0.id
    }

    pub fn span(&self) -> Span {
        self.0.span
    }

    pub fn kind(&self) -> &ExprKind {
        &self.0.kind
    }

    /// Identity comparison.
    pub fn same_as(&self, other: &Expr) -> bool {
        self.0.id == other.0.id
    }

    /// New node with the given contents, keeping this node's span.
    pub fn rebuild(&self, kind: ExprKind) -> Expr {
        Expr::new(kind, self.0.span)
    }

    /// Copy of this node under a fresh identity.
    pub fn with_fresh_id(&self) -> Expr {
        Expr::new(self.0.kind.clone(), self.0.span)
    }

    pub fn is_var_like(&self) -> bool {
        matches!(
            self.kind(),
            ExprKind::Var { .. } | ExprKind::DataflowVar { .. }
        )
    }

    pub fn is_dataflow_var(&self) -> bool {
        matches!(self.kind(), ExprKind::DataflowVar { .. })
    }

    /// Name of a `Var`, `DataflowVar` or `GlobalVar`.
    pub fn name_hint(&self) -> Option<&str> {
        match self.kind() {
            ExprKind::Var { name, .. }
            | ExprKind::DataflowVar { name, .. }
            | ExprKind::GlobalVar { name } => Some(name),
            _ => None,
        }
    }

    /// Declared annotation of a `Var` or `DataflowVar`.
    pub fn annotation(&self) -> Option<&Type> {
        match self.kind() {
            ExprKind::Var { annotation, .. } | ExprKind::DataflowVar { annotation, .. } => {
                annotation.as_ref()
            }
            _ => None,
        }
    }

    /// `Some(name)` if this is a call whose callee is the op `name`.
    pub fn call_op_name(&self) -> Option<&str> {
        match self.kind() {
            ExprKind::Call { callee, .. } => match callee.kind() {
                ExprKind::Op { name } => Some(name),
                _ => None,
            },
            _ => None,
        }
    }

    // Constructors. All use a synthetic span; frontends use `Expr::new`.

    pub fn var(name: impl Into<String>, annotation: Option<Type>) -> Self {
        Expr::new(
            ExprKind::Var {
                name: name.into(),
                annotation,
            },
            Span::synthetic(),
        )
    }

    pub fn dataflow_var(name: impl Into<String>, annotation: Option<Type>) -> Self {
        Expr::new(
            ExprKind::DataflowVar {
                name: name.into(),
                annotation,
            },
            Span::synthetic(),
        )
    }

    pub fn global_var(name: impl Into<String>) -> Self {
        Expr::new(ExprKind::GlobalVar { name: name.into() }, Span::synthetic())
    }

    pub fn call(callee: Expr, args: Vec<Expr>) -> Self {
        Self::call_with_attrs(callee, args, Attrs::new())
    }

    pub fn call_with_attrs(callee: Expr, args: Vec<Expr>, attrs: Attrs) -> Self {
        Expr::new(
            ExprKind::Call {
                callee,
                args,
                attrs,
            },
            Span::synthetic(),
        )
    }

    pub fn tuple(fields: Vec<Expr>) -> Self {
        Expr::new(ExprKind::Tuple { fields }, Span::synthetic())
    }

    pub fn tuple_get_item(tuple: Expr, index: usize) -> Self {
        Expr::new(ExprKind::TupleGetItem { tuple, index }, Span::synthetic())
    }

    pub fn if_then_else(cond: Expr, true_branch: Expr, false_branch: Expr) -> Self {
        Expr::new(
            ExprKind::If {
                cond,
                true_branch,
                false_branch,
            },
            Span::synthetic(),
        )
    }

    pub fn function(params: Vec<Expr>, body: Expr, ret_type: Option<Type>) -> Self {
        Expr::new(
            ExprKind::Function {
                params,
                body,
                ret_type,
            },
            Span::synthetic(),
        )
    }

    pub fn seq(blocks: Vec<BindingBlock>, body: Expr) -> Self {
        Expr::new(ExprKind::SeqExpr { blocks, body }, Span::synthetic())
    }

    pub fn shape(dims: Vec<PrimExpr>) -> Self {
        Expr::new(ExprKind::ShapeExpr { dims }, Span::synthetic())
    }

    pub fn extern_func(global_symbol: impl Into<String>) -> Self {
        Expr::new(
            ExprKind::ExternFunc {
                global_symbol: global_symbol.into(),
            },
            Span::synthetic(),
        )
    }

    pub fn op(name: impl Into<String>) -> Self {
        Expr::new(ExprKind::Op { name: name.into() }, Span::synthetic())
    }
}

#[derive(Debug, Clone)]
pub enum Binding {
    VarBinding {
        var: Expr,
        value: Expr,
        span: Span,
    },
    /// Match `value` against a shape pattern, binding the pattern's symbolic
    /// dimensions and optionally a variable holding the refined value.
    MatchShape {
        var: Option<Expr>,
        value: Expr,
        pattern: Vec<PrimExpr>,
        span: Span,
    },
}

impl Binding {
    pub fn var_binding(var: Expr, value: Expr) -> Self {
        Binding::VarBinding {
            var,
            value,
            span: Span::synthetic(),
        }
    }

    pub fn match_shape(var: Option<Expr>, value: Expr, pattern: Vec<PrimExpr>) -> Self {
        Binding::MatchShape {
            var,
            value,
            pattern,
            span: Span::synthetic(),
        }
    }

    pub fn span(&self) -> Span {
        match self {
            Binding::VarBinding { span, .. } | Binding::MatchShape { span, .. } => *span,
        }
    }

    pub fn var(&self) -> Option<&Expr> {
        match self {
            Binding::VarBinding { var, .. } => Some(var),
            Binding::MatchShape { var, .. } => var.as_ref(),
        }
    }

    pub fn value(&self) -> &Expr {
        match self {
            Binding::VarBinding { value, .. } | Binding::MatchShape { value, .. } => value,
        }
    }

    /// True when both bindings refer to the same var and value nodes.
    pub fn same_as(&self, other: &Binding) -> bool {
        match (self, other) {
            (
                Binding::VarBinding {
                    var: v1, value: e1, ..
                },
                Binding::VarBinding {
                    var: v2, value: e2, ..
                },
            ) => v1.same_as(v2) && e1.same_as(e2),
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
                let same_var = match (v1, v2) {
                    (Some(a), Some(b)) => a.same_as(b),
                    (None, None) => true,
                    _ => false,
                };
                same_var && e1.same_as(e2) && p1 == p2
            }
            _ => false,
        }
    }
}

/// Effect tag of a binding block.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Purity {
    /// No externally observable effects; may bind `DataflowVar`s.
    Pure,
    /// Effects allowed; binding order must be preserved.
    General,
}

#[derive(Debug, Clone)]
pub struct BindingBlock {
    pub bindings: Vec<Binding>,
    pub purity: Purity,
    pub span: Span,
}

impl BindingBlock {
    pub fn new(bindings: Vec<Binding>, purity: Purity) -> Self {
        Self {
            bindings,
            purity,
            span: Span::synthetic(),
        }
    }

    pub fn pure(bindings: Vec<Binding>) -> Self {
        Self::new(bindings, Purity::Pure)
    }

    pub fn general(bindings: Vec<Binding>) -> Self {
        Self::new(bindings, Purity::General)
    }

    pub fn is_pure(&self) -> bool {
        self.purity == Purity::Pure
    }

    pub fn same_as(&self, other: &BindingBlock) -> bool {
        self.purity == other.purity
            && self.bindings.len() == other.bindings.len()
            && self
                .bindings
                .iter()
                .zip(&other.bindings)
                .all(|(a, b)| a.same_as(b))
    }
}
