//! Flat JSON interchange format for modules.
//!
//! # Format
//!
//! ```text
//! {
//!   "version": 1,
//!   "nodes":   [ { "kind": "var", "name": "x", ... }, ... ],
//!   "entries": { "main": { "kind": "function", "node": 7 }, ... },
//!   "types":   [ { "node": 0, "type": { ... } }, ... ]
//! }
//! ```
//!
//! Nodes are stored in post-order: a node only refers to nodes with a smaller
//! index. Every node appears once, so a subexpression shared in the module is
//! shared again after reading it back. Node ids are not stored; reading
//! allocates fresh ones.

use super::attrs::Attrs;
use super::expr::{Binding, BindingBlock, Expr, ExprId, ExprKind, Purity};
use super::module::{ForeignFunc, IrModule, ModuleEntry, TypeTable};
use super::prim::PrimExpr;
use super::types::Type;
use crate::error::SerializeError;
use crate::span::Span;
use indexmap::IndexMap;
use rustc_hash::FxHashMap;
use serde::{Deserialize, Serialize};

/// Current module format version
pub const FORMAT_VERSION: u32 = 1;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ModuleRepr {
    pub version: u32,
    pub nodes: Vec<NodeRepr>,
    pub entries: IndexMap<String, EntryRepr>,
    #[serde(default)]
    pub types: Vec<TypeRecord>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum EntryRepr {
    Function { node: usize },
    Foreign { global_symbol: String },
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TypeRecord {
    pub node: usize,
    #[serde(rename = "type")]
    pub ty: Type,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NodeRepr {
    #[serde(default, skip_serializing_if = "Span::is_synthetic")]
    pub span: Span,
    #[serde(flatten)]
    pub kind: NodeKindRepr,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum NodeKindRepr {
    Var {
        name: String,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        annotation: Option<Type>,
    },
    DataflowVar {
        name: String,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        annotation: Option<Type>,
    },
    GlobalVar {
        name: String,
    },
    Call {
        callee: usize,
        args: Vec<usize>,
        #[serde(default, skip_serializing_if = "Attrs::is_empty")]
        attrs: Attrs,
    },
    Tuple {
        fields: Vec<usize>,
    },
    TupleGetItem {
        tuple: usize,
        index: usize,
    },
    If {
        cond: usize,
        true_branch: usize,
        false_branch: usize,
    },
    Function {
        params: Vec<usize>,
        body: usize,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        ret_type: Option<Type>,
    },
    SeqExpr {
        blocks: Vec<BlockRepr>,
        body: usize,
    },
    ShapeExpr {
        dims: Vec<PrimExpr>,
    },
    ExternFunc {
        global_symbol: String,
    },
    Op {
        name: String,
    },
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BlockRepr {
    pub purity: Purity,
    pub bindings: Vec<BindingRepr>,
    #[serde(default, skip_serializing_if = "Span::is_synthetic")]
    pub span: Span,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum BindingRepr {
    VarBinding {
        var: usize,
        value: usize,
        #[serde(default, skip_serializing_if = "Span::is_synthetic")]
        span: Span,
    },
    MatchShape {
        #[serde(default, skip_serializing_if = "Option::is_none")]
        var: Option<usize>,
        value: usize,
        pattern: Vec<PrimExpr>,
        #[serde(default, skip_serializing_if = "Span::is_synthetic")]
        span: Span,
    },
}

/// Flatten `module` into its node-table form.
pub fn to_repr(module: &IrModule) -> ModuleRepr {
    let mut encoder = Encoder::default();
    let mut entries = IndexMap::with_capacity(module.len());
    for (name, entry) in module.entries() {
        let repr = match entry {
            ModuleEntry::Function(func) => EntryRepr::Function {
                node: encoder.encode(func),
            },
            ModuleEntry::Foreign(foreign) => EntryRepr::Foreign {
                global_symbol: foreign.global_symbol.clone(),
            },
        };
        entries.insert(name.clone(), repr);
    }
    let types = encoder
        .order
        .iter()
        .enumerate()
        .filter_map(|(node, id)| {
            module.types().get(*id).map(|ty| TypeRecord {
                node,
                ty: ty.clone(),
            })
        })
        .collect();
    ModuleRepr {
        version: FORMAT_VERSION,
        nodes: encoder.nodes,
        entries,
        types,
    }
}

/// Rebuild a module from its node-table form.
pub fn from_repr(repr: &ModuleRepr) -> Result<IrModule, SerializeError> {
    if repr.version != FORMAT_VERSION {
        return Err(SerializeError::UnsupportedVersion {
            found: repr.version,
            expected: FORMAT_VERSION,
        });
    }
    let mut exprs: Vec<Expr> = Vec::with_capacity(repr.nodes.len());
    for (index, node) in repr.nodes.iter().enumerate() {
        let expr = Decoder {
            exprs: &exprs,
            index,
        }
        .decode(node)?;
        exprs.push(expr);
    }

    let mut types = TypeTable::new();
    for record in &repr.types {
        let expr = exprs
            .get(record.node)
            .ok_or(SerializeError::UnknownNode(record.node))?;
        types.insert(expr.id(), record.ty.clone());
    }

    let mut module = IrModule::with_types(types);
    for (name, entry) in &repr.entries {
        match entry {
            EntryRepr::Function { node } => {
                let func = exprs.get(*node).ok_or(SerializeError::UnknownNode(*node))?;
                if !matches!(func.kind(), ExprKind::Function { .. }) {
                    return Err(SerializeError::NotAFunction(name.clone()));
                }
                module.add_function(name.clone(), func.clone());
            }
            EntryRepr::Foreign { global_symbol } => module.add_foreign(
                name.clone(),
                ForeignFunc {
                    global_symbol: global_symbol.clone(),
                },
            ),
        }
    }
    Ok(module)
}

pub fn to_json(module: &IrModule) -> Result<String, SerializeError> {
    Ok(serde_json::to_string_pretty(&to_repr(module))?)
}

pub fn from_json(json: &str) -> Result<IrModule, SerializeError> {
    let repr: ModuleRepr = serde_json::from_str(json)?;
    from_repr(&repr)
}

#[derive(Debug, Default)]
struct Encoder {
    nodes: Vec<NodeRepr>,
    /// Node id of each emitted node, by index.
    order: Vec<ExprId>,
    index: FxHashMap<ExprId, usize>,
}

impl Encoder {
    fn encode(&mut self, expr: &Expr) -> usize {
        if let Some(&index) = self.index.get(&expr.id()) {
            return index;
        }
        let kind = match expr.kind() {
            ExprKind::Var { name, annotation } => NodeKindRepr::Var {
                name: name.clone(),
                annotation: annotation.clone(),
            },
            ExprKind::DataflowVar { name, annotation } => NodeKindRepr::DataflowVar {
                name: name.clone(),
                annotation: annotation.clone(),
            },
            ExprKind::GlobalVar { name } => NodeKindRepr::GlobalVar { name: name.clone() },
            ExprKind::Call {
                callee,
                args,
                attrs,
            } => NodeKindRepr::Call {
                callee: self.encode(callee),
                args: self.encode_all(args),
                attrs: attrs.clone(),
            },
            ExprKind::Tuple { fields } => NodeKindRepr::Tuple {
                fields: self.encode_all(fields),
            },
            ExprKind::TupleGetItem { tuple, index } => NodeKindRepr::TupleGetItem {
                tuple: self.encode(tuple),
                index: *index,
            },
            ExprKind::If {
                cond,
                true_branch,
                false_branch,
            } => NodeKindRepr::If {
                cond: self.encode(cond),
                true_branch: self.encode(true_branch),
                false_branch: self.encode(false_branch),
            },
            ExprKind::Function {
                params,
                body,
                ret_type,
            } => NodeKindRepr::Function {
                params: self.encode_all(params),
                body: self.encode(body),
                ret_type: ret_type.clone(),
            },
            ExprKind::SeqExpr { blocks, body } => NodeKindRepr::SeqExpr {
                blocks: blocks.iter().map(|b| self.encode_block(b)).collect(),
                body: self.encode(body),
            },
            ExprKind::ShapeExpr { dims } => NodeKindRepr::ShapeExpr { dims: dims.clone() },
            ExprKind::ExternFunc { global_symbol } => NodeKindRepr::ExternFunc {
                global_symbol: global_symbol.clone(),
            },
            ExprKind::Op { name } => NodeKindRepr::Op { name: name.clone() },
        };
        let index = self.nodes.len();
        self.nodes.push(NodeRepr {
            span: expr.span(),
            kind,
        });
        self.order.push(expr.id());
        self.index.insert(expr.id(), index);
        index
    }

    fn encode_all(&mut self, exprs: &[Expr]) -> Vec<usize> {
        exprs.iter().map(|e| self.encode(e)).collect()
    }

    fn encode_block(&mut self, block: &BindingBlock) -> BlockRepr {
        let bindings = block
            .bindings
            .iter()
            .map(|binding| match binding {
                Binding::VarBinding { var, value, span } => BindingRepr::VarBinding {
                    var: self.encode(var),
                    value: self.encode(value),
                    span: *span,
                },
                Binding::MatchShape {
                    var,
                    value,
                    pattern,
                    span,
                } => BindingRepr::MatchShape {
                    var: var.as_ref().map(|v| self.encode(v)),
                    value: self.encode(value),
                    pattern: pattern.clone(),
                    span: *span,
                },
            })
            .collect();
        BlockRepr {
            purity: block.purity,
            bindings,
            span: block.span,
        }
    }
}

struct Decoder<'a> {
    /// Nodes decoded so far
    exprs: &'a [Expr],
    index: usize,
}

impl Decoder<'_> {
    fn child(&self, child: usize) -> Result<Expr, SerializeError> {
        self.exprs
            .get(child)
            .cloned()
            .ok_or(SerializeError::DanglingNode {
                node: self.index,
                child,
            })
    }

    fn children(&self, children: &[usize]) -> Result<Vec<Expr>, SerializeError> {
        children.iter().map(|&c| self.child(c)).collect()
    }

    fn decode(&self, node: &NodeRepr) -> Result<Expr, SerializeError> {
        let kind = match &node.kind {
            NodeKindRepr::Var { name, annotation } => ExprKind::Var {
                name: name.clone(),
                annotation: annotation.clone(),
            },
            NodeKindRepr::DataflowVar { name, annotation } => ExprKind::DataflowVar {
                name: name.clone(),
                annotation: annotation.clone(),
            },
            NodeKindRepr::GlobalVar { name } => ExprKind::GlobalVar { name: name.clone() },
            NodeKindRepr::Call {
                callee,
                args,
                attrs,
            } => ExprKind::Call {
                callee: self.child(*callee)?,
                args: self.children(args)?,
                attrs: attrs.clone(),
            },
            NodeKindRepr::Tuple { fields } => ExprKind::Tuple {
                fields: self.children(fields)?,
            },
            NodeKindRepr::TupleGetItem { tuple, index } => ExprKind::TupleGetItem {
                tuple: self.child(*tuple)?,
                index: *index,
            },
            NodeKindRepr::If {
                cond,
                true_branch,
                false_branch,
            } => ExprKind::If {
                cond: self.child(*cond)?,
                true_branch: self.child(*true_branch)?,
                false_branch: self.child(*false_branch)?,
            },
            NodeKindRepr::Function {
                params,
                body,
                ret_type,
            } => ExprKind::Function {
                params: self.children(params)?,
                body: self.child(*body)?,
                ret_type: ret_type.clone(),
            },
            NodeKindRepr::SeqExpr { blocks, body } => ExprKind::SeqExpr {
                blocks: blocks
                    .iter()
                    .map(|b| self.decode_block(b))
                    .collect::<Result<_, _>>()?,
                body: self.child(*body)?,
            },
            NodeKindRepr::ShapeExpr { dims } => ExprKind::ShapeExpr { dims: dims.clone() },
            NodeKindRepr::ExternFunc { global_symbol } => ExprKind::ExternFunc {
                global_symbol: global_symbol.clone(),
            },
            NodeKindRepr::Op { name } => ExprKind::Op { name: name.clone() },
        };
        Ok(Expr::new(kind, node.span))
    }

    fn decode_block(&self, block: &BlockRepr) -> Result<BindingBlock, SerializeError> {
        let bindings = block
            .bindings
            .iter()
            .map(|b| self.decode_binding(b))
            .collect::<Result<_, _>>()?;
        Ok(BindingBlock {
            bindings,
            purity: block.purity,
            span: block.span,
        })
    }

    fn decode_binding(&self, binding: &BindingRepr) -> Result<Binding, SerializeError> {
        Ok(match binding {
            BindingRepr::VarBinding { var, value, span } => Binding::VarBinding {
                var: self.child(*var)?,
                value: self.child(*value)?,
                span: *span,
            },
            BindingRepr::MatchShape {
                var,
                value,
                pattern,
                span,
            } => Binding::MatchShape {
                var: var.map(|v| self.child(v)).transpose()?,
                value: self.child(*value)?,
                pattern: pattern.clone(),
                span: *span,
            },
        })
    }
}
