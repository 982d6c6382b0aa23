//! Best-effort structural type inference.
//!
//! [`TypeInferencer`] walks every function of a module and attaches a checked
//! type to each expression it can resolve. Failures become diagnostics at the
//! smallest enclosing expression; only broken IR invariants abort the pass.
//!
//! Checked types live in the module's [`TypeTable`]. Attaching a type to a node
//! that has none keeps the node; replacing a different prior type produces a
//! new node under a fresh id. Children that were replaced cause their parent to
//! be rebuilt, everything else stays shared with the input.


use crate::diagnostics::{DiagnosticKind, Diagnostics, Fatal};
use crate::error::PassResult;
use crate::ir::builtins;
use crate::ir::{
    Binding, BindingBlock, Expr, ExprId, ExprKind, IrModule, ModuleEntry, Type, TypeTable,
};
use crate::op_registry::{CallContext, OpRegistry};
use crate::pass::{invariant_violation, ModulePass, PassOutput, PassStats};
use crate::span::Span;
use rustc_hash::{FxHashMap, FxHashSet};
use serde::{Deserialize, Serialize};

/// How already-checked expressions are treated.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum InferenceMode {
    /// Infer everything, replacing checked types that changed.
    #[default]
    Normal,
    /// Trust existing checked types and skip those subtrees.
    ReuseChecked,
}

#[derive(Debug)]
pub struct TypeInferencer<'a> {
    module: &'a IrModule,
    registry: &'a OpRegistry,
    mode: InferenceMode,
    /// Output type table, seeded from the input module.
    types: TypeTable,
    memo: FxHashMap<ExprId, Expr>,
    /// Inferred body of each global function already processed.
    globals: FxHashMap<String, Expr>,
    /// Global functions currently being inferred.
    in_progress: FxHashSet<String>,
    current: Option<String>,
    stats: PassStats,
}

impl<'a> TypeInferencer<'a> {
    pub fn new(module: &'a IrModule, registry: &'a OpRegistry, mode: InferenceMode) -> Self {
        Self {
            module,
            registry,
            mode,
            types: module.types().clone(),
            memo: FxHashMap::default(),
            globals: FxHashMap::default(),
            in_progress: FxHashSet::default(),
            current: None,
            stats: PassStats::new(),
        }
    }

    pub fn types(&self) -> &TypeTable {
        &self.types
    }

    pub fn stats(&self) -> &PassStats {
        &self.stats
    }

    /// Checked type of `expr` in the output table.
    pub fn checked_type(&self, expr: &Expr) -> Option<&Type> {
        self.types.get(expr.id())
    }

    /// Infer every function entry; foreign entries are copied.
    pub fn infer_module(mut self, diags: &mut Diagnostics) -> Result<(IrModule, PassStats), Fatal> {
        let module = self.module;
        let mut entries = Vec::with_capacity(module.len());
        for (name, entry) in module.entries() {
            let entry = match entry {
                ModuleEntry::Function(func) => {
                    ModuleEntry::Function(self.infer_global(name, func, diags)?)
                }
                ModuleEntry::Foreign(foreign) => ModuleEntry::Foreign(foreign.clone()),
            };
            entries.push((name.clone(), entry));
        }
        let mut out = IrModule::with_types(self.types);
        for (name, entry) in entries {
            out.add_entry(name, entry);
        }
        out.prune_types();
        Ok((out, self.stats))
    }

    /// Infer a single expression, memoized by node id.
    pub fn infer_expr(&mut self, expr: &Expr, diags: &mut Diagnostics) -> Result<Expr, Fatal> {
        if let Some(done) = self.memo.get(&expr.id()) {
            self.stats.nodes_reused += 1;
            return Ok(done.clone());
        }
        if self.mode == InferenceMode::ReuseChecked && self.module.types().contains(expr.id()) {
            self.stats.nodes_reused += 1;
            self.memo.insert(expr.id(), expr.clone());
            return Ok(expr.clone());
        }
        self.stats.nodes_visited += 1;
        let new = self.infer_node(expr, diags)?;
        if !new.same_as(expr) {
            self.stats.nodes_rebuilt += 1;
            tracing::trace!(old = %expr.id(), new = %new.id(), "node rebuilt");
        }
        self.memo.insert(expr.id(), new.clone());
        Ok(new)
    }

    fn infer_global(
        &mut self,
        name: &str,
        func: &Expr,
        diags: &mut Diagnostics,
    ) -> Result<Expr, Fatal> {
        if let Some(done) = self.globals.get(name) {
            return Ok(done.clone());
        }
        tracing::trace!(global = name, "inferring function");
        self.in_progress.insert(name.to_string());
        let outer = self.current.replace(name.to_string());
        diags.set_context(Some(name));

        let result = self.infer_expr(func, diags);

        diags.set_context(outer.as_deref());
        self.current = outer;
        self.in_progress.remove(name);
        let new = result?;
        self.globals.insert(name.to_string(), new.clone());
        Ok(new)
    }

    /// Apply the type-update rule and return the node callers must use.
    fn update_type(&mut self, expr: &Expr, ty: Option<Type>) -> Expr {
        let Some(ty) = ty else {
            return expr.clone();
        };
        match self.types.get(expr.id()) {
            None => {
                self.types.insert(expr.id(), ty);
                self.stats.types_attached += 1;
                expr.clone()
            }
            Some(prev) if *prev == ty => expr.clone(),
            Some(_) => {
                let new = expr.with_fresh_id();
                self.types.insert(new.id(), ty);
                new
            }
        }
    }

    fn type_of(&self, expr: &Expr) -> Option<Type> {
        self.types.get(expr.id()).cloned()
    }

    fn infer_all(
        &mut self,
        exprs: &[Expr],
        same: &mut bool,
        diags: &mut Diagnostics,
    ) -> Result<Vec<Expr>, Fatal> {
        let mut out = Vec::with_capacity(exprs.len());
        for e in exprs {
            let new = self.infer_expr(e, diags)?;
            *same &= new.same_as(e);
            out.push(new);
        }
        Ok(out)
    }

    fn infer_node(&mut self, expr: &Expr, diags: &mut Diagnostics) -> Result<Expr, Fatal> {
        match expr.kind() {
            ExprKind::Var { annotation, .. } | ExprKind::DataflowVar { annotation, .. } => {
                Ok(self.update_type(expr, annotation.clone()))
            }
            ExprKind::GlobalVar { name } => {
                let ty = self.global_type(name, expr.span(), diags)?;
                Ok(self.update_type(expr, ty))
            }
            ExprKind::ShapeExpr { .. } => Ok(self.update_type(expr, Some(Type::Shape))),
            ExprKind::Op { .. } | ExprKind::ExternFunc { .. } => Ok(expr.clone()),
            ExprKind::Call {
                callee,
                args,
                attrs,
            } => {
                let new_callee = self.infer_expr(callee, diags)?;
                let mut same = new_callee.same_as(callee);
                let new_args = self.infer_all(args, &mut same, diags)?;
                let call = if same {
                    expr.clone()
                } else {
                    expr.rebuild(ExprKind::Call {
                        callee: new_callee,
                        args: new_args,
                        attrs: attrs.clone(),
                    })
                };
                let ty = self.call_type(&call, diags);
                Ok(self.update_type(&call, ty))
            }
            ExprKind::Tuple { fields } => {
                let mut same = true;
                let new_fields = self.infer_all(fields, &mut same, diags)?;
                let mut field_types = Vec::with_capacity(new_fields.len());
                let mut failed = false;
                for (i, field) in new_fields.iter().enumerate() {
                    match self.type_of(field) {
                        Some(ty) => field_types.push(ty),
                        None => {
                            diags.error(
                                DiagnosticKind::UnresolvedType,
                                field.span(),
                                format!("failed to infer the type of tuple field {}", i),
                            );
                            failed = true;
                        }
                    }
                }
                let tuple = if same {
                    expr.clone()
                } else {
                    expr.rebuild(ExprKind::Tuple { fields: new_fields })
                };
                if failed {
                    diags.error(
                        DiagnosticKind::UnresolvedType,
                        expr.span(),
                        "failed to infer the type of the tuple, as some field types could not be inferred",
                    );
                    return Ok(tuple);
                }
                Ok(self.update_type(&tuple, Some(Type::Tuple(field_types))))
            }
            ExprKind::TupleGetItem { tuple, index } => {
                let new_tuple = self.infer_expr(tuple, diags)?;
                let ty = match self.types.get(new_tuple.id()) {
                    Some(Type::Tuple(fields)) => match fields.get(*index) {
                        Some(ty) => Some(ty.clone()),
                        None => {
                            diags.error(
                                DiagnosticKind::Mismatch,
                                expr.span(),
                                format!(
                                    "index {} is out of range for a tuple of {} fields",
                                    index,
                                    fields.len()
                                ),
                            );
                            None
                        }
                    },
                    Some(other) => {
                        diags.error(
                            DiagnosticKind::Mismatch,
                            new_tuple.span(),
                            format!("only tuples can be projected, but got {}", other),
                        );
                        None
                    }
                    None => {
                        diags.error(
                            DiagnosticKind::UnresolvedType,
                            new_tuple.span(),
                            "failed to infer the tuple projection type, as the projected expression could not be typed",
                        );
                        None
                    }
                };
                let item = if new_tuple.same_as(tuple) {
                    expr.clone()
                } else {
                    expr.rebuild(ExprKind::TupleGetItem {
                        tuple: new_tuple,
                        index: *index,
                    })
                };
                Ok(self.update_type(&item, ty))
            }
            ExprKind::If {
                cond,
                true_branch,
                false_branch,
            } => self.infer_if(expr, cond, true_branch, false_branch, diags),
            ExprKind::Function {
                params,
                body,
                ret_type,
            } => self.infer_function(expr, params, body, ret_type.as_ref(), diags),
            ExprKind::SeqExpr { blocks, body } => {
                let mut same = true;
                let mut new_blocks = Vec::with_capacity(blocks.len());
                for block in blocks {
                    let new_block = self.infer_block(block, diags)?;
                    same &= new_block.same_as(block);
                    new_blocks.push(new_block);
                }
                let new_body = self.infer_expr(body, diags)?;
                same &= new_body.same_as(body);
                let body_ty = self.type_of(&new_body);
                let seq = if same {
                    expr.clone()
                } else {
                    expr.rebuild(ExprKind::SeqExpr {
                        blocks: new_blocks,
                        body: new_body.clone(),
                    })
                };
                if body_ty.is_none() {
                    diags.error(
                        DiagnosticKind::UnresolvedType,
                        new_body.span(),
                        "failed to infer a type for the body of the sequence",
                    );
                }
                Ok(self.update_type(&seq, body_ty))
            }
        }
    }

    /// Type of a reference to global `name`.
    fn global_type(
        &mut self,
        name: &str,
        span: Span,
        diags: &mut Diagnostics,
    ) -> Result<Option<Type>, Fatal> {
        let module = self.module;
        match module.get(name) {
            None => {
                diags.error(
                    DiagnosticKind::UndefinedReference,
                    span,
                    format!("no global variable named '{}' in module", name),
                );
                Ok(None)
            }
            Some(ModuleEntry::Foreign(_)) => Ok(None),
            Some(ModuleEntry::Function(func)) if self.in_progress.contains(name) => {
                Ok(provisional_signature(name, func, span, diags))
            }
            Some(ModuleEntry::Function(func)) => {
                let inferred = self.infer_global(name, func, diags)?;
                Ok(self.type_of(&inferred))
            }
        }
    }

    fn call_type(&mut self, call: &Expr, diags: &mut Diagnostics) -> Option<Type> {
        let ExprKind::Call {
            callee,
            args,
            attrs,
        } = call.kind()
        else {
            return None;
        };
        match callee.kind() {
            // Typed at the binding site.
            ExprKind::Op { name } if name == builtins::CALL_DPS => None,
            ExprKind::ExternFunc { .. } => None,
            ExprKind::Op { name } => match self.registry.lookup(name) {
                Some(rule) => {
                    let arg_types: Vec<Option<Type>> = args.iter().map(|a| self.type_of(a)).collect();
                    let ctx = CallContext {
                        op: name,
                        call,
                        args,
                        arg_types: &arg_types,
                        attrs,
                    };
                    rule(&ctx, diags)
                }
                None => {
                    diags.error(
                        DiagnosticKind::UnresolvedType,
                        call.span(),
                        format!("no type inference rule registered for op '{}'", name),
                    );
                    None
                }
            },
            _ => match self.types.get(callee.id()) {
                Some(Type::Func { params, ret }) if params.len() == args.len() => {
                    Some(ret.as_ref().clone())
                }
                Some(Type::Func { params, .. }) => {
                    diags.error(
                        DiagnosticKind::Mismatch,
                        call.span(),
                        format!(
                            "function expects {} argument(s), got {}",
                            params.len(),
                            args.len()
                        ),
                    );
                    None
                }
                Some(other) => {
                    diags.error(
                        DiagnosticKind::Mismatch,
                        call.span(),
                        format!("cannot call a value of type {}", other),
                    );
                    None
                }
                // Already reported, or a foreign reference.
                None if matches!(callee.kind(), ExprKind::GlobalVar { .. }) => None,
                None => {
                    diags.error(
                        DiagnosticKind::UnresolvedType,
                        call.span(),
                        "failed to infer the type of the function being called",
                    );
                    None
                }
            },
        }
    }

    /// Calls whose result type only the binding site can supply.
    fn is_opaque_call(&self, value: &Expr) -> bool {
        let ExprKind::Call { callee, .. } = value.kind() else {
            return false;
        };
        match callee.kind() {
            ExprKind::ExternFunc { .. } => true,
            ExprKind::Op { name } => name == builtins::CALL_DPS,
            ExprKind::GlobalVar { name } => {
                matches!(self.module.get(name), Some(ModuleEntry::Foreign(_)))
            }
            _ => false,
        }
    }

    fn infer_if(
        &mut self,
        expr: &Expr,
        cond: &Expr,
        true_branch: &Expr,
        false_branch: &Expr,
        diags: &mut Diagnostics,
    ) -> Result<Expr, Fatal> {
        let new_cond = self.infer_expr(cond, diags)?;
        let new_true = self.infer_expr(true_branch, diags)?;
        let new_false = self.infer_expr(false_branch, diags)?;
        let node = if new_cond.same_as(cond)
            && new_true.same_as(true_branch)
            && new_false.same_as(false_branch)
        {
            expr.clone()
        } else {
            expr.rebuild(ExprKind::If {
                cond: new_cond.clone(),
                true_branch: new_true.clone(),
                false_branch: new_false.clone(),
            })
        };

        let Some(cond_ty) = self.type_of(&new_cond) else {
            diags.error(
                DiagnosticKind::UnresolvedType,
                new_cond.span(),
                "failed to infer the type of the if condition",
            );
            return Ok(node);
        };
        if let Type::DynTensor { rank, dtype } = &cond_ty {
            if let Some(rank) = rank.filter(|r| *r != 0) {
                diags.error(
                    DiagnosticKind::Mismatch,
                    expr.span(),
                    format!(
                        "if condition should be a rank-0 boolean tensor, but got rank {}",
                        rank
                    ),
                );
                return Ok(node);
            }
            if let Some(dtype) = dtype.filter(|dt| !dt.is_bool()) {
                diags.error(
                    DiagnosticKind::Mismatch,
                    expr.span(),
                    format!(
                        "if condition should be a rank-0 boolean tensor, but got dtype {}",
                        dtype
                    ),
                );
                return Ok(node);
            }
        }

        let Some(true_ty) = self.type_of(&new_true) else {
            diags.error(
                DiagnosticKind::UnresolvedType,
                new_true.span(),
                "could not infer a type for the true branch",
            );
            return Ok(node);
        };
        let Some(false_ty) = self.type_of(&new_false) else {
            diags.error(
                DiagnosticKind::UnresolvedType,
                new_false.span(),
                "could not infer a type for the false branch",
            );
            return Ok(node);
        };

        let ty = if true_ty == false_ty {
            true_ty
        } else {
            match (&true_ty, &false_ty) {
                (
                    Type::DynTensor {
                        rank: r1,
                        dtype: d1,
                    },
                    Type::DynTensor {
                        rank: r2,
                        dtype: d2,
                    },
                ) => Type::dyn_tensor(
                    if r1 == r2 { *r1 } else { None },
                    if d1 == d2 { *d1 } else { None },
                ),
                _ => {
                    diags.error(
                        DiagnosticKind::Mismatch,
                        expr.span(),
                        format!(
                            "incompatible types for true and false branches: {} and {}",
                            true_ty, false_ty
                        ),
                    );
                    return Ok(node);
                }
            }
        };
        Ok(self.update_type(&node, Some(ty)))
    }

    fn infer_function(
        &mut self,
        expr: &Expr,
        params: &[Expr],
        body: &Expr,
        ret_type: Option<&Type>,
        diags: &mut Diagnostics,
    ) -> Result<Expr, Fatal> {
        let mut same = true;
        let mut new_params = Vec::with_capacity(params.len());
        let mut param_types = Vec::with_capacity(params.len());
        for param in params {
            if !param.is_var_like() {
                return Err(diags.emit_fatal(param.span(), "function parameter is not a variable"));
            }
            let new_param = self.infer_expr(param, diags)?;
            let Some(ty) = self.type_of(&new_param) else {
                diags.error(
                    DiagnosticKind::UnresolvedType,
                    param.span(),
                    format!(
                        "function parameter '{}' must carry a type annotation",
                        param.name_hint().unwrap_or_default()
                    ),
                );
                return Ok(expr.clone());
            };
            same &= new_param.same_as(param);
            new_params.push(new_param);
            param_types.push(ty);
        }

        let new_body = self.infer_expr(body, diags)?;
        same &= new_body.same_as(body);
        let node = if same {
            expr.clone()
        } else {
            expr.rebuild(ExprKind::Function {
                params: new_params,
                body: new_body.clone(),
                ret_type: ret_type.cloned(),
            })
        };

        let Some(body_ty) = self.type_of(&new_body) else {
            // A sequence body reports its own failure.
            if !matches!(new_body.kind(), ExprKind::SeqExpr { .. }) {
                diags.error(
                    DiagnosticKind::UnresolvedType,
                    new_body.span(),
                    "failed to infer a type for the function body",
                );
            }
            return Ok(node);
        };
        if let Some(declared) = ret_type {
            if *declared != body_ty {
                diags.error(
                    DiagnosticKind::Mismatch,
                    expr.span(),
                    format!(
                        "declared return type {} does not match inferred type {}",
                        declared, body_ty
                    ),
                );
                return Ok(node);
            }
        }
        Ok(self.update_type(&node, Some(Type::func(param_types, body_ty))))
    }

    fn infer_block(
        &mut self,
        block: &BindingBlock,
        diags: &mut Diagnostics,
    ) -> Result<BindingBlock, Fatal> {
        let mut same = true;
        let mut bindings = Vec::with_capacity(block.bindings.len());
        for binding in &block.bindings {
            let new = self.infer_binding(binding, diags)?;
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

    fn infer_binding(
        &mut self,
        binding: &Binding,
        diags: &mut Diagnostics,
    ) -> Result<Binding, Fatal> {
        match binding {
            Binding::VarBinding { var, value, span } => {
                if !var.is_var_like() {
                    return Err(diags.emit_fatal(*span, "binding target is not a variable"));
                }
                let new_var = self.infer_expr(var, diags)?;
                let mut new_value = self.infer_expr(value, diags)?;
                match (self.type_of(&new_value), self.type_of(&new_var)) {
                    (None, Some(annotated)) if self.is_opaque_call(&new_value) => {
                        new_value = self.update_type(&new_value, Some(annotated));
                    }
                    (None, None) if self.is_opaque_call(&new_value) => {
                        diags.error(
                            DiagnosticKind::UnresolvedType,
                            *span,
                            format!(
                                "opaque call requires an annotated binding for '{}'",
                                var.name_hint().unwrap_or_default()
                            ),
                        );
                    }
                    // Failure already reported where the value was inferred.
                    (None, _) => {}
                    (Some(inferred), Some(annotated)) if inferred != annotated => {
                        diags.error(
                            DiagnosticKind::Mismatch,
                            *span,
                            format!(
                                "mismatch between inferred and annotated variable type: inferred {}, annotated {}",
                                inferred, annotated
                            ),
                        );
                    }
                    (Some(_), Some(_)) => {}
                    (Some(inferred), None) => {
                        // Unset var: attached in place, identity is kept.
                        self.update_type(&new_var, Some(inferred));
                    }
                }
                if new_var.same_as(var) && new_value.same_as(value) {
                    return Ok(binding.clone());
                }
                Ok(Binding::VarBinding {
                    var: new_var,
                    value: new_value,
                    span: *span,
                })
            }
            Binding::MatchShape {
                var,
                value,
                pattern,
                span,
            } => {
                let mut new_var = match var {
                    Some(v) if !v.is_var_like() => {
                        return Err(diags.emit_fatal(*span, "shape match target is not a variable"));
                    }
                    Some(v) => Some(self.infer_expr(v, diags)?),
                    None => None,
                };
                let new_value = self.infer_expr(value, diags)?;
                let rebuilt = |new_var: Option<Expr>, new_value: Expr| {
                    let same_var = match (&new_var, var) {
                        (Some(a), Some(b)) => a.same_as(b),
                        (None, None) => true,
                        _ => false,
                    };
                    if same_var && new_value.same_as(value) {
                        binding.clone()
                    } else {
                        Binding::MatchShape {
                            var: new_var,
                            value: new_value,
                            pattern: pattern.clone(),
                            span: *span,
                        }
                    }
                };

                let Some(value_ty) = self.type_of(&new_value) else {
                    diags.error(
                        DiagnosticKind::UnresolvedType,
                        new_value.span(),
                        "could not infer a type for the value being shape matched",
                    );
                    return Ok(rebuilt(new_var, new_value));
                };
                let refined = match value_ty {
                    Type::DynTensor { rank: None, dtype } => {
                        Type::dyn_tensor(Some(pattern.len()), dtype)
                    }
                    Type::DynTensor {
                        rank: Some(rank), ..
                    } if rank != pattern.len() => {
                        diags.error(
                            DiagnosticKind::Mismatch,
                            *span,
                            format!(
                                "rank mismatch in shape match: value has rank {}, pattern has {} dimension(s)",
                                rank,
                                pattern.len()
                            ),
                        );
                        return Ok(rebuilt(new_var, new_value));
                    }
                    other => other,
                };
                if let Some(v) = new_var.take() {
                    match self.type_of(&v) {
                        Some(annotated) if annotated != refined => {
                            diags.error(
                                DiagnosticKind::Mismatch,
                                *span,
                                format!(
                                    "mismatch between refined type {} and annotated variable type {}",
                                    refined, annotated
                                ),
                            );
                            return Ok(rebuilt(Some(v), new_value));
                        }
                        Some(_) => new_var = Some(v),
                        None => new_var = Some(self.update_type(&v, Some(refined))),
                    }
                }
                Ok(rebuilt(new_var, new_value))
            }
        }
    }
}

/// Signature used for a reference to a function that is still being inferred.
fn provisional_signature(
    name: &str,
    func: &Expr,
    span: Span,
    diags: &mut Diagnostics,
) -> Option<Type> {
    if let ExprKind::Function {
        params,
        ret_type: Some(ret),
        ..
    } = func.kind()
    {
        let params: Option<Vec<Type>> = params.iter().map(|p| p.annotation().cloned()).collect();
        if let Some(params) = params {
            return Some(Type::func(params, ret.clone()));
        }
    }
    diags.error(
        DiagnosticKind::UnresolvedType,
        span,
        format!(
            "recursive reference to '{}' requires annotated parameters and return type",
            name
        ),
    );
    None
}

/// Run type inference over a whole module.
pub fn infer_types(
    module: &IrModule,
    mode: InferenceMode,
    registry: &OpRegistry,
) -> PassResult<PassOutput> {
    tracing::debug!(functions = module.len(), ?mode, "type inference started");
    let mut diagnostics = Diagnostics::new();
    let inferencer = TypeInferencer::new(module, registry, mode);
    match inferencer.infer_module(&mut diagnostics) {
        Ok((module, stats)) => {
            tracing::debug!(
                visited = stats.nodes_visited,
                reused = stats.nodes_reused,
                attached = stats.types_attached,
                rebuilt = stats.nodes_rebuilt,
                diagnostics = diagnostics.len(),
                "type inference finished"
            );
            Ok(PassOutput {
                module,
                diagnostics,
                stats,
            })
        }
        Err(Fatal) => Err(invariant_violation(TypeInference::NAME, diagnostics)),
    }
}

/// Type inference as a pipeline pass.
#[derive(Debug, Clone)]
pub struct TypeInference {
    mode: InferenceMode,
    registry: OpRegistry,
}

impl TypeInference {
    pub const NAME: &'static str = "type_inference";

    pub fn new(mode: InferenceMode) -> Self {
        Self::with_registry(mode, OpRegistry::with_defaults())
    }

    pub fn with_registry(mode: InferenceMode, registry: OpRegistry) -> Self {
        Self { mode, registry }
    }
}

impl ModulePass for TypeInference {
    fn name(&self) -> &str {
        Self::NAME
    }

    fn run(&self, module: &IrModule) -> PassResult<PassOutput> {
        infer_types(module, self.mode, &self.registry)
    }
}
