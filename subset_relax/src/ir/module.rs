//! Module: global name → function or foreign definition, plus checked types.

use super::expr::{Binding, Expr, ExprId, ExprKind};
use super::types::Type;
use indexmap::IndexMap;
use rustc_hash::{FxHashMap, FxHashSet};
use serde::{Deserialize, Serialize};

/// Opaque definition the passes never look into (e.g. a lowered kernel).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ForeignFunc {
    pub global_symbol: String,
}

#[derive(Debug, Clone)]
pub enum ModuleEntry {
    /// Always an `ExprKind::Function` node.
    Function(Expr),
    Foreign(ForeignFunc),
}

impl ModuleEntry {
    pub fn as_function(&self) -> Option<&Expr> {
        match self {
            ModuleEntry::Function(func) => Some(func),
            ModuleEntry::Foreign(_) => None,
        }
    }
}

/// Checked types keyed by expression identity.
#[derive(Debug, Clone, Default)]
pub struct TypeTable {
    types: FxHashMap<ExprId, Type>,
}

impl TypeTable {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn get(&self, id: ExprId) -> Option<&Type> {
        self.types.get(&id)
    }

    pub fn contains(&self, id: ExprId) -> bool {
        self.types.contains_key(&id)
    }

    pub fn insert(&mut self, id: ExprId, ty: Type) {
        self.types.insert(id, ty);
    }

    /// Give `to` the type of `from` unless `to` already has one.
    pub fn carry(&mut self, from: ExprId, to: ExprId) {
        if self.types.contains_key(&to) {
            return;
        }
        if let Some(ty) = self.types.get(&from).cloned() {
            self.types.insert(to, ty);
        }
    }

    /// Keep only the entries whose id is in `live`.
    pub fn retain_ids(&mut self, live: &FxHashSet<ExprId>) {
        self.types.retain(|id, _| live.contains(id));
    }

    pub fn len(&self) -> usize {
        self.types.len()
    }

    pub fn is_empty(&self) -> bool {
        self.types.is_empty()
    }
}

#[derive(Debug, Clone, Default)]
pub struct IrModule {
    entries: IndexMap<String, ModuleEntry>,
    types: TypeTable,
}

impl IrModule {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_types(types: TypeTable) -> Self {
        Self {
            entries: IndexMap::new(),
            types,
        }
    }

    pub fn add_function(&mut self, name: impl Into<String>, func: Expr) {
        self.entries.insert(name.into(), ModuleEntry::Function(func));
    }

    pub fn add_foreign(&mut self, name: impl Into<String>, foreign: ForeignFunc) {
        self.entries.insert(name.into(), ModuleEntry::Foreign(foreign));
    }

    pub fn add_entry(&mut self, name: impl Into<String>, entry: ModuleEntry) {
        self.entries.insert(name.into(), entry);
    }

    pub fn get(&self, name: &str) -> Option<&ModuleEntry> {
        self.entries.get(name)
    }

    pub fn function(&self, name: &str) -> Option<&Expr> {
        self.entries.get(name).and_then(ModuleEntry::as_function)
    }

    pub fn contains(&self, name: &str) -> bool {
        self.entries.contains_key(name)
    }

    /// Entries in insertion order.
    pub fn entries(&self) -> impl Iterator<Item = (&String, &ModuleEntry)> {
        self.entries.iter()
    }

    pub fn functions(&self) -> impl Iterator<Item = (&String, &Expr)> {
        self.entries
            .iter()
            .filter_map(|(name, entry)| entry.as_function().map(|f| (name, f)))
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn types(&self) -> &TypeTable {
        &self.types
    }

    pub fn types_mut(&mut self) -> &mut TypeTable {
        &mut self.types
    }

    pub fn checked_type(&self, expr: &Expr) -> Option<&Type> {
        self.types.get(expr.id())
    }

    /// Ids of every node reachable from a function entry.
    pub fn reachable_ids(&self) -> FxHashSet<ExprId> {
        let mut seen = FxHashSet::default();
        let mut stack: Vec<&Expr> = self.functions().map(|(_, f)| f).collect();
        while let Some(expr) = stack.pop() {
            if !seen.insert(expr.id()) {
                continue;
            }
            match expr.kind() {
                ExprKind::Var { .. }
                | ExprKind::DataflowVar { .. }
                | ExprKind::GlobalVar { .. }
                | ExprKind::ShapeExpr { .. }
                | ExprKind::ExternFunc { .. }
                | ExprKind::Op { .. } => {}
                ExprKind::Call { callee, args, .. } => {
                    stack.push(callee);
                    stack.extend(args);
                }
                ExprKind::Tuple { fields } => stack.extend(fields),
                ExprKind::TupleGetItem { tuple, .. } => stack.push(tuple),
                ExprKind::If {
                    cond,
                    true_branch,
                    false_branch,
                } => stack.extend([cond, true_branch, false_branch]),
                ExprKind::Function { params, body, .. } => {
                    stack.extend(params);
                    stack.push(body);
                }
                ExprKind::SeqExpr { blocks, body } => {
                    for binding in blocks.iter().flat_map(|b| &b.bindings) {
                        match binding {
                            Binding::VarBinding { var, value, .. } => {
                                stack.extend([var, value]);
                            }
                            Binding::MatchShape { var, value, .. } => {
                                stack.extend(var);
                                stack.push(value);
                            }
                        }
                    }
                    stack.push(body);
                }
            }
        }
        seen
    }

    /// Drop checked types of nodes no entry reaches any more.
    pub fn prune_types(&mut self) {
        let live = self.reachable_ids();
        self.types.retain_ids(&live);
    }
}
