//! Memory planning.
//!
//! Two passes lower the allocation-free compute primitive `relax.call_dps`
//! into explicit storage:
//!
//! 1. [`explicit_alloc`] materializes each output buffer with
//!    `relax.builtin.alloc_tensor` and passes it to the callee.
//! 2. [`lower_storage`] turns each `alloc_tensor` into a VM storage allocation
//!    followed by a tensor view over it.
//!
//! Allocation is an observable effect, so blocks touched by either pass become
//! `General`, and the `DataflowVar`s they bind become plain `Var`s.

mod explicit_alloc;
mod storage_lower;
#[cfg(test)]
mod tests;

pub use explicit_alloc::{explicit_alloc, ExplicitAlloc};
pub use storage_lower::{evaluate_storage_size, lower_storage, storage_size, StorageLower};

use crate::diagnostics::{Diagnostics, Fatal};
use crate::ir::{Expr, ExprKind, ExprMutator, IrModule, ModuleEntry, TypeTable};

/// A rewrite that owns its diagnostics and output type table.
trait Lowering: ExprMutator {
    fn diagnostics(&mut self) -> &mut Diagnostics;
}

/// Rewrite every function body; foreign entries are copied verbatim.
fn rewrite_functions<L: Lowering>(
    module: &IrModule,
    pass: &mut L,
) -> Result<Vec<(String, ModuleEntry)>, Fatal> {
    let mut entries = Vec::with_capacity(module.len());
    for (name, entry) in module.entries() {
        let entry = match entry {
            ModuleEntry::Function(func) => {
                pass.diagnostics().set_context(Some(name));
                ModuleEntry::Function(pass.mutate(func)?)
            }
            ModuleEntry::Foreign(foreign) => ModuleEntry::Foreign(foreign.clone()),
        };
        entries.push((name.clone(), entry));
    }
    pass.diagnostics().set_context(None);
    Ok(entries)
}

fn assemble(entries: Vec<(String, ModuleEntry)>, types: TypeTable) -> IrModule {
    let mut module = IrModule::with_types(types);
    for (name, entry) in entries {
        module.add_entry(name, entry);
    }
    module.prune_types();
    module
}

/// `Var` replacing a `DataflowVar` bound in a block that became `General`.
fn plain_var(var: &Expr, types: &mut TypeTable) -> Option<Expr> {
    let ExprKind::DataflowVar { name, annotation } = var.kind() else {
        return None;
    };
    let plain = Expr::new(
        ExprKind::Var {
            name: name.clone(),
            annotation: annotation.clone(),
        },
        var.span(),
    );
    types.carry(var.id(), plain.id());
    Some(plain)
}
