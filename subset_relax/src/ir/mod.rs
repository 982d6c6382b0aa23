//! Graph-shaped tensor IR.
//!
//! - [`expr`]: expression, binding and block nodes
//! - [`types`]: checked types and element data types
//! - [`prim`]: symbolic integers for shape dimensions
//! - [`module`]: global definitions and the checked-type table
//! - [`structural`]: value-based equality and hashing
//! - [`visit`]: memoized rewriting
//! - [`well_formed`]: structural invariant checks
//! - [`serialize`]: flat JSON interchange format

pub mod attrs;
pub mod builtins;
pub mod expr;
pub mod module;
pub mod prim;
pub mod serialize;
pub mod structural;
pub mod types;
pub mod visit;
pub mod well_formed;

pub use attrs::{AttrValue, Attrs};
pub use expr::{Binding, BindingBlock, Expr, ExprId, ExprKind, Purity};
pub use module::{ForeignFunc, IrModule, ModuleEntry, TypeTable};
pub use prim::PrimExpr;
pub use structural::{module_structural_eq, structural_eq, structural_hash};
pub use types::{DataType, DataTypeCode, Type};
pub use visit::ExprMutator;
