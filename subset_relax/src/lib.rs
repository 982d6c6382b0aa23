// Library code reports through diagnostics and tracing, never stderr.
// The CLI binary (bin/) may use eprintln!() for user-facing messages.
#![deny(clippy::print_stderr)]

//! Type inference and memory planning for a graph-shaped tensor IR.
//!
//! A module flows through [`PassPipeline`]:
//!
//! ```text
//! IrModule -> well_formed -> type_inference -> explicit_alloc -> storage_lower
//! ```
//!
//! Every pass takes `&IrModule` and returns a fresh module plus recoverable
//! [`Diagnostics`]; invariant violations abort with [`PassError`].

pub mod config;
pub mod diagnostics;
pub mod error;
pub mod infer;
pub mod ir;
pub mod memory;
pub mod op_registry;
pub mod pass;
pub mod pipeline;
pub mod span;

pub use config::{MemoryConfig, PipelineConfig};
pub use diagnostics::{Diagnostic, DiagnosticKind, Diagnostics, Severity};
pub use error::{ConfigError, PassError, PassResult, SerializeError};
pub use infer::{infer_types, InferenceMode, TypeInference};
pub use ir::IrModule;
pub use memory::{explicit_alloc, lower_storage, ExplicitAlloc, StorageLower};
pub use op_registry::OpRegistry;
pub use pass::{ModulePass, PassOutput, PassStats};
pub use pipeline::{PassPipeline, PassReport, PipelineOutput};
pub use span::Span;
