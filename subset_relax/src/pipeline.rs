//! Pass pipeline: well-formedness check, type inference, then the two memory
//! planning passes.

use crate::config::PipelineConfig;
use crate::diagnostics::Diagnostics;
use crate::error::{PassError, PassResult};
use crate::infer::TypeInference;
use crate::ir::well_formed::WellFormed;
use crate::ir::IrModule;
use crate::memory::{ExplicitAlloc, StorageLower};
use crate::op_registry::OpRegistry;
use crate::pass::{ModulePass, PassStats};

/// Ordered list of module passes
#[derive(Debug)]
pub struct PassPipeline {
    passes: Vec<Box<dyn ModulePass>>,
    halt_on_error: bool,
}

impl Default for PassPipeline {
    fn default() -> Self {
        Self::new()
    }
}

/// Diagnostics and statistics of one pass run by the pipeline
#[derive(Debug)]
pub struct PassReport {
    pub pass: String,
    pub diagnostics: Diagnostics,
    pub stats: PassStats,
}

/// Final module plus one report per pass that ran
#[derive(Debug)]
pub struct PipelineOutput {
    pub module: IrModule,
    pub reports: Vec<PassReport>,
}

impl PipelineOutput {
    /// Number of recoverable diagnostics over all passes
    pub fn error_count(&self) -> usize {
        self.reports.iter().map(|r| r.diagnostics.len()).sum()
    }

    /// Statistics summed over all passes
    pub fn total_stats(&self) -> PassStats {
        let mut total = PassStats::new();
        for report in &self.reports {
            total.merge(&report.stats);
        }
        total
    }

    /// Rendered diagnostics of every pass, each line prefixed by the pass name
    pub fn render_diagnostics(&self) -> String {
        self.reports
            .iter()
            .flat_map(|r| r.diagnostics.iter().map(move |d| format!("{}: {}", r.pass, d)))
            .collect::<Vec<_>>()
            .join("\n")
    }
}

impl PassPipeline {
    /// Create an empty pipeline
    pub fn new() -> Self {
        Self {
            passes: Vec::new(),
            halt_on_error: false,
        }
    }

    /// Create the standard pipeline described by `config`
    pub fn from_config(config: &PipelineConfig) -> Self {
        Self::with_registry(config, OpRegistry::with_defaults())
    }

    /// Standard pipeline with a custom operator registry
    pub fn with_registry(config: &PipelineConfig, registry: OpRegistry) -> Self {
        let mut pipeline = Self::new();
        pipeline.set_halt_on_error(config.halt_on_error);
        pipeline.add_pass(Box::new(WellFormed));
        pipeline.add_pass(Box::new(TypeInference::with_registry(config.mode, registry)));
        if config.run_memory_passes {
            pipeline.add_pass(Box::new(ExplicitAlloc));
            pipeline.add_pass(Box::new(StorageLower::new(config.memory)));
        }
        pipeline
    }

    /// Add a pass to the pipeline
    pub fn add_pass(&mut self, pass: Box<dyn ModulePass>) {
        self.passes.push(pass);
    }

    /// Stop after the first pass that reports a diagnostic
    pub fn set_halt_on_error(&mut self, halt: bool) {
        self.halt_on_error = halt;
    }

    pub fn pass_names(&self) -> Vec<&str> {
        self.passes.iter().map(|p| p.name()).collect()
    }

    /// Run every pass in order on `module`.
    ///
    /// An invariant violation in any pass aborts the pipeline. Recoverable
    /// diagnostics are collected per pass and only stop the pipeline when
    /// `halt_on_error` is set.
    pub fn run(&self, module: &IrModule) -> PassResult<PipelineOutput> {
        let mut current = module.clone();
        let mut reports = Vec::with_capacity(self.passes.len());
        for pass in &self.passes {
            let _span = tracing::debug_span!("pass", name = pass.name()).entered();
            let output = pass.run(&current)?;
            let count = output.diagnostics.len();
            current = output.module;
            reports.push(PassReport {
                pass: pass.name().to_string(),
                diagnostics: output.diagnostics,
                stats: output.stats,
            });
            if self.halt_on_error && count > 0 {
                tracing::debug!(errors = count, "pipeline halted");
                return Err(PassError::Gated {
                    pass: pass.name().to_string(),
                    count,
                });
            }
        }
        Ok(PipelineOutput {
            module: current,
            reports,
        })
    }
}
