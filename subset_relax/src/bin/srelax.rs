#![deny(clippy::expect_used)]
//! Pass pipeline CLI
//!
//! Reads a module in the flat JSON format, runs the pass pipeline and writes
//! the resulting module.
//!
//! Usage:
//!   cargo run --bin srelax -- input.json -o output.json
//!   cargo run --bin srelax -- input.json --config srelax.toml --stats
//!   cargo run --bin srelax -- input.json --reuse-checked --no-memory

use std::env;
use std::fs;
use std::path::Path;
use std::process;

use subset_relax::ir::serialize;
use subset_relax::{InferenceMode, PassPipeline, PipelineConfig, PipelineOutput};

const VERSION: &str = env!("CARGO_PKG_VERSION");

/// Command-line arguments
#[derive(Debug, Default)]
struct Args {
    /// Input module path
    input_file: Option<String>,
    /// Output module path (stdout if absent)
    output_file: Option<String>,
    /// Pipeline configuration file
    config_file: Option<String>,
    /// Reuse checked types already in the input
    reuse_checked: bool,
    /// Skip explicit allocation and storage lowering
    no_memory: bool,
    /// Show statistics
    show_stats: bool,
    show_help: bool,
    show_version: bool,
}

impl Args {
    fn parse() -> Self {
        let args: Vec<String> = env::args().collect();
        let mut parsed = Args::default();

        let mut i = 1;
        while i < args.len() {
            match args[i].as_str() {
                "-h" | "--help" => parsed.show_help = true,
                "-v" | "--version" => parsed.show_version = true,
                "-o" | "--output" => {
                    i += 1;
                    if i < args.len() {
                        parsed.output_file = Some(args[i].clone());
                    }
                }
                "-c" | "--config" => {
                    i += 1;
                    if i < args.len() {
                        parsed.config_file = Some(args[i].clone());
                    }
                }
                "--reuse-checked" => parsed.reuse_checked = true,
                "--no-memory" => parsed.no_memory = true,
                "--stats" => parsed.show_stats = true,
                arg if !arg.starts_with('-') => {
                    if parsed.input_file.is_none() {
                        parsed.input_file = Some(arg.to_string());
                    }
                }
                _ => {
                    eprintln!("Unknown option: {}", args[i]);
                }
            }
            i += 1;
        }

        parsed
    }
}

fn print_help() {
    println!(
        r#"srelax v{}

USAGE:
    srelax [OPTIONS] <input.json>

OPTIONS:
    -h, --help         Show this help message
    -v, --version      Show version information
    -o, --output       Output file path (default: stdout)
    -c, --config       Pipeline configuration (TOML)
    --reuse-checked    Trust checked types already present in the input
    --no-memory        Stop after type inference
    --stats            Show per-pass statistics

ENVIRONMENT:
    SUBSET_RELAX_DEBUG  Print per-pass statistics to stderr

EXAMPLES:
    srelax model.json -o lowered.json
    srelax model.json --config srelax.toml --stats
"#,
        VERSION
    );
}

fn debug_enabled() -> bool {
    env::var("SUBSET_RELAX_DEBUG").is_ok()
}

fn print_stats(output: &PipelineOutput) {
    println!("Statistics:");
    for report in &output.reports {
        let s = &report.stats;
        println!(
            "  {:<16} visited={} reused={} attached={} rebuilt={} rewritten={} diagnostics={}",
            report.pass,
            s.nodes_visited,
            s.nodes_reused,
            s.types_attached,
            s.nodes_rebuilt,
            s.bindings_rewritten,
            report.diagnostics.len()
        );
    }
}

fn main() {
    let args = Args::parse();

    if args.show_help {
        print_help();
        return;
    }

    if args.show_version {
        println!("srelax v{}", VERSION);
        return;
    }

    let Some(input_file) = args.input_file.as_deref() else {
        eprintln!("Error: No input file provided");
        eprintln!("Use --help for usage information");
        process::exit(1);
    };

    let mut config = match args.config_file.as_deref() {
        Some(path) => PipelineConfig::load(Path::new(path)).unwrap_or_else(|e| {
            eprintln!("Error: {}", e);
            process::exit(1);
        }),
        None => PipelineConfig::default(),
    };
    if args.reuse_checked {
        config.mode = InferenceMode::ReuseChecked;
    }
    if args.no_memory {
        config.run_memory_passes = false;
    }

    let source = fs::read_to_string(input_file).unwrap_or_else(|e| {
        eprintln!("Error reading file '{}': {}", input_file, e);
        process::exit(1);
    });
    let module = serialize::from_json(&source).unwrap_or_else(|e| {
        eprintln!("Error loading module '{}': {}", input_file, e);
        process::exit(1);
    });

    let output = match PassPipeline::from_config(&config).run(&module) {
        Ok(output) => output,
        Err(e) => {
            eprintln!("Pipeline error: {}", e);
            process::exit(1);
        }
    };

    if debug_enabled() {
        for report in &output.reports {
            eprintln!("[srelax] {}: {:?}", report.pass, report.stats);
        }
    }

    let json = serialize::to_json(&output.module).unwrap_or_else(|e| {
        eprintln!("Error serializing module: {}", e);
        process::exit(1);
    });
    match &args.output_file {
        Some(path) => {
            if let Err(e) = fs::write(path, json) {
                eprintln!("Error writing output file '{}': {}", path, e);
                process::exit(1);
            }
            println!("Generated: {}", path);
        }
        None => println!("{}", json),
    }

    if args.show_stats {
        println!();
        print_stats(&output);
    }

    if output.error_count() > 0 {
        eprintln!();
        eprintln!("Diagnostics:");
        eprintln!("{}", output.render_diagnostics());
        process::exit(2);
    }
}
