//! Module-level type inference behavior.

mod common;

use common::*;
use pretty_assertions::assert_eq;
use subset_relax::ir::builtins;
use subset_relax::ir::{module_structural_eq, Binding, BindingBlock, DataType, Expr, IrModule, Type};
use subset_relax::{infer_types, DiagnosticKind, InferenceMode, OpRegistry};

fn infer(module: &IrModule, mode: InferenceMode) -> subset_relax::PassOutput {
    infer_types(module, mode, &OpRegistry::with_defaults()).expect("no invariant violation")
}

/// Two functions; `main` calls `helper` through a global reference.
fn two_function_module() -> IrModule {
    let a = Expr::var("a", Some(f32_tensor(1)));
    let helper_body = {
        let r = Expr::var("r", None);
        Expr::seq(
            vec![BindingBlock::general(vec![Binding::var_binding(
                r.clone(),
                op_call(builtins::MULTIPLY, vec![a.clone(), a.clone()]),
            )])],
            r,
        )
    };

    let x = Expr::var("x", Some(f32_tensor(1)));
    let y = Expr::var("y", None);
    let main_body = Expr::seq(
        vec![BindingBlock::general(vec![Binding::var_binding(
            y.clone(),
            Expr::call(Expr::global_var("helper"), vec![x.clone()]),
        )])],
        y,
    );

    let mut module = IrModule::new();
    module.add_function("main", Expr::function(vec![x], main_body, None));
    module.add_function("helper", Expr::function(vec![a], helper_body, None));
    module
}

#[test]
fn test_global_call_resolved_out_of_order() {
    let module = two_function_module();
    let out = infer(&module, InferenceMode::Normal);
    assert!(out.diagnostics.is_empty(), "{}", out.diagnostics.render());

    let sig = Type::func(vec![f32_tensor(1)], f32_tensor(1));
    let main = out.module.function("main").expect("main");
    let helper = out.module.function("helper").expect("helper");
    assert_eq!(out.module.checked_type(main), Some(&sig));
    assert_eq!(out.module.checked_type(helper), Some(&sig));
}

#[test]
fn test_reuse_checked_is_idempotent() {
    let module = two_function_module();
    let first = infer(&module, InferenceMode::Normal);
    assert!(first.diagnostics.is_empty());

    let second = infer(&first.module, InferenceMode::ReuseChecked);
    assert!(second.diagnostics.is_empty());
    assert!(module_structural_eq(&first.module, &second.module));
    for (name, func) in first.module.functions() {
        let again = second.module.function(name).expect("entry kept");
        assert!(again.same_as(func), "'{}' was rebuilt", name);
    }
    assert_eq!(second.stats.types_attached, 0);
    assert_eq!(second.stats.nodes_rebuilt, 0);
}

#[test]
fn test_normal_mode_rerun_keeps_nodes() {
    let module = two_function_module();
    let first = infer(&module, InferenceMode::Normal);
    let second = infer(&first.module, InferenceMode::Normal);
    assert!(module_structural_eq(&first.module, &second.module));
    assert_eq!(second.stats.nodes_rebuilt, 0);
}

#[test]
fn test_inference_is_deterministic() {
    let a = infer(&two_function_module(), InferenceMode::Normal);
    let b = infer(&two_function_module(), InferenceMode::Normal);
    assert!(module_structural_eq(&a.module, &b.module));
    assert_eq!(a.diagnostics.render(), b.diagnostics.render());
    assert_eq!(a.stats, b.stats);
}

#[test]
fn test_undefined_global_reports_once() {
    let x = Expr::var("x", Some(f32_tensor(2)));
    let y = Expr::var("y", None);
    let z = Expr::var("z", None);
    let block = BindingBlock::general(vec![
        Binding::var_binding(y, Expr::call(Expr::global_var("missing"), vec![x.clone()])),
        Binding::var_binding(z.clone(), op_call(builtins::ADD, vec![x.clone(), x.clone()])),
    ]);
    let mut module = single_function_module("main", vec![x], vec![block], z);
    let w = Expr::var("w", Some(f32_tensor(0)));
    module.add_function("other", Expr::function(vec![w.clone()], w, None));

    let out = infer(&module, InferenceMode::Normal);
    assert_eq!(out.diagnostics.len(), 1, "{}", out.diagnostics.render());
    assert_eq!(out.diagnostics.count_kind(DiagnosticKind::UndefinedReference), 1);
    assert_eq!(
        messages(&out.diagnostics),
        vec!["no global variable named 'missing' in module".to_string()]
    );

    // The rest of the module is still inferred.
    let main = out.module.function("main").expect("main");
    assert_eq!(
        out.module.checked_type(main),
        Some(&Type::func(vec![f32_tensor(2)], f32_tensor(2)))
    );
    let other = out.module.function("other").expect("other");
    assert!(out.module.checked_type(other).is_some());
}

#[test]
fn test_failure_recorded_at_smallest_expression() {
    let x = Expr::var("x", Some(f32_tensor(2)));
    let i = Expr::var("i", Some(Type::tensor(2, DataType::int(32))));
    let y = Expr::var("y", None);
    let block = BindingBlock::general(vec![Binding::var_binding(
        y.clone(),
        op_call(builtins::ADD, vec![x.clone(), i.clone()]),
    )]);
    let module = single_function_module("main", vec![x, i], vec![block], y);

    let out = infer(&module, InferenceMode::Normal);
    let kinds: Vec<_> = out.diagnostics.iter().map(|d| d.kind).collect();
    // The mismatch at the call, then the sequence body it leaves untyped.
    assert_eq!(
        kinds,
        vec![DiagnosticKind::Mismatch, DiagnosticKind::UnresolvedType]
    );
    assert!(out
        .diagnostics
        .iter()
        .all(|d| d.context.as_deref() == Some("main")));
}

#[test]
fn test_recursive_function_with_signature() {
    let n = Expr::var("n", Some(f32_tensor(0)));
    let r = Expr::var("r", None);
    let body = Expr::seq(
        vec![BindingBlock::general(vec![Binding::var_binding(
            r.clone(),
            Expr::call(Expr::global_var("loop"), vec![n.clone()]),
        )])],
        r,
    );
    let mut module = IrModule::new();
    module.add_function(
        "loop",
        Expr::function(vec![n], body, Some(f32_tensor(0))),
    );

    let out = infer(&module, InferenceMode::Normal);
    assert!(out.diagnostics.is_empty(), "{}", out.diagnostics.render());
    let func = out.module.function("loop").expect("loop");
    assert_eq!(
        out.module.checked_type(func),
        Some(&Type::func(vec![f32_tensor(0)], f32_tensor(0)))
    );
}

#[test]
fn test_input_module_not_mutated() {
    let module = two_function_module();
    let before = module.types().len();
    let _ = infer(&module, InferenceMode::Normal);
    assert_eq!(module.types().len(), before);
}
