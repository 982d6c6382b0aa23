//! Explicit allocation and storage lowering on inferred modules.

mod common;

use common::*;
use rustc_hash::FxHashMap;
use subset_relax::ir::attrs::ATTR_DTYPE;
use subset_relax::ir::builtins;
use subset_relax::ir::well_formed::check_well_formed;
use subset_relax::ir::{
    Binding, BindingBlock, DataType, Expr, ExprKind, IrModule, Purity, Type,
};
use subset_relax::memory::evaluate_storage_size;
use subset_relax::{
    explicit_alloc, infer_types, lower_storage, InferenceMode, MemoryConfig, OpRegistry,
};

fn inferred(module: &IrModule) -> IrModule {
    let out = infer_types(module, InferenceMode::Normal, &OpRegistry::with_defaults())
        .expect("inference succeeds");
    assert!(out.diagnostics.is_empty(), "{}", out.diagnostics.render());
    out.module
}

fn lowered(module: &IrModule) -> IrModule {
    let allocated = explicit_alloc(&inferred(module)).expect("explicit allocation succeeds");
    lower_storage(&allocated.module, &MemoryConfig::default())
        .expect("storage lowering succeeds")
        .module
}

/// Size argument of the first storage allocation in `main`.
fn first_storage_size(module: &IrModule) -> Expr {
    let (blocks, _) = function_blocks(module, "main");
    let binding = blocks
        .iter()
        .flat_map(|b| b.bindings.iter())
        .find(|b| callee_name(b.value()) == Some(builtins::VM_ALLOC_STORAGE))
        .expect("a storage allocation");
    call_args(binding.value())[0].clone()
}

#[test]
fn test_allocation_rewrite_after_inference() {
    let out = explicit_alloc(&inferred(&dps_module(const_shape(&[3, 4]))))
        .expect("explicit allocation succeeds");
    assert_eq!(out.stats.bindings_rewritten, 1);

    let (blocks, body) = function_blocks(&out.module, "main");
    assert_eq!(blocks.len(), 1);
    assert_eq!(blocks[0].purity, Purity::General);
    let names: Vec<_> = blocks[0]
        .bindings
        .iter()
        .map(|b| callee_name(b.value()))
        .collect();
    assert_eq!(
        names,
        vec![Some(builtins::ALLOC_TENSOR), Some("exp"), Some(builtins::ADD)]
    );

    let alloc = blocks[0].bindings[0].value();
    let ExprKind::Call { attrs, .. } = alloc.kind() else {
        panic!("not a call");
    };
    assert_eq!(attrs.get_dtype(ATTR_DTYPE), Some(DataType::float(32)));

    // The output buffer is the last argument of the kernel call.
    let alloc_var = blocks[0].bindings[0].var().expect("alloc var");
    let kernel_args = call_args(blocks[0].bindings[1].value());
    assert_eq!(kernel_args.len(), 2);
    assert!(kernel_args[1].same_as(alloc_var));

    // `lv` escapes the pure region and becomes a plain variable.
    let lv = blocks[0].bindings[1].var().expect("lv");
    assert!(matches!(lv.kind(), ExprKind::Var { name, .. } if name == "lv"));
    let add_args = call_args(blocks[0].bindings[2].value());
    assert!(add_args.iter().all(|a| a.same_as(lv)));
    assert!(body.same_as(blocks[0].bindings[2].var().expect("y")));
}

#[test]
fn test_static_storage_size() {
    let module = lowered(&dps_module(const_shape(&[3, 4])));
    let size = first_storage_size(&module);
    let empty = FxHashMap::default();
    assert_eq!(
        evaluate_storage_size(&size, &empty, &FxHashMap::default()),
        Some(3 * 4 * 4)
    );
}

#[test]
fn test_symbolic_storage_size_matches_static() {
    let module = lowered(&dps_module(sym_shape(&["m", "n"])));
    let size = first_storage_size(&module);
    for (m, n) in [(3, 4), (17, 1), (128, 64)] {
        let env: FxHashMap<String, i64> =
            [("m".to_string(), m), ("n".to_string(), n)].into_iter().collect();
        assert_eq!(
            evaluate_storage_size(&size, &env, &FxHashMap::default()),
            Some(m * n * 4)
        );
    }
}

/// Like `dps_module`, but the output shape is the parameter `s`.
fn dynamic_shape_module() -> IrModule {
    let x = Expr::var("x", Some(f32_tensor(2)));
    let s = Expr::var("s", Some(Type::Shape));
    let lv = Expr::dataflow_var("lv", Some(f32_tensor(2)));
    let y = Expr::var("y", None);
    let block = BindingBlock::pure(vec![
        Binding::var_binding(lv.clone(), call_dps(s.clone(), "exp", vec![x.clone()])),
        Binding::var_binding(y.clone(), op_call(builtins::ADD, vec![lv.clone(), lv])),
    ]);
    single_function_module("main", vec![x, s], vec![block], y)
}

#[test]
fn test_dynamic_storage_size_matches_static() {
    let module = lowered(&dynamic_shape_module());

    let size = first_storage_size(&module);
    assert_eq!(callee_name(&size), Some(builtins::MULTIPLY));
    let shapes: FxHashMap<String, Vec<i64>> =
        [("s".to_string(), vec![3, 4])].into_iter().collect();
    assert_eq!(
        evaluate_storage_size(&size, &FxHashMap::default(), &shapes),
        Some(3 * 4 * 4)
    );
}

#[test]
fn test_lowered_module_stays_well_formed() {
    for shape in [const_shape(&[2, 2]), sym_shape(&["a", "b"])] {
        let module = lowered(&dps_module(shape));
        let diags = check_well_formed(&module);
        assert!(diags.is_empty(), "{}", diags.render());
    }
}

#[test]
fn test_checked_types_survive_lowering() {
    let module = lowered(&dps_module(const_shape(&[3, 4])));
    let (blocks, body) = function_blocks(&module, "main");
    assert_eq!(module.checked_type(body), Some(&f32_tensor(2)));

    let sum = blocks[0]
        .bindings
        .iter()
        .map(Binding::value)
        .find(|v| callee_name(v) == Some(builtins::ADD))
        .expect("add binding");
    assert_eq!(module.checked_type(sum), Some(&f32_tensor(2)));

    let view = blocks[0]
        .bindings
        .iter()
        .find(|b| callee_name(b.value()) == Some(builtins::VM_ALLOC_TENSOR))
        .expect("tensor view");
    assert_eq!(
        module.checked_type(view.var().expect("view var")),
        Some(&f32_tensor(2))
    );
}

#[test]
fn test_storage_allocation_is_typed() {
    let module = lowered(&dps_module(const_shape(&[3, 4])));
    let (blocks, _) = function_blocks(&module, "main");
    let storage = &blocks[0].bindings[0];
    assert_eq!(callee_name(storage.value()), Some(builtins::VM_ALLOC_STORAGE));
    let bytes = Type::tensor(1, DataType::uint(8));
    assert_eq!(module.checked_type(storage.value()), Some(&bytes));
    assert_eq!(
        module.checked_type(storage.var().expect("storage var")),
        Some(&bytes)
    );
}

#[test]
fn test_reinference_after_lowering_is_clean() {
    for module in [
        dps_module(const_shape(&[3, 4])),
        dps_module(sym_shape(&["m", "n"])),
        dynamic_shape_module(),
    ] {
        let lowered = lowered(&module);
        let again = infer_types(&lowered, InferenceMode::Normal, &OpRegistry::with_defaults())
            .expect("inference succeeds");
        assert!(again.diagnostics.is_empty(), "{}", again.diagnostics.render());
    }
}

#[test]
fn test_rewritten_nodes_drop_their_types() {
    let module = inferred(&dps_module(const_shape(&[3, 4])));
    let (blocks, _) = function_blocks(&module, "main");
    let old_lv = blocks[0].bindings[0].var().expect("lv").clone();
    let old_call = blocks[0].bindings[0].value().clone();
    assert!(module.checked_type(&old_lv).is_some());
    assert!(module.checked_type(&old_call).is_some());

    let allocated = explicit_alloc(&module)
        .expect("explicit allocation succeeds")
        .module;
    assert!(allocated.checked_type(&old_lv).is_none());
    assert!(allocated.checked_type(&old_call).is_none());
    assert!(allocated.types().len() <= allocated.reachable_ids().len());

    let lowered = lower_storage(&allocated, &MemoryConfig::default())
        .expect("storage lowering succeeds")
        .module;
    assert!(lowered.types().len() <= lowered.reachable_ids().len());
}
