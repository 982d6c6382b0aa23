use super::*;
use crate::config::MemoryConfig;
use crate::error::PassError;
use crate::ir::attrs::{ATTR_ALIGNMENT, ATTR_DTYPE};
use crate::ir::builtins;
use crate::pass::PassOutput;
use crate::ir::{
    AttrValue, Attrs, Binding, BindingBlock, DataType, ForeignFunc, PrimExpr, Purity, Type,
};
use rustc_hash::FxHashMap;

fn f32_tensor(rank: usize) -> Type {
    Type::tensor(rank, DataType::float(32))
}

fn call_dps(shape: Expr, func: Expr, args: Expr) -> Expr {
    Expr::call(Expr::op(builtins::CALL_DPS), vec![shape, func, args])
}

fn alloc_tensor(shape: Expr, dtype: Option<DataType>) -> Expr {
    let mut attrs = Attrs::new();
    if let Some(dtype) = dtype {
        attrs.insert(ATTR_DTYPE, AttrValue::DType(dtype));
    }
    Expr::call_with_attrs(Expr::op(builtins::ALLOC_TENSOR), vec![shape], attrs)
}

fn body_blocks(func: &Expr) -> (&[BindingBlock], &Expr) {
    let ExprKind::Function { body, .. } = func.kind() else {
        panic!("not a function");
    };
    let ExprKind::SeqExpr { blocks, body } = body.kind() else {
        panic!("not a sequence");
    };
    (blocks, body)
}

fn call_parts(expr: &Expr) -> (&Expr, &[Expr], &Attrs) {
    let ExprKind::Call {
        callee,
        args,
        attrs,
    } = expr.kind()
    else {
        panic!("not a call: {expr:?}");
    };
    (callee, args, attrs)
}

fn single_function_module(blocks: Vec<BindingBlock>, body: Expr, params: Vec<Expr>) -> IrModule {
    let mut module = IrModule::new();
    module.add_function("main", Expr::function(params, Expr::seq(blocks, body), None));
    module
}

#[test]
fn test_call_dps_becomes_alloc_and_call() {
    let x = Expr::var("x", Some(f32_tensor(2)));
    let y = Expr::var("y", Some(f32_tensor(2)));
    let shape = Expr::shape(vec![PrimExpr::Int(3), PrimExpr::Int(4)]);
    let kernel = Expr::extern_func("identity");
    let value = call_dps(shape.clone(), kernel.clone(), Expr::tuple(vec![x.clone()]));
    let module = single_function_module(
        vec![BindingBlock::pure(vec![Binding::var_binding(y.clone(), value)])],
        y.clone(),
        vec![x.clone()],
    );

    let out = explicit_alloc(&module).expect("rewrite succeeds");
    assert_eq!(out.stats.bindings_rewritten, 1);
    let main = out.module.function("main").expect("main kept");
    let (blocks, _) = body_blocks(main);
    assert_eq!(blocks.len(), 1);
    assert_eq!(blocks[0].purity, Purity::General);
    assert_eq!(blocks[0].bindings.len(), 2);

    let alloc_var = blocks[0].bindings[0].var().expect("alloc var");
    let alloc = blocks[0].bindings[0].value();
    assert_eq!(alloc.call_op_name(), Some(builtins::ALLOC_TENSOR));
    let (_, alloc_args, alloc_attrs) = call_parts(alloc);
    assert!(alloc_args[0].same_as(&shape));
    assert_eq!(alloc_attrs.get_dtype(ATTR_DTYPE), Some(DataType::float(32)));
    assert_eq!(out.module.checked_type(alloc_var), Some(&f32_tensor(2)));

    assert!(blocks[0].bindings[1].var().expect("y").same_as(&y));
    let (callee, args, _) = call_parts(blocks[0].bindings[1].value());
    assert!(callee.same_as(&kernel));
    assert_eq!(args.len(), 2);
    assert!(args[0].same_as(&x));
    assert!(args[1].same_as(alloc_var));
}

#[test]
fn test_single_argument_is_not_unpacked() {
    let x = Expr::var("x", Some(f32_tensor(1)));
    let y = Expr::var("y", None);
    let value = call_dps(
        Expr::shape(vec![PrimExpr::var("n")]),
        Expr::extern_func("negate"),
        x.clone(),
    );
    let module = single_function_module(
        vec![BindingBlock::pure(vec![Binding::var_binding(y.clone(), value)])],
        y,
        vec![x.clone()],
    );

    let out = explicit_alloc(&module).expect("rewrite succeeds");
    let (blocks, _) = body_blocks(out.module.function("main").expect("main kept"));
    let (_, args, _) = call_parts(blocks[0].bindings[1].value());
    assert!(args[0].same_as(&x));
    // No dtype is known for an unannotated, untyped target.
    let (_, _, alloc_attrs) = call_parts(blocks[0].bindings[0].value());
    assert!(alloc_attrs.is_empty());
}

#[test]
fn test_later_blocks_become_general_and_dataflow_vars_escape() {
    let x = Expr::var("x", Some(f32_tensor(2)));
    let lv = Expr::dataflow_var("lv", Some(f32_tensor(2)));
    let y = Expr::var("y", None);
    let z = Expr::dataflow_var("z", None);
    let w = Expr::var("w", None);
    let shape = Expr::shape(vec![PrimExpr::Int(2), PrimExpr::Int(2)]);
    let first = BindingBlock::pure(vec![
        Binding::var_binding(
            lv.clone(),
            call_dps(shape, Expr::extern_func("exp"), x.clone()),
        ),
        Binding::var_binding(
            y.clone(),
            Expr::call(Expr::op(builtins::ADD), vec![lv.clone(), lv.clone()]),
        ),
    ]);
    let second = BindingBlock::pure(vec![
        Binding::var_binding(
            z.clone(),
            Expr::call(Expr::op(builtins::ADD), vec![y.clone(), y.clone()]),
        ),
        Binding::var_binding(w.clone(), z.clone()),
    ]);
    let module = single_function_module(vec![first, second], w, vec![x]);

    let out = explicit_alloc(&module).expect("rewrite succeeds");
    let (blocks, _) = body_blocks(out.module.function("main").expect("main kept"));
    assert!(blocks.iter().all(|b| b.purity == Purity::General));

    let new_lv = blocks[0].bindings[1].var().expect("lv");
    assert!(!new_lv.is_dataflow_var());
    assert!(new_lv.is_var_like());
    assert_eq!(new_lv.name_hint(), Some("lv"));
    let (_, add_args, _) = call_parts(blocks[0].bindings[2].value());
    assert!(add_args[0].same_as(new_lv));

    let new_z = blocks[1].bindings[0].var().expect("z");
    assert!(!new_z.is_dataflow_var());
    assert!(blocks[1].bindings[1].value().same_as(new_z));
}

#[test]
fn test_general_blocks_and_unrelated_code_untouched() {
    let x = Expr::var("x", Some(f32_tensor(1)));
    let y = Expr::var("y", None);
    let value = call_dps(
        Expr::shape(vec![PrimExpr::Int(8)]),
        Expr::extern_func("relu"),
        x.clone(),
    );
    let module = single_function_module(
        vec![BindingBlock::general(vec![Binding::var_binding(y.clone(), value)])],
        y,
        vec![x],
    );

    let out = explicit_alloc(&module).expect("rewrite succeeds");
    assert_eq!(out.stats.bindings_rewritten, 0);
    let before = module.function("main").expect("input main");
    let after = out.module.function("main").expect("main kept");
    assert!(after.same_as(before));
}

#[test]
fn test_nested_sequences_are_rewritten() {
    let c = Expr::var("c", Some(Type::tensor(0, DataType::bool())));
    let x = Expr::var("x", Some(f32_tensor(1)));
    let y = Expr::var("y", Some(f32_tensor(1)));
    let inner = Expr::seq(
        vec![BindingBlock::pure(vec![Binding::var_binding(
            y.clone(),
            call_dps(
                Expr::shape(vec![PrimExpr::Int(4)]),
                Expr::extern_func("sin"),
                x.clone(),
            ),
        )])],
        y,
    );
    let ite = Expr::if_then_else(c.clone(), inner, x.clone());
    let r = Expr::var("r", None);
    let module = single_function_module(
        vec![BindingBlock::general(vec![Binding::var_binding(r.clone(), ite)])],
        r,
        vec![c, x],
    );

    let out = explicit_alloc(&module).expect("rewrite succeeds");
    assert_eq!(out.stats.bindings_rewritten, 1);
    let (blocks, _) = body_blocks(out.module.function("main").expect("main kept"));
    let ExprKind::If { true_branch, .. } = blocks[0].bindings[0].value().kind() else {
        panic!("not an if");
    };
    let ExprKind::SeqExpr { blocks: inner, .. } = true_branch.kind() else {
        panic!("not a sequence");
    };
    assert_eq!(inner[0].purity, Purity::General);
    assert_eq!(inner[0].bindings.len(), 2);
}

#[test]
fn test_malformed_call_dps_is_fatal() {
    let x = Expr::var("x", Some(f32_tensor(1)));
    let y = Expr::var("y", None);
    let value = Expr::call(
        Expr::op(builtins::CALL_DPS),
        vec![Expr::shape(vec![PrimExpr::Int(1)]), Expr::extern_func("f")],
    );
    let module = single_function_module(
        vec![BindingBlock::pure(vec![Binding::var_binding(y.clone(), value)])],
        y,
        vec![x],
    );

    let err = explicit_alloc(&module).expect_err("must abort");
    assert!(matches!(err, PassError::InvariantViolation { ref pass, .. } if pass == "explicit_alloc"));
}

#[test]
fn test_foreign_entries_copied() {
    let mut module = IrModule::new();
    module.add_foreign(
        "kernel",
        ForeignFunc {
            global_symbol: "kernel_impl".to_string(),
        },
    );
    let out = explicit_alloc(&module).expect("rewrite succeeds");
    assert!(matches!(
        out.module.get("kernel"),
        Some(ModuleEntry::Foreign(f)) if f.global_symbol == "kernel_impl"
    ));
    let out = lower_storage(&out.module, &MemoryConfig::default()).expect("lowering succeeds");
    assert!(out.module.contains("kernel"));
}

fn lowered_single_alloc(
    shape: Expr,
    dtype: Option<DataType>,
    config: &MemoryConfig,
) -> (Expr, PassOutput) {
    let t = Expr::var("t", None);
    let module = single_function_module(
        vec![BindingBlock::general(vec![Binding::var_binding(
            t.clone(),
            alloc_tensor(shape, dtype),
        )])],
        t.clone(),
        vec![],
    );
    let out = lower_storage(&module, config).expect("lowering succeeds");
    (t, out)
}

#[test]
fn test_static_storage_size() {
    let shape = Expr::shape(vec![PrimExpr::Int(3), PrimExpr::Int(4)]);
    let (t, out) = lowered_single_alloc(
        shape.clone(),
        Some(DataType::float(32)),
        &MemoryConfig::default(),
    );
    assert_eq!(out.stats.bindings_rewritten, 1);

    let (blocks, body) = body_blocks(out.module.function("main").expect("main kept"));
    assert_eq!(blocks[0].bindings.len(), 2);
    assert!(body.same_as(&t));

    let storage = blocks[0].bindings[0].var().expect("storage var");
    let (callee, args, attrs) = call_parts(blocks[0].bindings[0].value());
    assert!(matches!(
        callee.kind(),
        ExprKind::ExternFunc { global_symbol } if global_symbol == builtins::VM_ALLOC_STORAGE
    ));
    let empty = FxHashMap::default();
    assert_eq!(evaluate_storage_size(&args[0], &empty, &FxHashMap::default()), Some(48));
    assert!(matches!(args[0].kind(), ExprKind::ShapeExpr { dims } if dims == &vec![PrimExpr::Int(48)]));
    assert!(matches!(args[1].kind(), ExprKind::ShapeExpr { dims } if dims == &vec![PrimExpr::Int(64)]));
    assert!(matches!(args[2].kind(), ExprKind::ShapeExpr { dims } if dims == &vec![PrimExpr::Int(1)]));
    assert_eq!(attrs.get_int(ATTR_ALIGNMENT), Some(64));

    // The allocated variable now names the view.
    assert!(blocks[0].bindings[1].var().expect("t").same_as(&t));
    let (callee, args, _) = call_parts(blocks[0].bindings[1].value());
    assert!(matches!(
        callee.kind(),
        ExprKind::ExternFunc { global_symbol } if global_symbol == builtins::VM_ALLOC_TENSOR
    ));
    assert!(args[0].same_as(storage));
    assert!(args[2].same_as(&shape));
}

#[test]
fn test_default_dtype_and_policy_from_config() {
    let config = MemoryConfig {
        alignment: 128,
        device_type: 2,
        default_dtype: DataType::float(16),
    };
    let shape = Expr::shape(vec![PrimExpr::Int(3), PrimExpr::Int(4)]);
    let (_, out) = lowered_single_alloc(shape, None, &config);
    let (blocks, _) = body_blocks(out.module.function("main").expect("main kept"));
    let (_, args, attrs) = call_parts(blocks[0].bindings[0].value());
    assert!(matches!(args[0].kind(), ExprKind::ShapeExpr { dims } if dims == &vec![PrimExpr::Int(24)]));
    assert!(matches!(args[1].kind(), ExprKind::ShapeExpr { dims } if dims == &vec![PrimExpr::Int(128)]));
    assert_eq!(attrs.get_dtype(ATTR_DTYPE), Some(DataType::float(16)));
}

#[test]
fn test_symbolic_size_matches_static_formula() {
    let shape = Expr::shape(vec![PrimExpr::var("n"), PrimExpr::var("m")]);
    for dtype in [DataType::float(32), DataType::float(16), DataType::bool()] {
        let size = storage_size(&shape, dtype);
        for (n, m) in [(1, 1), (5, 7), (64, 3)] {
            let env: FxHashMap<String, i64> =
                [("n".to_string(), n), ("m".to_string(), m)].into_iter().collect();
            assert_eq!(
                evaluate_storage_size(&size, &env, &FxHashMap::default()),
                Some(n * m * dtype.storage_bytes()),
                "{dtype} with n={n}, m={m}"
            );
        }
    }
}

#[test]
fn test_dynamic_size_matches_static_formula() {
    let s = Expr::var("s", Some(Type::Shape));
    let size = storage_size(&s, DataType::float(32));
    assert_eq!(size.call_op_name(), Some(builtins::MULTIPLY));
    let shapes: FxHashMap<String, Vec<i64>> = [("s".to_string(), vec![5, 7])].into_iter().collect();
    assert_eq!(
        evaluate_storage_size(&size, &FxHashMap::default(), &shapes),
        Some(5 * 7 * 4)
    );
}

#[test]
fn test_alloc_without_shape_is_fatal() {
    let t = Expr::var("t", None);
    let value = Expr::call(Expr::op(builtins::ALLOC_TENSOR), vec![]);
    let module = single_function_module(
        vec![BindingBlock::general(vec![Binding::var_binding(t.clone(), value)])],
        t,
        vec![],
    );
    let err = lower_storage(&module, &MemoryConfig::default()).expect_err("must abort");
    match err {
        PassError::InvariantViolation { pass, rendered, .. } => {
            assert_eq!(pass, "storage_lower");
            assert!(rendered.contains("expects a single shape argument, got 0"));
        }
        other => panic!("unexpected error: {other:?}"),
    }
}

#[test]
fn test_explicit_alloc_then_storage_lower() {
    let x = Expr::var("x", Some(f32_tensor(2)));
    let y = Expr::var("y", Some(f32_tensor(2)));
    let value = call_dps(
        Expr::shape(vec![PrimExpr::Int(2), PrimExpr::Int(8)]),
        Expr::extern_func("copy"),
        x.clone(),
    );
    let module = single_function_module(
        vec![BindingBlock::pure(vec![Binding::var_binding(y.clone(), value)])],
        y,
        vec![x],
    );

    let allocated = explicit_alloc(&module).expect("rewrite succeeds");
    let lowered =
        lower_storage(&allocated.module, &MemoryConfig::default()).expect("lowering succeeds");
    let (blocks, _) = body_blocks(lowered.module.function("main").expect("main kept"));
    // storage, view, call
    assert_eq!(blocks[0].bindings.len(), 3);
    let (_, args, _) = call_parts(blocks[0].bindings[0].value());
    assert_eq!(
        evaluate_storage_size(&args[0], &FxHashMap::default(), &FxHashMap::default()),
        Some(2 * 8 * 4)
    );
    let view_var = blocks[0].bindings[1].var().expect("view var");
    let (_, call_args, _) = call_parts(blocks[0].bindings[2].value());
    assert!(call_args[1].same_as(view_var));
}
