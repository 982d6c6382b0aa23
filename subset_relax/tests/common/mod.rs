//! Shared builders for integration tests
// Each test target uses a different subset of these helpers.
#![allow(dead_code)]

use subset_relax::ir::builtins;
use subset_relax::ir::{Binding, BindingBlock, DataType, Expr, ExprKind, IrModule, PrimExpr, Type};
use subset_relax::Diagnostics;

pub fn f32_tensor(rank: usize) -> Type {
    Type::tensor(rank, DataType::float(32))
}

pub fn op_call(name: &str, args: Vec<Expr>) -> Expr {
    Expr::call(Expr::op(name), args)
}

/// `relax.call_dps(shape, extern(kernel), args)`
pub fn call_dps(shape: Expr, kernel: &str, args: Vec<Expr>) -> Expr {
    let packed = if args.len() == 1 {
        args[0].clone()
    } else {
        Expr::tuple(args)
    };
    op_call(
        builtins::CALL_DPS,
        vec![shape, Expr::extern_func(kernel), packed],
    )
}

pub fn const_shape(dims: &[i64]) -> Expr {
    Expr::shape(dims.iter().map(|&d| PrimExpr::Int(d)).collect())
}

pub fn sym_shape(dims: &[&str]) -> Expr {
    Expr::shape(dims.iter().map(|&d| PrimExpr::var(d)).collect())
}

/// Module with a single function `name(params) { blocks; body }`.
pub fn single_function_module(
    name: &str,
    params: Vec<Expr>,
    blocks: Vec<BindingBlock>,
    body: Expr,
) -> IrModule {
    let mut module = IrModule::new();
    module.add_function(name, Expr::function(params, Expr::seq(blocks, body), None));
    module
}

/// `main(x: Tensor[rank=2, float32]) { lv = call_dps(shape, "exp", x); y = add(lv, lv); y }`
/// with both bindings in one pure block.
pub fn dps_module(shape: Expr) -> IrModule {
    let x = Expr::var("x", Some(f32_tensor(2)));
    let lv = Expr::dataflow_var("lv", Some(f32_tensor(2)));
    let y = Expr::var("y", None);
    let block = BindingBlock::pure(vec![
        Binding::var_binding(lv.clone(), call_dps(shape, "exp", vec![x.clone()])),
        Binding::var_binding(y.clone(), op_call(builtins::ADD, vec![lv.clone(), lv])),
    ]);
    single_function_module("main", vec![x], vec![block], y)
}

/// Blocks and body of a function whose body is a sequence.
pub fn function_blocks<'a>(module: &'a IrModule, name: &str) -> (&'a [BindingBlock], &'a Expr) {
    let func = module
        .function(name)
        .unwrap_or_else(|| panic!("no function '{}'", name));
    let ExprKind::Function { body, .. } = func.kind() else {
        panic!("'{}' is not a function", name);
    };
    let ExprKind::SeqExpr { blocks, body } = body.kind() else {
        panic!("body of '{}' is not a sequence", name);
    };
    (blocks, body)
}

/// Callee name of a call to an op or extern function.
pub fn callee_name(expr: &Expr) -> Option<&str> {
    let ExprKind::Call { callee, .. } = expr.kind() else {
        return None;
    };
    match callee.kind() {
        ExprKind::Op { name } => Some(name),
        ExprKind::ExternFunc { global_symbol } => Some(global_symbol),
        _ => None,
    }
}

pub fn call_args(expr: &Expr) -> &[Expr] {
    match expr.kind() {
        ExprKind::Call { args, .. } => args,
        _ => panic!("not a call: {:?}", expr),
    }
}

pub fn messages(diags: &Diagnostics) -> Vec<String> {
    diags.iter().map(|d| d.message.clone()).collect()
}
