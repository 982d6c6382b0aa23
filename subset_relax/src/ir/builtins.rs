//! Names of the primitives the passes create or recognize.

/// `call_dps(shape, fn, args)`: compute `fn(args...)` into an output of `shape`
/// without saying where the output lives.
pub const CALL_DPS: &str = "relax.call_dps";
/// `alloc_tensor(shape)`: allocate an output tensor, introduced by explicit
/// allocation and consumed by storage lowering.
pub const ALLOC_TENSOR: &str = "relax.builtin.alloc_tensor";

pub const ADD: &str = "relax.add";
pub const SUBTRACT: &str = "relax.subtract";
pub const MULTIPLY: &str = "relax.multiply";
pub const DIVIDE: &str = "relax.divide";
pub const FLOOR_DIVIDE: &str = "relax.floor_divide";
pub const PROD: &str = "relax.prod";
pub const SHAPE_OF: &str = "relax.shape_of";

/// VM entry point allocating raw storage: `(size, alignment, device_type)`.
pub const VM_ALLOC_STORAGE: &str = "vm.builtin.alloc_storage";
/// VM entry point creating a tensor view: `(storage, offset, shape)`.
pub const VM_ALLOC_TENSOR: &str = "vm.builtin.alloc_tensor";
