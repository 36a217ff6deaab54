// Copyright 2026 The Simlin Authors. All rights reserved.
// Use of this source code is governed by the Apache License,
// Version 2.0, that can be found in the LICENSE file.

#![forbid(unsafe_code)]

pub mod accel;
pub mod aggregator;
pub mod codec;
pub mod fast_sparse_map;
pub mod fast_value;
pub mod function;
mod fused;
pub mod interpreter;
pub mod nested_loop;
mod ops;
pub mod optimizer;
pub mod packed_mixed_tensor;
pub mod reduce_plan;
pub mod simple_value;
pub mod streamed_value;
pub mod value;

#[cfg(test)]
mod test_common;
#[cfg(test)]
mod value_proptest;

pub use self::accel::{Accelerator, SCALAR_ACCELERATOR, SIMD_ACCELERATOR, ScalarAccelerator, SimdAccelerator};
pub use self::aggregator::{ALL_AGGRS, Aggr};
pub use self::codec::{decode_value, encode_to_vec, encode_value};
pub use self::fast_value::FastValueBuilderFactory;
pub use self::function::{JoinFn, MapFn, NodeId, NodeKind, ScalarExpr, TensorFunction};
pub use self::interpreter::{CompileOptions, InterpretedFunction, StackValue};
pub use self::optimizer::{is_stable_rename, optimize};
pub use self::packed_mixed_tensor::PackedMixedTensorBuilderFactory;
pub use self::simple_value::SimpleValueBuilderFactory;
pub use self::streamed_value::StreamedValueBuilderFactory;
pub use self::value::{
    DoubleValue, Value, ValueBuilder, ValueBuilderFactory, copy_value, spec_from_value,
    value_from_spec,
};

/// Every storage engine, for tests and tools that compare them.
pub static ALL_FACTORIES: [&dyn ValueBuilderFactory; 4] = [
    &SimpleValueBuilderFactory,
    &FastValueBuilderFactory,
    &StreamedValueBuilderFactory,
    &PackedMixedTensorBuilderFactory,
];
