// Copyright 2026 The Simlin Authors. All rights reserved.
// Use of this source code is governed by the Apache License,
// Version 2.0, that can be found in the LICENSE file.

//! Generic instruction implementations. Each works for any combination of
//! storage engines and cell types and reads cells through `TypedCells`;
//! plans are computed once from the static types when the instruction is
//! compiled.

pub mod cell_cast;
pub mod concat;
pub mod join;
pub mod lambda;
pub mod map;
pub mod merge;
pub mod reduce;
pub mod rename;
pub mod subspaces;

use tensor_core::value_type::ValueType;

/// Row-major stride of indexed dimension `name` within a dense subspace of
/// `ty`, or 0 when `ty` has no such dimension.
pub(crate) fn dense_stride(ty: &ValueType, name: &str) -> usize {
    let mut stride = 1;
    for dim in ty.indexed_dimensions().iter().rev() {
        if dim.name == name {
            return stride;
        }
        stride *= dim.size as usize;
    }
    0
}

#[test]
fn test_dense_stride() {
    let ty = ValueType::from_spec("tensor(a[2],b{},c[3],d[4])");
    assert_eq!(12, dense_stride(&ty, "a"));
    assert_eq!(4, dense_stride(&ty, "c"));
    assert_eq!(1, dense_stride(&ty, "d"));
    assert_eq!(0, dense_stride(&ty, "b"));
    assert_eq!(0, dense_stride(&ty, "e"));
}
