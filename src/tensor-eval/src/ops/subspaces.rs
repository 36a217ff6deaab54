// Copyright 2026 The Simlin Authors. All rights reserved.
// Use of this source code is governed by the Apache License,
// Version 2.0, that can be found in the LICENSE file.

//! Per subspace evaluation of a nested function.
//!
//! Each dense subspace is handed to the nested function as a borrowed dense
//! value of the source's dense subspace type; a source without indexed
//! dimensions hands over its single cell as a double.

use tensor_core::value_type::ValueType;

use crate::interpreter::InterpretedFunction;
use crate::value::{
    Cell, DenseValueView, DoubleValue, Labels, TypedCells, Value, ValueBuilderFactory,
    create_value_builder, for_each_subspace, subspace_cells,
};
use crate::with_cell_type;

#[cfg_attr(feature = "debug-derive", derive(Debug))]
pub struct SubspacesParam {
    pub res_type: ValueType,
    pub subspace_type: ValueType,
    pub inner: InterpretedFunction,
}

impl SubspacesParam {
    /// Evaluate the nested function on one subspace and pass its cells to
    /// `f`.
    fn with_result<R>(&self, cells: TypedCells, f: impl FnOnce(TypedCells) -> R) -> R {
        if self.subspace_type.is_double() {
            let value = DoubleValue::new(cells.get(0));
            let result = self.inner.run(&[&value]);
            f(result.cells())
        } else {
            let value = DenseValueView::new(&self.subspace_type, cells);
            let result = self.inner.run(&[&value]);
            f(result.cells())
        }
    }
}

fn map_typed<T: Cell>(
    value: &dyn Value,
    param: &SubspacesParam,
    factory: &dyn ValueBuilderFactory,
) -> Box<dyn Value> {
    let mut builder = create_value_builder::<T>(factory, &param.res_type, value.index().size());
    for_each_subspace(value, |addr, subspace| {
        let dst = builder.add_subspace(addr);
        param.with_result(subspace_cells(value, subspace), |cells| {
            for (i, cell) in dst.iter_mut().enumerate() {
                *cell = T::from_f64(cells.get(i));
            }
        });
    });
    builder.build()
}

/// Replace the dense part of every subspace with the result of the nested
/// function, keeping sparse addresses.
pub fn perform_map_subspaces(
    value: &dyn Value,
    param: &SubspacesParam,
    factory: &dyn ValueBuilderFactory,
) -> Box<dyn Value> {
    with_cell_type!(param.res_type.cell_type(), T => map_typed::<T>(value, param, factory))
}

fn filter_typed<T: Cell>(
    value: &dyn Value,
    param: &SubspacesParam,
    factory: &dyn ValueBuilderFactory,
) -> Box<dyn Value> {
    let mut kept: Vec<(Labels, usize)> = vec![];
    for_each_subspace(value, |addr, subspace| {
        let passed = param.with_result(subspace_cells(value, subspace), |cells| cells.get(0));
        if passed != 0.0 {
            kept.push((addr.iter().copied().collect(), subspace));
        }
    });
    let mut builder = create_value_builder::<T>(factory, &param.res_type, kept.len());
    for (addr, subspace) in kept.iter() {
        let src = subspace_cells(value, *subspace);
        for (i, cell) in builder.add_subspace(addr).iter_mut().enumerate() {
            *cell = T::from_f64(src.get(i));
        }
    }
    builder.build()
}

/// Keep the subspaces for which the nested function yields a nonzero
/// scalar. The number of result subspaces is only known after the scan.
pub fn perform_filter_subspaces(
    value: &dyn Value,
    param: &SubspacesParam,
    factory: &dyn ValueBuilderFactory,
) -> Box<dyn Value> {
    with_cell_type!(param.res_type.cell_type(), T => filter_typed::<T>(value, param, factory))
}
