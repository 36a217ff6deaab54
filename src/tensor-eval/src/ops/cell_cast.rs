// Copyright 2026 The Simlin Authors. All rights reserved.
// Use of this source code is governed by the Apache License,
// Version 2.0, that can be found in the LICENSE file.

use tensor_core::value_type::ValueType;

use crate::value::{Cell, Value, ValueBuilderFactory, create_value_builder, for_each_subspace};
use crate::with_cell_type;

fn cast_typed<T: Cell>(
    value: &dyn Value,
    res_type: &ValueType,
    factory: &dyn ValueBuilderFactory,
) -> Box<dyn Value> {
    let size = res_type.dense_subspace_size();
    let cells = value.cells();
    let mut builder = create_value_builder::<T>(factory, res_type, value.index().size());
    for_each_subspace(value, |addr, subspace| {
        let dst = builder.add_subspace(addr);
        for (i, cell) in dst.iter_mut().enumerate() {
            *cell = T::from_f64(cells.get(subspace * size + i));
        }
    });
    builder.build()
}

/// Copy `value` with every cell narrowed or widened to the cell type of
/// `res_type`.
pub fn perform_cell_cast(
    value: &dyn Value,
    res_type: &ValueType,
    factory: &dyn ValueBuilderFactory,
) -> Box<dyn Value> {
    with_cell_type!(res_type.cell_type(), T => cast_typed::<T>(value, res_type, factory))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::streamed_value::StreamedValueBuilderFactory;
    use crate::value::value_from_spec;
    use tensor_core::cell_type::CellType;
    use tensor_core::tensor_spec::{Label, TensorSpec, address};

    #[test]
    fn narrowing_casts() {
        let factory = StreamedValueBuilderFactory;
        let spec = TensorSpec::new("tensor(x[3])")
            .add(address(&[("x", Label::Index(0))]), 1.75)
            .add(address(&[("x", Label::Index(1))]), -300.0)
            .add(address(&[("x", Label::Index(2))]), 1.0 / 3.0);
        let value = value_from_spec(&spec, &factory).unwrap();

        let to_int8 = value.value_type().cell_cast(CellType::Int8);
        let result = perform_cell_cast(value.as_ref(), &to_int8, &factory);
        assert_eq!(CellType::Int8, result.cells().cell_type());
        assert_eq!(vec![1.0, -128.0, 0.0], result.cells().iter().collect::<Vec<_>>());

        let to_float = value.value_type().cell_cast(CellType::Float);
        let result = perform_cell_cast(value.as_ref(), &to_float, &factory);
        assert_eq!((1.0f32 / 3.0) as f64, result.cells().get(2));
    }
}
