// Copyright 2026 The Simlin Authors. All rights reserved.
// Use of this source code is governed by the Apache License,
// Version 2.0, that can be found in the LICENSE file.

use tensor_core::value_type::ValueType;

use crate::function::MapFn;
use crate::value::{Cell, Value, ValueBuilderFactory, create_value_builder, for_each_subspace};
use crate::with_cell_type;

#[cfg_attr(feature = "debug-derive", derive(Debug))]
pub struct MapParam {
    pub res_type: ValueType,
    pub function: MapFn,
}

fn map_typed<T: Cell>(
    value: &dyn Value,
    param: &MapParam,
    factory: &dyn ValueBuilderFactory,
) -> Box<dyn Value> {
    let size = param.res_type.dense_subspace_size();
    let cells = value.cells();
    let mut builder = create_value_builder::<T>(factory, &param.res_type, value.index().size());
    for_each_subspace(value, |addr, subspace| {
        let dst = builder.add_subspace(addr);
        for (i, cell) in dst.iter_mut().enumerate() {
            *cell = T::from_f64(param.function.apply(cells.get(subspace * size + i)));
        }
    });
    builder.build()
}

pub fn perform_map(
    value: &dyn Value,
    param: &MapParam,
    factory: &dyn ValueBuilderFactory,
) -> Box<dyn Value> {
    with_cell_type!(param.res_type.cell_type(), T => map_typed::<T>(value, param, factory))
}

#[test]
fn test_map_decays_int8() {
    use crate::simple_value::SimpleValueBuilderFactory;
    use crate::value::{spec_from_value, value_from_spec};
    use tensor_core::tensor_spec::{TensorSpec, address};

    let factory = SimpleValueBuilderFactory;
    let spec = TensorSpec::new("tensor<int8>(x{})")
        .add(address(&[("x", "a".into())]), -3.0)
        .add(address(&[("x", "b".into())]), 4.0);
    let value = value_from_spec(&spec, &factory).unwrap();
    let param = MapParam {
        res_type: value.value_type().map(),
        function: MapFn::Square,
    };
    let result = perform_map(value.as_ref(), &param, &factory);
    let expected = TensorSpec::new("tensor<float>(x{})")
        .add(address(&[("x", "a".into())]), 9.0)
        .add(address(&[("x", "b".into())]), 16.0);
    assert_eq!(expected, spec_from_value(result.as_ref()));
}
