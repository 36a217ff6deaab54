// Copyright 2026 The Simlin Authors. All rights reserved.
// Use of this source code is governed by the Apache License,
// Version 2.0, that can be found in the LICENSE file.

//! Squared euclidean distance between one dense vector and every dense
//! subspace of a mixed value.

use tensor_core::value_type::ValueType;

use crate::accel::Accelerator;
use crate::value::{
    Cell, TypedCells, Value, ValueBuilderFactory, create_value_builder, for_each_subspace,
};
use crate::with_cell_type;

fn distances_typed<T: Cell>(
    mix: &dyn Value,
    vec: &dyn Value,
    res_type: &ValueType,
    accel: &dyn Accelerator,
    factory: &dyn ValueBuilderFactory,
) -> Box<dyn Value> {
    let size = vec.cells().len();
    let distance: Box<dyn Fn(usize) -> f64 + '_> = match (mix.cells(), vec.cells()) {
        (TypedCells::Float(m), TypedCells::Float(v)) => Box::new(move |subspace| {
            accel.squared_euclidean_distance_f32(&m[subspace * size..(subspace + 1) * size], v)
        }),
        (TypedCells::Double(m), TypedCells::Double(v)) => Box::new(move |subspace| {
            accel.squared_euclidean_distance_f64(&m[subspace * size..(subspace + 1) * size], v)
        }),
        (m, v) => {
            let v: Vec<f64> = v.iter().collect();
            Box::new(move |subspace| {
                let m: Vec<f64> = m.slice(subspace * size, size).iter().collect();
                accel.squared_euclidean_distance_f64(&m, &v)
            })
        }
    };
    let mut builder = create_value_builder::<T>(factory, res_type, mix.index().size());
    for_each_subspace(mix, |addr, subspace| {
        builder.add_subspace(addr)[0] = T::from_f64(distance(subspace));
    });
    builder.build()
}

pub fn perform_mixed_l2_distance(
    mix: &dyn Value,
    vec: &dyn Value,
    res_type: &ValueType,
    accel: &dyn Accelerator,
    factory: &dyn ValueBuilderFactory,
) -> Box<dyn Value> {
    with_cell_type!(res_type.cell_type(), T => distances_typed::<T>(mix, vec, res_type, accel, factory))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::accel::SCALAR_ACCELERATOR;
    use crate::streamed_value::StreamedValueBuilderFactory;
    use crate::value::{create_value_builder, spec_from_value};
    use tensor_core::tensor_spec::{TensorSpec, address};

    #[test]
    fn distance_per_subspace() {
        let factory = StreamedValueBuilderFactory;
        let mix_type = ValueType::from_spec("tensor(k{},x[2])");
        let mut builder = create_value_builder::<f64>(&factory, &mix_type, 2);
        builder.add_subspace(&["a"]).copy_from_slice(&[1.0, 2.0]);
        builder.add_subspace(&["b"]).copy_from_slice(&[4.0, -2.0]);
        let mix = builder.build();
        let vec_type = ValueType::from_spec("tensor(x[2])");
        let mut builder = create_value_builder::<f64>(&factory, &vec_type, 1);
        builder.add_subspace(&[]).copy_from_slice(&[1.0, 0.0]);
        let vec = builder.build();

        let res_type = mix_type.mapped_type();
        let result = perform_mixed_l2_distance(
            mix.as_ref(),
            vec.as_ref(),
            &res_type,
            &SCALAR_ACCELERATOR,
            &factory,
        );
        let expected = TensorSpec::new("tensor(k{})")
            .add(address(&[("k", "a".into())]), 4.0)
            .add(address(&[("k", "b".into())]), 13.0);
        assert_eq!(expected, spec_from_value(result.as_ref()));
    }
}
