// Copyright 2026 The Simlin Authors. All rights reserved.
// Use of this source code is governed by the Apache License,
// Version 2.0, that can be found in the LICENSE file.

//! Expand each int8 cell of a dense value into eight 0/1 cells along its
//! innermost dimension.

use tensor_core::value_type::ValueType;

use crate::value::{Cell, Value, ValueBuilderFactory, create_value_builder};
use crate::with_cell_type;

#[cfg_attr(feature = "debug-derive", derive(Debug))]
pub struct UnpackBitsParam {
    pub res_type: ValueType,
    /// most significant bit first
    pub big_endian: bool,
}

fn unpack_typed<T: Cell>(
    value: &dyn Value,
    param: &UnpackBitsParam,
    factory: &dyn ValueBuilderFactory,
) -> Box<dyn Value> {
    let src = value.cells();
    let mut builder = create_value_builder::<T>(factory, &param.res_type, 1);
    let dst = builder.add_subspace(&[]);
    debug_assert_eq!(src.len() * 8, dst.len());
    let (one, zero) = (T::from_f64(1.0), T::from_f64(0.0));
    for (i, out) in dst.chunks_exact_mut(8).enumerate() {
        let byte = src.get(i) as i8 as u8;
        for (k, cell) in out.iter_mut().enumerate() {
            let bit = if param.big_endian { 7 - k } else { k };
            *cell = if (byte >> bit) & 1 == 1 { one } else { zero };
        }
    }
    builder.build()
}

pub fn perform_unpack_bits(
    value: &dyn Value,
    param: &UnpackBitsParam,
    factory: &dyn ValueBuilderFactory,
) -> Box<dyn Value> {
    with_cell_type!(param.res_type.cell_type(), T => unpack_typed::<T>(value, param, factory))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::simple_value::SimpleValueBuilderFactory;

    #[test]
    fn bit_orders() {
        let factory = SimpleValueBuilderFactory;
        let ty = ValueType::from_spec("tensor<int8>(x[2])");
        let mut builder = create_value_builder::<i8>(&factory, &ty, 1);
        builder.add_subspace(&[]).copy_from_slice(&[0b0000_0101, -128]);
        let input = builder.build();

        let big = UnpackBitsParam {
            res_type: ValueType::from_spec("tensor<int8>(x[16])"),
            big_endian: true,
        };
        let result = perform_unpack_bits(input.as_ref(), &big, &factory);
        let bits: Vec<f64> = result.cells().iter().collect();
        assert_eq!(
            vec![0., 0., 0., 0., 0., 1., 0., 1., 1., 0., 0., 0., 0., 0., 0., 0.],
            bits
        );

        let little = UnpackBitsParam {
            res_type: ValueType::from_spec("tensor<float>(x[16])"),
            big_endian: false,
        };
        let result = perform_unpack_bits(input.as_ref(), &little, &factory);
        let bits: Vec<f64> = result.cells().iter().collect();
        assert_eq!(
            vec![1., 0., 1., 0., 0., 0., 0., 0., 0., 0., 0., 0., 0., 0., 0., 1.],
            bits
        );
    }
}
