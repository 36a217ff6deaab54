// Copyright 2026 The Simlin Authors. All rights reserved.
// Use of this source code is governed by the Apache License,
// Version 2.0, that can be found in the LICENSE file.

//! Sum over query rows of the best dot product against any document row.
//!
//! Both inputs hold one mapped dimension and one float vector dimension of
//! length `dp_size`, so every subspace is one row.
//!
//! Each dot product comes whole from the accelerator and is rounded to float
//! once, where the generic join rounds every product to float first. Results
//! agree exactly on integral cells and to within float rounding otherwise.

use crate::accel::Accelerator;
use crate::value::{DoubleValue, TypedCells, Value};

fn rows_f64(cells: TypedCells) -> Vec<f64> {
    cells.iter().collect()
}

pub fn perform_sum_max_dot_product(
    query: &dyn Value,
    document: &dyn Value,
    dp_size: usize,
    accel: &dyn Accelerator,
) -> DoubleValue {
    debug_assert!(dp_size > 1);
    let num_query = query.cells().len() / dp_size;
    let num_document = document.cells().len() / dp_size;
    if num_query == 0 || num_document == 0 {
        return DoubleValue::new(0.0);
    }

    let best_match = |q: usize, dot: &dyn Fn(usize, usize) -> f64| -> f64 {
        (0..num_document)
            .map(|d| dot(q, d) as f32 as f64)
            .fold(f64::NEG_INFINITY, f64::max)
    };

    let sum = match (query.cells(), document.cells()) {
        (TypedCells::Float(q), TypedCells::Float(d)) => {
            let dot = |i: usize, j: usize| {
                accel.dot_product_f32(
                    &q[i * dp_size..(i + 1) * dp_size],
                    &d[j * dp_size..(j + 1) * dp_size],
                )
            };
            (0..num_query).map(|i| best_match(i, &dot)).sum()
        }
        (q, d) => {
            let q = rows_f64(q);
            let d = rows_f64(d);
            let dot = |i: usize, j: usize| {
                accel.dot_product_f64(
                    &q[i * dp_size..(i + 1) * dp_size],
                    &d[j * dp_size..(j + 1) * dp_size],
                )
            };
            (0..num_query).map(|i| best_match(i, &dot)).sum()
        }
    };
    DoubleValue::new(sum)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::accel::SCALAR_ACCELERATOR;
    use crate::fast_value::FastValueBuilderFactory;
    use crate::value::create_value_builder;
    use tensor_core::value_type::ValueType;

    fn rows(spec: &str, rows: &[(&str, [f32; 2])]) -> Box<dyn Value> {
        let ty = ValueType::from_spec(spec);
        let mut builder = create_value_builder::<f32>(&FastValueBuilderFactory, &ty, rows.len());
        for (label, cells) in rows {
            builder.add_subspace(&[*label]).copy_from_slice(cells);
        }
        builder.build()
    }

    #[test]
    fn best_document_row_per_query_row() {
        let query = rows("tensor<float>(qt{},x[2])", &[("0", [1.0, 0.0]), ("1", [0.0, 2.0])]);
        let document = rows(
            "tensor<float>(dt{},x[2])",
            &[("a", [3.0, 1.0]), ("b", [-1.0, 4.0])],
        );
        let result = perform_sum_max_dot_product(query.as_ref(), document.as_ref(), 2, &SCALAR_ACCELERATOR);
        // max(3, -1) + max(2, 8)
        assert_eq!(11.0, result.as_double());
    }

    #[test]
    fn empty_side_gives_zero() {
        let query = rows("tensor<float>(qt{},x[2])", &[("0", [1.0, 0.0])]);
        let document = rows("tensor<float>(dt{},x[2])", &[]);
        let result = perform_sum_max_dot_product(query.as_ref(), document.as_ref(), 2, &SCALAR_ACCELERATOR);
        assert_eq!(0.0, result.as_double());
    }
}
