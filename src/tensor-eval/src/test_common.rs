// Copyright 2026 The Simlin Authors. All rights reserved.
// Use of this source code is governed by the Apache License,
// Version 2.0, that can be found in the LICENSE file.

//! Test fixtures: generated tensor specs and shared type layouts.

use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};

use tensor_core::cell_type::CellType;
use tensor_core::tensor_spec::{Address, Label, TensorSpec};
use tensor_core::value_type::ValueType;

use crate::nested_loop::SubscriptIterator;

const LABELS: [&str; 4] = ["a", "b", "c", "d"];

/// Layouts covering scalar, dense, sparse and mixed shapes, including
/// trivial dimensions.
pub const LAYOUTS: [&str; 8] = [
    "double",
    "tensor(x[3])",
    "tensor(x[2],y[1],z[3])",
    "tensor(x{})",
    "tensor(x{},y{})",
    "tensor(x{},y[3])",
    "tensor(x[2],y{},z[2])",
    "tensor(a{},b[1],c{},d[2])",
];

/// `layout` with its cell type replaced by `cell_type`.
pub fn with_cell_type(layout: &str, cell_type: CellType) -> String {
    let ty = ValueType::from_spec(layout);
    if ty.dimensions().is_empty() {
        return ty.to_spec();
    }
    ty.cell_cast(cell_type).to_spec()
}

/// Spec of type `type_spec` filled with small integers, which every cell
/// type represents exactly. Each mapped dimension draws from up to four
/// labels and roughly a quarter of the label combinations are left out.
pub fn gen_spec(type_spec: &str, seed: u64) -> TensorSpec {
    let ty = ValueType::from_spec(type_spec);
    let mut rng = StdRng::seed_from_u64(seed);
    let mut spec = TensorSpec::new(type_spec);

    let mapped = ty.mapped_dimensions();
    let indexed = ty.indexed_dimensions();
    let mapped_sizes: Vec<usize> = mapped.iter().map(|_| rng.random_range(1..=LABELS.len())).collect();
    let dense_sizes: Vec<usize> = indexed.iter().map(|d| d.size as usize).collect();

    let mut labels = vec![0; mapped.len()];
    let mut sparse = SubscriptIterator::new(&mapped_sizes);
    while sparse.next_into(&mut labels) {
        if !mapped.is_empty() && !rng.random_bool(0.75) {
            continue;
        }
        let mut base = Address::new();
        for (dim, label) in mapped.iter().zip(labels.iter()) {
            base.insert(dim.name.clone(), Label::from(LABELS[*label]));
        }
        let mut dense = vec![0; indexed.len()];
        let mut cells = SubscriptIterator::new(&dense_sizes);
        while cells.next_into(&mut dense) {
            let mut addr = base.clone();
            for (dim, idx) in indexed.iter().zip(dense.iter()) {
                addr.insert(dim.name.clone(), Label::Index(*idx as u32));
            }
            spec.insert(addr, rng.random_range(-5i32..=5) as f64);
        }
    }
    spec
}

#[test]
fn generated_specs_fit_their_type() {
    for layout in LAYOUTS.iter() {
        let spec = gen_spec(layout, 7);
        let ty = spec.value_type();
        let subspace = ty.dense_subspace_size();
        assert_eq!(0, spec.cells().len() % subspace);
        for (addr, value) in spec.cells() {
            assert_eq!(ty.dimensions().len(), addr.len());
            assert!(value.abs() <= 5.0);
        }
        assert_eq!(spec, gen_spec(layout, 7));
    }
    assert_eq!("tensor<int8>(x{},y[3])", with_cell_type("tensor(x{},y[3])", CellType::Int8));
}
