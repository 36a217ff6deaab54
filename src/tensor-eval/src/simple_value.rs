// Copyright 2026 The Simlin Authors. All rights reserved.
// Use of this source code is governed by the Apache License,
// Version 2.0, that can be found in the LICENSE file.

//! Reference storage engine: an ordered map from full address to subspace.
//! Views scan the map in label order.

use std::collections::BTreeMap;
use std::collections::btree_map;

use tensor_core::value_type::ValueType;

use crate::value::{
    Cell, Index, IndexView, TypedCells, TypedCellsMut, Value, ValueBuilder,
    impl_value_builder_factory,
};

pub struct SimpleIndex {
    map: BTreeMap<Vec<String>, usize>,
}

struct SimpleView<'a> {
    map: &'a BTreeMap<Vec<String>, usize>,
    dims: Vec<usize>,
    key: Vec<String>,
    iter: Option<btree_map::Iter<'a, Vec<String>, usize>>,
}

impl<'a> IndexView<'a> for SimpleView<'a> {
    fn lookup(&mut self, addr: &[&str]) {
        debug_assert_eq!(self.dims.len(), addr.len());
        self.key.clear();
        self.key.extend(addr.iter().map(|label| (*label).to_owned()));
        self.iter = Some(self.map.iter());
    }

    fn next_result(&mut self, addr_out: &mut [&'a str]) -> Option<usize> {
        let iter = self.iter.as_mut()?;
        'entries: for (labels, subspace) in iter {
            for (dim, key) in self.dims.iter().zip(self.key.iter()) {
                if labels[*dim] != *key {
                    continue 'entries;
                }
            }
            let mut out = 0;
            for (i, label) in labels.iter().enumerate() {
                if !self.dims.contains(&i) {
                    addr_out[out] = label.as_str();
                    out += 1;
                }
            }
            return Some(*subspace);
        }
        None
    }
}

impl Index for SimpleIndex {
    fn size(&self) -> usize {
        self.map.len()
    }

    fn create_view<'a>(&'a self, dims: &[usize]) -> Box<dyn IndexView<'a> + 'a> {
        Box::new(SimpleView {
            map: &self.map,
            dims: dims.to_vec(),
            key: Vec::with_capacity(dims.len()),
            iter: None,
        })
    }
}

pub struct SimpleValue<T: Cell> {
    ty: ValueType,
    index: SimpleIndex,
    cells: Vec<T>,
}

impl<T: Cell> Value for SimpleValue<T> {
    fn value_type(&self) -> &ValueType {
        &self.ty
    }
    fn cells(&self) -> TypedCells<'_> {
        T::wrap(&self.cells)
    }
    fn index(&self) -> &dyn Index {
        &self.index
    }
    fn cells_mut(&mut self) -> Option<TypedCellsMut<'_>> {
        Some(T::wrap_mut(&mut self.cells))
    }
}

pub struct SimpleValueBuilder<T: Cell> {
    ty: ValueType,
    num_mapped: usize,
    subspace_size: usize,
    map: BTreeMap<Vec<String>, usize>,
    cells: Vec<T>,
}

impl<T: Cell> SimpleValueBuilder<T> {
    pub fn new(ty: &ValueType, num_mapped: usize, subspace_size: usize, expected: usize) -> Self {
        SimpleValueBuilder {
            ty: ty.clone(),
            num_mapped,
            subspace_size,
            map: BTreeMap::new(),
            cells: Vec::with_capacity(subspace_size * expected),
        }
    }
}

impl<T: Cell> ValueBuilder<T> for SimpleValueBuilder<T> {
    fn add_subspace(&mut self, addr: &[&str]) -> &mut [T] {
        debug_assert_eq!(self.num_mapped, addr.len());
        let subspace = self.map.len();
        let labels: Vec<String> = addr.iter().map(|label| (*label).to_owned()).collect();
        let prev = self.map.insert(labels, subspace);
        debug_assert!(prev.is_none(), "duplicate sparse address");
        let start = self.cells.len();
        self.cells.resize(start + self.subspace_size, T::default());
        &mut self.cells[start..]
    }

    fn build(mut self: Box<Self>) -> Box<dyn Value> {
        if self.num_mapped == 0 && self.map.is_empty() {
            self.add_subspace(&[]);
        }
        let this = *self;
        Box::new(SimpleValue {
            ty: this.ty,
            index: SimpleIndex { map: this.map },
            cells: this.cells,
        })
    }
}

#[derive(Clone, Copy, Debug, Default)]
pub struct SimpleValueBuilderFactory;

impl_value_builder_factory!(SimpleValueBuilderFactory, SimpleValueBuilder, "simple");

#[cfg(test)]
mod tests {
    use super::*;
    use crate::value::{ValueBuilderFactory, create_value_builder};

    #[test]
    fn views_scan_in_label_order() {
        let ty = ValueType::from_spec("tensor(x{},y{})");
        let factory: &dyn ValueBuilderFactory = &SimpleValueBuilderFactory;
        let mut builder = create_value_builder::<f64>(factory, &ty, 3);
        builder.add_subspace(&["b", "1"])[0] = 1.0;
        builder.add_subspace(&["a", "2"])[0] = 2.0;
        builder.add_subspace(&["a", "1"])[0] = 3.0;
        let value = builder.build();
        assert_eq!(3, value.index().size());

        let mut view = value.index().create_view(&[0]);
        let mut out = [""];
        view.lookup(&["a"]);
        assert_eq!(Some(2), view.next_result(&mut out));
        assert_eq!(["1"], out);
        assert_eq!(Some(1), view.next_result(&mut out));
        assert_eq!(["2"], out);
        assert_eq!(None, view.next_result(&mut out));
        view.lookup(&["c"]);
        assert_eq!(None, view.next_result(&mut out));
    }

    #[test]
    fn dense_builder_pads_single_subspace() {
        let ty = ValueType::from_spec("tensor<float>(x[3])");
        let builder = create_value_builder::<f32>(&SimpleValueBuilderFactory, &ty, 1);
        let value = builder.build();
        assert_eq!(1, value.index().size());
        assert_eq!(TypedCells::Float(&[0.0, 0.0, 0.0]), value.cells());
    }
}
