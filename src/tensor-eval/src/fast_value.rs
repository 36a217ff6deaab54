// Copyright 2026 The Simlin Authors. All rights reserved.
// Use of this source code is governed by the Apache License,
// Version 2.0, that can be found in the LICENSE file.

//! Production storage engine: addresses interned in a `FastSparseMap`, cells
//! in one contiguous buffer. Views compare label hashes rather than label
//! text.

use smallvec::SmallVec;

use tensor_core::value_type::ValueType;

use crate::fast_sparse_map::{FastSparseMap, NPOS, hash_label, hash_labels};
use crate::value::{
    Cell, Index, IndexView, TypedCells, TypedCellsMut, Value, ValueBuilder,
    impl_value_builder_factory,
};

pub struct FastValueIndex {
    map: FastSparseMap,
}

enum ViewMode {
    Idle,
    Exact(usize),
    Scan(usize),
}

struct FastView<'a> {
    map: &'a FastSparseMap,
    dims: SmallVec<[usize; 4]>,
    key: SmallVec<[u64; 4]>,
    mode: ViewMode,
}

impl<'a> FastView<'a> {
    fn matches(&self, subspace: usize) -> bool {
        let hashes = self.map.addr_hashes(subspace);
        self.dims
            .iter()
            .zip(self.key.iter())
            .all(|(dim, key)| hashes[*dim] == *key)
    }

    fn emit(&self, subspace: usize, addr_out: &mut [&'a str]) {
        let labels = self.map.make_addr(subspace);
        let mut out = 0;
        for (i, label) in labels.iter().enumerate() {
            if !self.dims.contains(&i) {
                addr_out[out] = label.as_str();
                out += 1;
            }
        }
    }
}

impl<'a> IndexView<'a> for FastView<'a> {
    fn lookup(&mut self, addr: &[&str]) {
        debug_assert_eq!(self.dims.len(), addr.len());
        if self.dims.len() == self.map.num_dims() {
            let subspace = self.map.lookup_hash(hash_labels(addr.iter().copied()));
            self.mode = ViewMode::Exact(subspace);
        } else {
            self.key.clear();
            self.key.extend(addr.iter().map(|label| hash_label(label)));
            self.mode = ViewMode::Scan(0);
        }
    }

    fn next_result(&mut self, addr_out: &mut [&'a str]) -> Option<usize> {
        match self.mode {
            ViewMode::Idle => None,
            ViewMode::Exact(subspace) => {
                self.mode = ViewMode::Idle;
                if subspace == NPOS {
                    None
                } else {
                    Some(subspace)
                }
            }
            ViewMode::Scan(start) => {
                for subspace in start..self.map.size() {
                    if self.matches(subspace) {
                        self.emit(subspace, addr_out);
                        self.mode = ViewMode::Scan(subspace + 1);
                        return Some(subspace);
                    }
                }
                self.mode = ViewMode::Idle;
                None
            }
        }
    }
}

impl Index for FastValueIndex {
    fn size(&self) -> usize {
        self.map.size()
    }

    fn create_view<'a>(&'a self, dims: &[usize]) -> Box<dyn IndexView<'a> + 'a> {
        Box::new(FastView {
            map: &self.map,
            dims: SmallVec::from_slice(dims),
            key: SmallVec::new(),
            mode: ViewMode::Idle,
        })
    }
}

pub struct FastValue<T: Cell> {
    ty: ValueType,
    index: FastValueIndex,
    cells: Vec<T>,
}

impl<T: Cell> FastValue<T> {
    pub fn sparse_map(&self) -> &FastSparseMap {
        &self.index.map
    }
}

impl<T: Cell> Value for FastValue<T> {
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

pub struct FastValueBuilder<T: Cell> {
    ty: ValueType,
    subspace_size: usize,
    map: FastSparseMap,
    cells: Vec<T>,
}

impl<T: Cell> FastValueBuilder<T> {
    pub fn new(ty: &ValueType, num_mapped: usize, subspace_size: usize, expected: usize) -> Self {
        FastValueBuilder {
            ty: ty.clone(),
            subspace_size,
            map: FastSparseMap::new(num_mapped, expected),
            cells: Vec::with_capacity(subspace_size * expected),
        }
    }
}

impl<T: Cell> ValueBuilder<T> for FastValueBuilder<T> {
    fn add_subspace(&mut self, addr: &[&str]) -> &mut [T] {
        self.map.add_mapping(addr);
        let start = self.cells.len();
        self.cells.resize(start + self.subspace_size, T::default());
        &mut self.cells[start..]
    }

    fn build(mut self: Box<Self>) -> Box<dyn Value> {
        if self.map.num_dims() == 0 && self.map.size() == 0 {
            self.add_subspace(&[]);
        }
        let this = *self;
        Box::new(FastValue {
            ty: this.ty,
            index: FastValueIndex { map: this.map },
            cells: this.cells,
        })
    }
}

#[derive(Clone, Copy, Debug, Default)]
pub struct FastValueBuilderFactory;

impl_value_builder_factory!(FastValueBuilderFactory, FastValueBuilder, "fast");
