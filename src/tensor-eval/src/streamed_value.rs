// Copyright 2026 The Simlin Authors. All rights reserved.
// Use of this source code is governed by the Apache License,
// Version 2.0, that can be found in the LICENSE file.

//! Append-only storage engine. Labels are streamed into one text block in
//! subspace order and every view is a sequential scan of that block.

use smallvec::SmallVec;

use tensor_core::value_type::ValueType;

use crate::value::{
    Cell, Index, IndexView, TypedCells, TypedCellsMut, Value, ValueBuilder,
    impl_value_builder_factory,
};

#[derive(Default)]
struct LabelStream {
    text: String,
    ends: Vec<usize>,
}

impl LabelStream {
    fn push(&mut self, label: &str) {
        self.text.push_str(label);
        self.ends.push(self.text.len());
    }

    fn label(&self, idx: usize) -> &str {
        let start = if idx == 0 { 0 } else { self.ends[idx - 1] };
        &self.text[start..self.ends[idx]]
    }
}

pub struct StreamedIndex {
    num_mapped: usize,
    num_subspaces: usize,
    labels: LabelStream,
}

struct StreamedView<'a> {
    index: &'a StreamedIndex,
    dims: SmallVec<[usize; 4]>,
    key: Vec<String>,
    next: Option<usize>,
}

impl<'a> IndexView<'a> for StreamedView<'a> {
    fn lookup(&mut self, addr: &[&str]) {
        debug_assert_eq!(self.dims.len(), addr.len());
        self.key.clear();
        self.key.extend(addr.iter().map(|label| (*label).to_owned()));
        self.next = Some(0);
    }

    fn next_result(&mut self, addr_out: &mut [&'a str]) -> Option<usize> {
        let index = self.index;
        let n = index.num_mapped;
        let mut subspace = self.next?;
        while subspace < index.num_subspaces {
            let base = subspace * n;
            let matched = self
                .dims
                .iter()
                .zip(self.key.iter())
                .all(|(dim, key)| index.labels.label(base + *dim) == key);
            if matched {
                let mut out = 0;
                for i in 0..n {
                    if !self.dims.contains(&i) {
                        addr_out[out] = index.labels.label(base + i);
                        out += 1;
                    }
                }
                self.next = Some(subspace + 1);
                return Some(subspace);
            }
            subspace += 1;
        }
        self.next = None;
        None
    }
}

impl Index for StreamedIndex {
    fn size(&self) -> usize {
        self.num_subspaces
    }

    fn create_view<'a>(&'a self, dims: &[usize]) -> Box<dyn IndexView<'a> + 'a> {
        Box::new(StreamedView {
            index: self,
            dims: SmallVec::from_slice(dims),
            key: Vec::with_capacity(dims.len()),
            next: None,
        })
    }
}

pub struct StreamedValue<T: Cell> {
    ty: ValueType,
    index: StreamedIndex,
    cells: Vec<T>,
}

impl<T: Cell> Value for StreamedValue<T> {
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

pub struct StreamedValueBuilder<T: Cell> {
    ty: ValueType,
    num_mapped: usize,
    subspace_size: usize,
    num_subspaces: usize,
    labels: LabelStream,
    cells: Vec<T>,
}

impl<T: Cell> StreamedValueBuilder<T> {
    pub fn new(ty: &ValueType, num_mapped: usize, subspace_size: usize, expected: usize) -> Self {
        StreamedValueBuilder {
            ty: ty.clone(),
            num_mapped,
            subspace_size,
            num_subspaces: 0,
            labels: LabelStream {
                text: String::new(),
                ends: Vec::with_capacity(num_mapped * expected),
            },
            cells: Vec::with_capacity(subspace_size * expected),
        }
    }
}

impl<T: Cell> ValueBuilder<T> for StreamedValueBuilder<T> {
    fn add_subspace(&mut self, addr: &[&str]) -> &mut [T] {
        debug_assert_eq!(self.num_mapped, addr.len());
        for label in addr {
            self.labels.push(label);
        }
        self.num_subspaces += 1;
        let start = self.cells.len();
        self.cells.resize(start + self.subspace_size, T::default());
        &mut self.cells[start..]
    }

    fn build(mut self: Box<Self>) -> Box<dyn Value> {
        if self.num_mapped == 0 && self.num_subspaces == 0 {
            self.add_subspace(&[]);
        }
        let this = *self;
        Box::new(StreamedValue {
            ty: this.ty,
            index: StreamedIndex {
                num_mapped: this.num_mapped,
                num_subspaces: this.num_subspaces,
                labels: this.labels,
            },
            cells: this.cells,
        })
    }
}

#[derive(Clone, Copy, Debug, Default)]
pub struct StreamedValueBuilderFactory;

impl_value_builder_factory!(StreamedValueBuilderFactory, StreamedValueBuilder, "streamed");
