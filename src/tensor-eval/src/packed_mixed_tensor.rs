// Copyright 2026 The Simlin Authors. All rights reserved.
// Use of this source code is governed by the Apache License,
// Version 2.0, that can be found in the LICENSE file.

//! Memory compact storage engine.
//!
//! Labels are interned into one sorted table and every address is stored as a
//! run of `u32` label ids. Address runs are kept sorted, so comparing ids
//! compares labels, and exact lookups are a binary search. Cells stay in the
//! order subspaces were added; each sorted entry records its subspace.

use std::cmp::Ordering;

use smallvec::SmallVec;

use tensor_core::value_type::ValueType;

use crate::value::{
    Cell, Index, IndexView, TypedCells, TypedCellsMut, Value, ValueBuilder,
    impl_value_builder_factory,
};

pub struct PackedMappings {
    num_mapped: usize,
    labels: Vec<String>,
    // num_mapped label ids per entry, entries in ascending address order
    ids: Vec<u32>,
    subspaces: Vec<u32>,
}

impl PackedMappings {
    fn size(&self) -> usize {
        self.subspaces.len()
    }

    fn entry(&self, idx: usize) -> &[u32] {
        &self.ids[idx * self.num_mapped..(idx + 1) * self.num_mapped]
    }

    fn label_id(&self, label: &str) -> Option<u32> {
        self.labels
            .binary_search_by(|candidate| candidate.as_str().cmp(label))
            .ok()
            .map(|id| id as u32)
    }

    fn find(&self, key: &[u32]) -> Option<usize> {
        let (mut lo, mut hi) = (0, self.size());
        while lo < hi {
            let mid = lo + (hi - lo) / 2;
            match self.entry(mid).cmp(key) {
                Ordering::Less => lo = mid + 1,
                Ordering::Greater => hi = mid,
                Ordering::Equal => return Some(mid),
            }
        }
        None
    }
}

enum PackedViewMode {
    Idle,
    Exact(Option<usize>),
    Scan(usize),
}

struct PackedView<'a> {
    mappings: &'a PackedMappings,
    dims: SmallVec<[usize; 4]>,
    key: SmallVec<[u32; 4]>,
    mode: PackedViewMode,
}

impl<'a> IndexView<'a> for PackedView<'a> {
    fn lookup(&mut self, addr: &[&str]) {
        debug_assert_eq!(self.dims.len(), addr.len());
        self.key.clear();
        for label in addr {
            match self.mappings.label_id(label) {
                Some(id) => self.key.push(id),
                None => {
                    // a label absent from the table matches nothing
                    self.mode = PackedViewMode::Idle;
                    return;
                }
            }
        }
        if self.dims.len() == self.mappings.num_mapped {
            let entry = self.mappings.find(&self.key);
            self.mode = PackedViewMode::Exact(entry);
        } else {
            self.mode = PackedViewMode::Scan(0);
        }
    }

    fn next_result(&mut self, addr_out: &mut [&'a str]) -> Option<usize> {
        let mappings = self.mappings;
        match self.mode {
            PackedViewMode::Idle => None,
            PackedViewMode::Exact(entry) => {
                self.mode = PackedViewMode::Idle;
                entry.map(|e| mappings.subspaces[e] as usize)
            }
            PackedViewMode::Scan(start) => {
                for e in start..mappings.size() {
                    let ids = mappings.entry(e);
                    let matched = self
                        .dims
                        .iter()
                        .zip(self.key.iter())
                        .all(|(dim, id)| ids[*dim] == *id);
                    if matched {
                        let mut out = 0;
                        for (i, id) in ids.iter().enumerate() {
                            if !self.dims.contains(&i) {
                                addr_out[out] = mappings.labels[*id as usize].as_str();
                                out += 1;
                            }
                        }
                        self.mode = PackedViewMode::Scan(e + 1);
                        return Some(mappings.subspaces[e] as usize);
                    }
                }
                self.mode = PackedViewMode::Idle;
                None
            }
        }
    }
}

impl Index for PackedMappings {
    fn size(&self) -> usize {
        self.subspaces.len()
    }

    fn create_view<'a>(&'a self, dims: &[usize]) -> Box<dyn IndexView<'a> + 'a> {
        Box::new(PackedView {
            mappings: self,
            dims: SmallVec::from_slice(dims),
            key: SmallVec::new(),
            mode: PackedViewMode::Idle,
        })
    }
}

pub struct PackedMixedTensor<T: Cell> {
    ty: ValueType,
    mappings: PackedMappings,
    cells: Vec<T>,
}

impl<T: Cell> Value for PackedMixedTensor<T> {
    fn value_type(&self) -> &ValueType {
        &self.ty
    }
    fn cells(&self) -> TypedCells<'_> {
        T::wrap(&self.cells)
    }
    fn index(&self) -> &dyn Index {
        &self.mappings
    }
    fn cells_mut(&mut self) -> Option<TypedCellsMut<'_>> {
        Some(T::wrap_mut(&mut self.cells))
    }
}

pub struct PackedMixedTensorBuilder<T: Cell> {
    ty: ValueType,
    num_mapped: usize,
    subspace_size: usize,
    addrs: Vec<String>,
    cells: Vec<T>,
}

impl<T: Cell> PackedMixedTensorBuilder<T> {
    pub fn new(ty: &ValueType, num_mapped: usize, subspace_size: usize, expected: usize) -> Self {
        PackedMixedTensorBuilder {
            ty: ty.clone(),
            num_mapped,
            subspace_size,
            addrs: Vec::with_capacity(num_mapped * expected),
            cells: Vec::with_capacity(subspace_size * expected),
        }
    }

    fn num_subspaces(&self) -> usize {
        if self.subspace_size == 0 {
            0
        } else {
            self.cells.len() / self.subspace_size
        }
    }
}

impl<T: Cell> ValueBuilder<T> for PackedMixedTensorBuilder<T> {
    fn add_subspace(&mut self, addr: &[&str]) -> &mut [T] {
        debug_assert_eq!(self.num_mapped, addr.len());
        self.addrs.extend(addr.iter().map(|label| (*label).to_owned()));
        let start = self.cells.len();
        self.cells.resize(start + self.subspace_size, T::default());
        &mut self.cells[start..]
    }

    fn build(mut self: Box<Self>) -> Box<dyn Value> {
        if self.num_mapped == 0 && self.num_subspaces() == 0 {
            self.add_subspace(&[]);
        }
        let this = *self;
        let num_subspaces = this.num_subspaces();
        let n = this.num_mapped;

        let mut labels = this.addrs.clone();
        labels.sort_unstable();
        labels.dedup();
        let id_of = |label: &str| -> u32 {
            // every stored label is present in the table
            labels.binary_search_by(|candidate| candidate.as_str().cmp(label)).unwrap_or(0) as u32
        };

        let mut entries: Vec<(SmallVec<[u32; 4]>, u32)> = (0..num_subspaces)
            .map(|subspace| {
                let ids = this.addrs[subspace * n..(subspace + 1) * n]
                    .iter()
                    .map(|label| id_of(label))
                    .collect();
                (ids, subspace as u32)
            })
            .collect();
        entries.sort_unstable();

        let mut ids = Vec::with_capacity(num_subspaces * n);
        let mut subspaces = Vec::with_capacity(num_subspaces);
        for (entry, subspace) in entries {
            debug_assert!(
                n == 0 || ids.len() < n || ids[ids.len() - n..] != entry[..],
                "duplicate sparse address"
            );
            ids.extend_from_slice(&entry);
            subspaces.push(subspace);
        }

        Box::new(PackedMixedTensor {
            ty: this.ty,
            mappings: PackedMappings {
                num_mapped: n,
                labels,
                ids,
                subspaces,
            },
            cells: this.cells,
        })
    }
}

#[derive(Clone, Copy, Debug, Default)]
pub struct PackedMixedTensorBuilderFactory;

impl_value_builder_factory!(
    PackedMixedTensorBuilderFactory,
    PackedMixedTensorBuilder,
    "packed_mixed"
);
