// Copyright 2026 The Simlin Authors. All rights reserved.
// Use of this source code is governed by the Apache License,
// Version 2.0, that can be found in the LICENSE file.

//! Zero-copy rename. The child's cells are reused as they are; only the
//! type changes, and when mapped dimensions change order the index is
//! wrapped so addresses come out in the new order.

use smallvec::SmallVec;

use tensor_core::value_type::ValueType;

use crate::interpreter::StackValue;
use crate::value::{Index, IndexView, Labels, TypedCells, Value};

pub struct ReplaceTypeValue<'a> {
    inner: StackValue<'a>,
    ty: &'a ValueType,
    /// for each result mapped dimension, its position in the child; None
    /// when the order is unchanged
    mapped_order: Option<&'a [usize]>,
}

impl<'a> ReplaceTypeValue<'a> {
    pub fn new(inner: StackValue<'a>, ty: &'a ValueType, mapped_order: Option<&'a [usize]>) -> Self {
        debug_assert_eq!(inner.cells().len(), inner.index().size() * ty.dense_subspace_size());
        ReplaceTypeValue {
            inner,
            ty,
            mapped_order,
        }
    }
}

impl Value for ReplaceTypeValue<'_> {
    fn value_type(&self) -> &ValueType {
        self.ty
    }

    fn cells(&self) -> TypedCells<'_> {
        self.inner.cells()
    }

    fn index(&self) -> &dyn Index {
        match self.mapped_order {
            Some(_) => self,
            None => self.inner.index(),
        }
    }
}

impl Index for ReplaceTypeValue<'_> {
    fn size(&self) -> usize {
        self.inner.index().size()
    }

    fn create_view<'v>(&'v self, dims: &[usize]) -> Box<dyn IndexView<'v> + 'v> {
        let order = self.mapped_order.unwrap_or_default();
        let mut bound: Vec<(usize, usize)> = dims
            .iter()
            .enumerate()
            .map(|(i, dim)| (order[*dim], i))
            .collect();
        bound.sort_unstable();
        let src_dims: Vec<usize> = bound.iter().map(|(src, _)| *src).collect();
        let key_perm = bound.iter().map(|(_, i)| *i).collect();

        let remaining: Vec<usize> = (0..order.len())
            .filter(|pos| !dims.contains(pos))
            .map(|pos| order[pos])
            .collect();
        let mut src_remaining = remaining.clone();
        src_remaining.sort_unstable();
        let out_perm = remaining
            .iter()
            .filter_map(|src| src_remaining.iter().position(|s| s == src))
            .collect();

        Box::new(PermutedView {
            inner: self.inner.index().create_view(&src_dims),
            key_perm,
            out_perm,
            buf: SmallVec::from_elem("", src_remaining.len()),
        })
    }
}

struct PermutedView<'v> {
    inner: Box<dyn IndexView<'v> + 'v>,
    /// for each bound child dimension, the position of its label in the key
    key_perm: Vec<usize>,
    /// for each unbound result dimension, the position of its label in the
    /// child's output
    out_perm: Vec<usize>,
    buf: Labels<'v>,
}

impl<'v> IndexView<'v> for PermutedView<'v> {
    fn lookup(&mut self, addr: &[&str]) {
        let key: Labels = self.key_perm.iter().map(|i| addr[*i]).collect();
        self.inner.lookup(&key);
    }

    fn next_result(&mut self, addr_out: &mut [&'v str]) -> Option<usize> {
        let subspace = self.inner.next_result(&mut self.buf)?;
        for (out, pos) in addr_out.iter_mut().zip(self.out_perm.iter()) {
            *out = self.buf[*pos];
        }
        Some(subspace)
    }
}
