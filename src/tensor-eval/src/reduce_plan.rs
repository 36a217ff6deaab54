// Copyright 2026 The Simlin Authors. All rights reserved.
// Use of this source code is governed by the Apache License,
// Version 2.0, that can be found in the LICENSE file.

//! Loop structure for reducing dense cells and the dimension split for
//! reducing sparse addresses.

use tensor_core::value_type::ValueType;

use crate::nested_loop::run_nested_loop;

/// Dense part of a reduce. Only nontrivial indexed dimensions take part;
/// adjacent dimensions that are both kept (or both reduced) are merged into
/// one loop level.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct DenseReducePlan {
    pub in_size: usize,
    pub out_size: usize,
    pub keep_loop: Vec<usize>,
    pub keep_stride: Vec<usize>,
    pub reduce_loop: Vec<usize>,
    pub reduce_stride: Vec<usize>,
}

impl DenseReducePlan {
    pub fn new(ty: &ValueType, res_type: &ValueType) -> Self {
        let mut keep = Vec::new();
        let mut size = Vec::new();
        for dim in ty.nontrivial_indexed_dimensions() {
            keep.push(res_type.dimension_index(&dim.name).is_some());
            size.push(dim.size as usize);
        }
        let mut in_size = 1;
        let mut out_size = 1;
        let mut stride = vec![0; size.len()];
        for i in (0..size.len()).rev() {
            stride[i] = in_size;
            in_size *= size[i];
            if keep[i] {
                out_size *= size[i];
            }
        }

        let mut plan = DenseReducePlan {
            in_size,
            out_size,
            keep_loop: vec![],
            keep_stride: vec![],
            reduce_loop: vec![],
            reduce_stride: vec![],
        };
        let mut prev_keep = None;
        for i in 0..size.len() {
            let (my_loop, my_stride) = if keep[i] {
                (&mut plan.keep_loop, &mut plan.keep_stride)
            } else {
                (&mut plan.reduce_loop, &mut plan.reduce_stride)
            };
            if prev_keep == Some(keep[i]) {
                if let (Some(n), Some(s)) = (my_loop.last_mut(), my_stride.last_mut()) {
                    *n *= size[i];
                    *s = stride[i];
                }
            } else {
                my_loop.push(size[i]);
                my_stride.push(stride[i]);
            }
            prev_keep = Some(keep[i]);
        }
        plan
    }

    /// Visit every output cell in output order, passing the input offset of
    /// its first contributor.
    pub fn execute_keep<F: FnMut(usize)>(&self, mut f: F) {
        run_nested_loop(0, &self.keep_loop, &self.keep_stride, &mut f);
    }

    /// Visit the input offsets reduced into the output cell whose first
    /// contributor is at `offset`.
    pub fn execute_reduce<F: FnMut(usize)>(&self, offset: usize, mut f: F) {
        run_nested_loop(offset, &self.reduce_loop, &self.reduce_stride, &mut f);
    }
}

/// Sparse part of a reduce: which mapped dimensions (by position among the
/// source's mapped dimensions) survive.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct SparseReducePlan {
    pub num_reduce_dims: usize,
    pub keep_dims: Vec<usize>,
}

impl SparseReducePlan {
    pub fn new(ty: &ValueType, res_type: &ValueType) -> Self {
        let mut plan = SparseReducePlan {
            num_reduce_dims: 0,
            keep_dims: vec![],
        };
        for (i, dim) in ty.mapped_dimensions().iter().enumerate() {
            if res_type.dimension_index(&dim.name).is_some() {
                plan.keep_dims.push(i);
            } else {
                plan.num_reduce_dims += 1;
            }
        }
        plan
    }

    /// True when every source subspace maps to its own result subspace.
    pub fn keeps_all(&self) -> bool {
        self.num_reduce_dims == 0
    }
}
