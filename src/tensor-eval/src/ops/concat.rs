// Copyright 2026 The Simlin Authors. All rights reserved.
// Use of this source code is governed by the Apache License,
// Version 2.0, that can be found in the LICENSE file.

//! Generic concat along an indexed dimension. An operand without the
//! concat dimension contributes a single slice along it.

use tensor_core::value_type::ValueType;

use crate::nested_loop::SubscriptIterator;
use crate::ops::dense_stride;
use crate::ops::join::{SparseJoinPlan, for_each_join_pair};
use crate::value::{Cell, Value, ValueBuilderFactory, create_value_builder};
use crate::with_cell_type;

#[derive(Clone, PartialEq, Eq)]
#[cfg_attr(feature = "debug-derive", derive(Debug))]
struct OperandLayout {
    size: usize,
    /// (position among result indexed dimensions, stride in the operand)
    terms: Vec<(usize, usize)>,
    /// stride of the concat dimension in the operand, 0 when absent
    concat_stride: usize,
}

impl OperandLayout {
    fn new(ty: &ValueType, res: &ValueType, dimension: &str) -> Self {
        let mut terms = vec![];
        for (pos, dim) in res.indexed_dimensions().iter().enumerate() {
            if dim.name != dimension && ty.dimension_index(&dim.name).is_some() {
                terms.push((pos, dense_stride(ty, &dim.name)));
            }
        }
        OperandLayout {
            size: ty.dense_subspace_size(),
            terms,
            concat_stride: dense_stride(ty, dimension),
        }
    }

    #[inline]
    fn offset(&self, subspace: usize, subscript: &[usize], concat_idx: usize) -> usize {
        let mut offset = subspace * self.size + concat_idx * self.concat_stride;
        for (pos, stride) in self.terms.iter() {
            offset += subscript[*pos] * stride;
        }
        offset
    }
}

#[cfg_attr(feature = "debug-derive", derive(Debug))]
pub struct ConcatParam {
    pub res_type: ValueType,
    sparse: SparseJoinPlan,
    sizes: Vec<usize>,
    concat_pos: usize,
    /// extent of lhs along the concat dimension
    split: usize,
    lhs: OperandLayout,
    rhs: OperandLayout,
}

impl ConcatParam {
    pub fn new(lhs: &ValueType, rhs: &ValueType, res_type: &ValueType, dimension: &str) -> Self {
        let indexed = res_type.indexed_dimensions();
        let mut concat_pos = 0;
        for (pos, dim) in indexed.iter().enumerate() {
            if dim.name == dimension {
                concat_pos = pos;
            }
        }
        let split = match lhs.dimension_index(dimension) {
            Some(i) => lhs.dimensions()[i].size as usize,
            None => 1,
        };
        ConcatParam {
            res_type: res_type.clone(),
            sparse: SparseJoinPlan::new(lhs, rhs, res_type),
            sizes: indexed.iter().map(|d| d.size as usize).collect(),
            concat_pos,
            split,
            lhs: OperandLayout::new(lhs, res_type, dimension),
            rhs: OperandLayout::new(rhs, res_type, dimension),
        }
    }
}

fn concat_typed<T: Cell>(
    lhs: &dyn Value,
    rhs: &dyn Value,
    param: &ConcatParam,
    factory: &dyn ValueBuilderFactory,
) -> Box<dyn Value> {
    let lhs_cells = lhs.cells();
    let rhs_cells = rhs.cells();
    let expected = lhs.index().size().max(rhs.index().size());
    let mut builder = create_value_builder::<T>(factory, &param.res_type, expected);
    let mut subscript = vec![0; param.sizes.len()];
    for_each_join_pair(lhs, rhs, &param.sparse, |addr, lhs_subspace, rhs_subspace| {
        let dst = builder.add_subspace(addr);
        let mut iter = SubscriptIterator::new(&param.sizes);
        let mut i = 0;
        while iter.next_into(&mut subscript) {
            let idx = subscript[param.concat_pos];
            let value = if idx < param.split {
                lhs_cells.get(param.lhs.offset(lhs_subspace, &subscript, idx))
            } else {
                rhs_cells.get(param.rhs.offset(rhs_subspace, &subscript, idx - param.split))
            };
            dst[i] = T::from_f64(value);
            i += 1;
        }
    });
    builder.build()
}

pub fn perform_concat(
    lhs: &dyn Value,
    rhs: &dyn Value,
    param: &ConcatParam,
    factory: &dyn ValueBuilderFactory,
) -> Box<dyn Value> {
    with_cell_type!(param.res_type.cell_type(), T => concat_typed::<T>(lhs, rhs, param, factory))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::simple_value::SimpleValueBuilderFactory;
    use crate::value::{spec_from_value, value_from_spec};
    use tensor_core::tensor_spec::{Label, TensorSpec, address};

    fn concat_specs(a: &TensorSpec, b: &TensorSpec, dimension: &str) -> TensorSpec {
        let factory = SimpleValueBuilderFactory;
        let lhs = value_from_spec(a, &factory).unwrap();
        let rhs = value_from_spec(b, &factory).unwrap();
        let res_type = ValueType::concat(lhs.value_type(), rhs.value_type(), dimension);
        let param = ConcatParam::new(lhs.value_type(), rhs.value_type(), &res_type, dimension);
        spec_from_value(perform_concat(lhs.as_ref(), rhs.as_ref(), &param, &factory).as_ref())
    }

    fn idx(i: u32) -> Label {
        Label::Index(i)
    }

    #[test]
    fn concat_vectors() {
        let a = TensorSpec::new("tensor(x[2])")
            .add(address(&[("x", idx(0))]), 1.0)
            .add(address(&[("x", idx(1))]), 2.0);
        let b = TensorSpec::new("tensor(x[1])").add(address(&[("x", idx(0))]), 3.0);
        let expected = TensorSpec::new("tensor(x[3])")
            .add(address(&[("x", idx(0))]), 1.0)
            .add(address(&[("x", idx(1))]), 2.0)
            .add(address(&[("x", idx(2))]), 3.0);
        assert_eq!(expected, concat_specs(&a, &b, "x"));
    }

    #[test]
    fn concat_scalar_onto_matrix_along_new_dimension() {
        let a = TensorSpec::new("tensor(y[2])")
            .add(address(&[("y", idx(0))]), 1.0)
            .add(address(&[("y", idx(1))]), 2.0);
        let b = TensorSpec::new("double").add(address(&[]), 9.0);
        let expected = TensorSpec::new("tensor(x[2],y[2])")
            .add(address(&[("x", idx(0)), ("y", idx(0))]), 1.0)
            .add(address(&[("x", idx(0)), ("y", idx(1))]), 2.0)
            .add(address(&[("x", idx(1)), ("y", idx(0))]), 9.0)
            .add(address(&[("x", idx(1)), ("y", idx(1))]), 9.0);
        assert_eq!(expected, concat_specs(&a, &b, "x"));
    }

    #[test]
    fn concat_mixed_keeps_matching_subspaces() {
        let a = TensorSpec::new("tensor(k{},x[1])")
            .add(address(&[("k", "a".into()), ("x", idx(0))]), 1.0)
            .add(address(&[("k", "b".into()), ("x", idx(0))]), 2.0);
        let b = TensorSpec::new("tensor(k{},x[1])")
            .add(address(&[("k", "b".into()), ("x", idx(0))]), 3.0);
        let expected = TensorSpec::new("tensor(k{},x[2])")
            .add(address(&[("k", "b".into()), ("x", idx(0))]), 2.0)
            .add(address(&[("k", "b".into()), ("x", idx(1))]), 3.0);
        assert_eq!(expected, concat_specs(&a, &b, "x"));
    }
}
