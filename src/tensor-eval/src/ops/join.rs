// Copyright 2026 The Simlin Authors. All rights reserved.
// Use of this source code is governed by the Apache License,
// Version 2.0, that can be found in the LICENSE file.

use smallvec::SmallVec;

use tensor_core::value_type::ValueType;

use crate::function::JoinFn;
use crate::nested_loop::run_nested_loop2;
use crate::ops::dense_stride;
use crate::value::{Cell, Labels, Value, ValueBuilderFactory, create_value_builder};
use crate::with_cell_type;

#[derive(Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "debug-derive", derive(Debug))]
pub(crate) enum LabelSource {
    /// position in the lhs address
    Lhs(usize),
    /// position among the rhs labels not shared with lhs
    Rhs(usize),
}

/// How the mapped dimensions of two operands combine into the result
/// address.
#[derive(Clone, PartialEq, Eq)]
#[cfg_attr(feature = "debug-derive", derive(Debug))]
pub struct SparseJoinPlan {
    pub(crate) lhs_overlap: Vec<usize>,
    pub(crate) rhs_overlap: Vec<usize>,
    pub(crate) sources: Vec<LabelSource>,
}

impl SparseJoinPlan {
    pub fn new(lhs: &ValueType, rhs: &ValueType, res: &ValueType) -> Self {
        let lhs_mapped = lhs.mapped_dimensions();
        let rhs_mapped = rhs.mapped_dimensions();
        let mut lhs_overlap = vec![];
        let mut rhs_overlap = vec![];
        for (i, dim) in lhs_mapped.iter().enumerate() {
            if let Some(j) = rhs_mapped.iter().position(|d| d.name == dim.name) {
                lhs_overlap.push(i);
                rhs_overlap.push(j);
            }
        }
        // dimensions are sorted by name, so rhs-only dimensions show up in
        // the result in the same order the rhs view reports them
        let mut next_rhs = 0;
        let sources = res
            .mapped_dimensions()
            .iter()
            .map(|dim| match lhs_mapped.iter().position(|d| d.name == dim.name) {
                Some(i) => LabelSource::Lhs(i),
                None => {
                    next_rhs += 1;
                    LabelSource::Rhs(next_rhs - 1)
                }
            })
            .collect();
        SparseJoinPlan {
            lhs_overlap,
            rhs_overlap,
            sources,
        }
    }
}

/// Visit every pair of subspaces whose addresses agree on the shared mapped
/// dimensions, with the combined result address.
pub(crate) fn for_each_join_pair<'a, F>(
    lhs: &'a dyn Value,
    rhs: &'a dyn Value,
    plan: &SparseJoinPlan,
    mut f: F,
) where
    F: FnMut(&[&'a str], usize, usize),
{
    let num_lhs = lhs.value_type().count_mapped_dimensions();
    let num_rhs_rest = rhs.value_type().count_mapped_dimensions() - plan.rhs_overlap.len();
    let mut lhs_addr: Labels<'a> = SmallVec::from_elem("", num_lhs);
    let mut rhs_addr: Labels<'a> = SmallVec::from_elem("", num_rhs_rest);
    let mut res_addr: Labels<'a> = SmallVec::from_elem("", plan.sources.len());
    let mut key: Labels<'a> = SmallVec::new();

    let mut lhs_view = lhs.index().create_view(&[]);
    let mut rhs_view = rhs.index().create_view(&plan.rhs_overlap);
    lhs_view.lookup(&[]);
    while let Some(lhs_subspace) = lhs_view.next_result(&mut lhs_addr) {
        key.clear();
        key.extend(plan.lhs_overlap.iter().map(|i| lhs_addr[*i]));
        rhs_view.lookup(&key);
        while let Some(rhs_subspace) = rhs_view.next_result(&mut rhs_addr) {
            for (out, source) in res_addr.iter_mut().zip(plan.sources.iter()) {
                *out = match *source {
                    LabelSource::Lhs(i) => lhs_addr[i],
                    LabelSource::Rhs(i) => rhs_addr[i],
                };
            }
            f(&res_addr, lhs_subspace, rhs_subspace);
        }
    }
}

/// Loop nest over the result's dense subspace with the matching offsets
/// into each operand's subspace. Shared dimensions use the result size,
/// which is the smaller of the two.
#[derive(Clone, PartialEq, Eq)]
#[cfg_attr(feature = "debug-derive", derive(Debug))]
pub struct DenseJoinPlan {
    pub lhs_size: usize,
    pub rhs_size: usize,
    pub loops: Vec<usize>,
    pub lhs_stride: Vec<usize>,
    pub rhs_stride: Vec<usize>,
}

impl DenseJoinPlan {
    pub fn new(lhs: &ValueType, rhs: &ValueType, res: &ValueType) -> Self {
        let mut plan = DenseJoinPlan {
            lhs_size: lhs.dense_subspace_size(),
            rhs_size: rhs.dense_subspace_size(),
            loops: vec![],
            lhs_stride: vec![],
            rhs_stride: vec![],
        };
        for dim in res.nontrivial_indexed_dimensions() {
            plan.loops.push(dim.size as usize);
            plan.lhs_stride.push(dense_stride(lhs, &dim.name));
            plan.rhs_stride.push(dense_stride(rhs, &dim.name));
        }
        plan
    }

    pub fn execute<F: FnMut(usize, usize)>(&self, lhs_subspace: usize, rhs_subspace: usize, mut f: F) {
        run_nested_loop2(
            lhs_subspace * self.lhs_size,
            rhs_subspace * self.rhs_size,
            &self.loops,
            &self.lhs_stride,
            &self.rhs_stride,
            &mut f,
        );
    }
}

#[cfg_attr(feature = "debug-derive", derive(Debug))]
pub struct JoinParam {
    pub res_type: ValueType,
    pub function: JoinFn,
    pub sparse: SparseJoinPlan,
    pub dense: DenseJoinPlan,
}

impl JoinParam {
    pub fn new(lhs: &ValueType, rhs: &ValueType, res_type: &ValueType, function: JoinFn) -> Self {
        JoinParam {
            res_type: res_type.clone(),
            function,
            sparse: SparseJoinPlan::new(lhs, rhs, res_type),
            dense: DenseJoinPlan::new(lhs, rhs, res_type),
        }
    }
}

fn join_typed<T: Cell>(
    lhs: &dyn Value,
    rhs: &dyn Value,
    param: &JoinParam,
    factory: &dyn ValueBuilderFactory,
) -> Box<dyn Value> {
    let lhs_cells = lhs.cells();
    let rhs_cells = rhs.cells();
    let expected = lhs.index().size().max(rhs.index().size());
    let mut builder = create_value_builder::<T>(factory, &param.res_type, expected);
    let function = param.function;
    for_each_join_pair(lhs, rhs, &param.sparse, |addr, lhs_subspace, rhs_subspace| {
        let dst = builder.add_subspace(addr);
        let mut i = 0;
        param.dense.execute(lhs_subspace, rhs_subspace, |a, b| {
            dst[i] = T::from_f64(function.apply(lhs_cells.get(a), rhs_cells.get(b)));
            i += 1;
        });
    });
    builder.build()
}

pub fn perform_join(
    lhs: &dyn Value,
    rhs: &dyn Value,
    param: &JoinParam,
    factory: &dyn ValueBuilderFactory,
) -> Box<dyn Value> {
    with_cell_type!(param.res_type.cell_type(), T => join_typed::<T>(lhs, rhs, param, factory))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::simple_value::SimpleValueBuilderFactory;
    use crate::value::{spec_from_value, value_from_spec};
    use tensor_core::tensor_spec::{Label, TensorSpec, address};

    fn join_specs(a: &TensorSpec, b: &TensorSpec, function: JoinFn) -> TensorSpec {
        let factory = SimpleValueBuilderFactory;
        let lhs = value_from_spec(a, &factory).unwrap();
        let rhs = value_from_spec(b, &factory).unwrap();
        let res_type = ValueType::join(lhs.value_type(), rhs.value_type());
        let param = JoinParam::new(lhs.value_type(), rhs.value_type(), &res_type, function);
        spec_from_value(perform_join(lhs.as_ref(), rhs.as_ref(), &param, &factory).as_ref())
    }

    #[test]
    fn sparse_plan_sources() {
        let lhs = ValueType::from_spec("tensor(a{},c{})");
        let rhs = ValueType::from_spec("tensor(b{},c{},d{})");
        let res = ValueType::join(&lhs, &rhs);
        let plan = SparseJoinPlan::new(&lhs, &rhs, &res);
        assert_eq!(vec![1], plan.lhs_overlap);
        assert_eq!(vec![1], plan.rhs_overlap);
        assert_eq!(
            vec![
                LabelSource::Lhs(0),
                LabelSource::Rhs(0),
                LabelSource::Lhs(1),
                LabelSource::Rhs(1)
            ],
            plan.sources
        );
    }

    #[test]
    fn dense_plan_uses_smaller_shared_size() {
        let lhs = ValueType::from_spec("tensor(x[3],y[2])");
        let rhs = ValueType::from_spec("tensor(x[2])");
        let res = ValueType::join(&lhs, &rhs);
        let plan = DenseJoinPlan::new(&lhs, &rhs, &res);
        assert_eq!(vec![2, 2], plan.loops);
        assert_eq!(vec![2, 1], plan.lhs_stride);
        assert_eq!(vec![1, 0], plan.rhs_stride);
    }

    #[test]
    fn mixed_join() {
        let a = TensorSpec::new("tensor(x{},y[2])")
            .add(address(&[("x", "a".into()), ("y", Label::Index(0))]), 1.0)
            .add(address(&[("x", "a".into()), ("y", Label::Index(1))]), 2.0)
            .add(address(&[("x", "b".into()), ("y", Label::Index(0))]), 3.0)
            .add(address(&[("x", "b".into()), ("y", Label::Index(1))]), 4.0);
        let b = TensorSpec::new("tensor(x{})")
            .add(address(&[("x", "b".into())]), 10.0)
            .add(address(&[("x", "c".into())]), 20.0);
        let expected = TensorSpec::new("tensor(x{},y[2])")
            .add(address(&[("x", "b".into()), ("y", Label::Index(0))]), 30.0)
            .add(address(&[("x", "b".into()), ("y", Label::Index(1))]), 40.0);
        assert_eq!(expected, join_specs(&a, &b, JoinFn::Mul));
    }

    #[test]
    fn outer_product_of_sparse() {
        let a = TensorSpec::new("tensor(x{})")
            .add(address(&[("x", "a".into())]), 1.0)
            .add(address(&[("x", "b".into())]), 2.0);
        let b = TensorSpec::new("tensor(y{})")
            .add(address(&[("y", "c".into())]), 3.0);
        let expected = TensorSpec::new("tensor(x{},y{})")
            .add(address(&[("x", "a".into()), ("y", "c".into())]), 4.0)
            .add(address(&[("x", "b".into()), ("y", "c".into())]), 5.0);
        assert_eq!(expected, join_specs(&a, &b, JoinFn::Add));
    }

    #[test]
    fn scalar_join_keeps_cell_type_neutral() {
        let a = TensorSpec::new("tensor<int8>(x[2])")
            .add(address(&[("x", Label::Index(0))]), 3.0)
            .add(address(&[("x", Label::Index(1))]), -4.0);
        let b = TensorSpec::new("double").add(address(&[]), 2.0);
        let expected = TensorSpec::new("tensor<float>(x[2])")
            .add(address(&[("x", Label::Index(0))]), 6.0)
            .add(address(&[("x", Label::Index(1))]), -8.0);
        assert_eq!(expected, join_specs(&a, &b, JoinFn::Mul));
    }
}
