// Copyright 2026 The Simlin Authors. All rights reserved.
// Use of this source code is governed by the Apache License,
// Version 2.0, that can be found in the LICENSE file.

//! Generic merge: the union of two values of the same shape, combining the
//! cells of subspaces present in both.

use tensor_core::value_type::ValueType;

use crate::function::JoinFn;
use crate::value::{
    Cell, TypedCells, Value, ValueBuilderFactory, create_value_builder, for_each_subspace,
};
use crate::with_cell_type;

#[cfg_attr(feature = "debug-derive", derive(Debug))]
pub struct MergeParam {
    pub res_type: ValueType,
    pub function: JoinFn,
}

fn copy_into<T: Cell>(dst: &mut [T], src: TypedCells, offset: usize) {
    for (i, cell) in dst.iter_mut().enumerate() {
        *cell = T::from_f64(src.get(offset + i));
    }
}

fn merge_typed<T: Cell>(
    lhs: &dyn Value,
    rhs: &dyn Value,
    param: &MergeParam,
    factory: &dyn ValueBuilderFactory,
) -> Box<dyn Value> {
    let num_mapped = param.res_type.count_mapped_dimensions();
    let size = param.res_type.dense_subspace_size();
    let all_dims: Vec<usize> = (0..num_mapped).collect();
    let lhs_cells = lhs.cells();
    let rhs_cells = rhs.cells();
    let expected = lhs.index().size() + rhs.index().size();
    let mut builder = create_value_builder::<T>(factory, &param.res_type, expected);

    let mut rhs_view = rhs.index().create_view(&all_dims);
    for_each_subspace(lhs, |addr, lhs_subspace| {
        let dst = builder.add_subspace(addr);
        rhs_view.lookup(addr);
        match rhs_view.next_result(&mut []) {
            Some(rhs_subspace) => {
                for (i, cell) in dst.iter_mut().enumerate() {
                    let a = lhs_cells.get(lhs_subspace * size + i);
                    let b = rhs_cells.get(rhs_subspace * size + i);
                    *cell = T::from_f64(param.function.apply(a, b));
                }
            }
            None => copy_into(dst, lhs_cells, lhs_subspace * size),
        }
    });

    let mut lhs_view = lhs.index().create_view(&all_dims);
    for_each_subspace(rhs, |addr, rhs_subspace| {
        lhs_view.lookup(addr);
        if lhs_view.next_result(&mut []).is_none() {
            copy_into(builder.add_subspace(addr), rhs_cells, rhs_subspace * size);
        }
    });
    builder.build()
}

pub fn perform_merge(
    lhs: &dyn Value,
    rhs: &dyn Value,
    param: &MergeParam,
    factory: &dyn ValueBuilderFactory,
) -> Box<dyn Value> {
    with_cell_type!(param.res_type.cell_type(), T => merge_typed::<T>(lhs, rhs, param, factory))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::fast_value::FastValueBuilderFactory;
    use crate::value::{spec_from_value, value_from_spec};
    use tensor_core::tensor_spec::{Label, TensorSpec, address};

    #[test]
    fn union_of_sparse_values() {
        let factory = FastValueBuilderFactory;
        let a = TensorSpec::new("tensor(x{},y[2])")
            .add(address(&[("x", "a".into()), ("y", Label::Index(0))]), 1.0)
            .add(address(&[("x", "a".into()), ("y", Label::Index(1))]), 2.0)
            .add(address(&[("x", "b".into()), ("y", Label::Index(0))]), 3.0)
            .add(address(&[("x", "b".into()), ("y", Label::Index(1))]), 4.0);
        let b = TensorSpec::new("tensor<float>(x{},y[2])")
            .add(address(&[("x", "b".into()), ("y", Label::Index(0))]), 10.0)
            .add(address(&[("x", "b".into()), ("y", Label::Index(1))]), 20.0)
            .add(address(&[("x", "c".into()), ("y", Label::Index(0))]), 30.0)
            .add(address(&[("x", "c".into()), ("y", Label::Index(1))]), 40.0);
        let lhs = value_from_spec(&a, &factory).unwrap();
        let rhs = value_from_spec(&b, &factory).unwrap();
        let res_type = ValueType::merge(lhs.value_type(), rhs.value_type());
        let param = MergeParam {
            res_type,
            function: JoinFn::Sub,
        };
        let result = perform_merge(lhs.as_ref(), rhs.as_ref(), &param, &factory);
        let expected = TensorSpec::new("tensor(x{},y[2])")
            .add(address(&[("x", "a".into()), ("y", Label::Index(0))]), 1.0)
            .add(address(&[("x", "a".into()), ("y", Label::Index(1))]), 2.0)
            .add(address(&[("x", "b".into()), ("y", Label::Index(0))]), -7.0)
            .add(address(&[("x", "b".into()), ("y", Label::Index(1))]), -16.0)
            .add(address(&[("x", "c".into()), ("y", Label::Index(0))]), 30.0)
            .add(address(&[("x", "c".into()), ("y", Label::Index(1))]), 40.0);
        assert_eq!(expected, spec_from_value(result.as_ref()));
    }

    #[test]
    fn dense_merge_combines_every_cell() {
        let factory = FastValueBuilderFactory;
        let a = TensorSpec::new("tensor(x[2])")
            .add(address(&[("x", Label::Index(0))]), 5.0)
            .add(address(&[("x", Label::Index(1))]), 1.0);
        let b = TensorSpec::new("tensor(x[2])")
            .add(address(&[("x", Label::Index(0))]), 2.0)
            .add(address(&[("x", Label::Index(1))]), 7.0);
        let lhs = value_from_spec(&a, &factory).unwrap();
        let rhs = value_from_spec(&b, &factory).unwrap();
        let param = MergeParam {
            res_type: lhs.value_type().clone(),
            function: JoinFn::Max,
        };
        let result = perform_merge(lhs.as_ref(), rhs.as_ref(), &param, &factory);
        assert_eq!(vec![5.0, 7.0], result.cells().iter().collect::<Vec<_>>());
    }
}
