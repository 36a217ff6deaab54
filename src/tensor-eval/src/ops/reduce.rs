// Copyright 2026 The Simlin Authors. All rights reserved.
// Use of this source code is governed by the Apache License,
// Version 2.0, that can be found in the LICENSE file.

//! Generic reduce.
//!
//! Subspaces are grouped by the labels of the mapped dimensions that
//! survive; within a group every output cell aggregates, in scan order, the
//! matching dense cells of each member subspace.

use rustc_hash::FxHashMap;
use smallvec::SmallVec;

use tensor_core::value_type::ValueType;

use crate::aggregator::Aggr;
use crate::reduce_plan::{DenseReducePlan, SparseReducePlan};
use crate::value::{
    Cell, Labels, Value, ValueBuilderFactory, create_value_builder, for_each_subspace,
};
use crate::with_cell_type;

#[cfg_attr(feature = "debug-derive", derive(Debug))]
pub struct ReduceParam {
    pub res_type: ValueType,
    pub aggr: Aggr,
    pub dense: DenseReducePlan,
    pub sparse: SparseReducePlan,
}

impl ReduceParam {
    pub fn new(src: &ValueType, res_type: &ValueType, aggr: Aggr) -> Self {
        ReduceParam {
            res_type: res_type.clone(),
            aggr,
            dense: DenseReducePlan::new(src, res_type),
            sparse: SparseReducePlan::new(src, res_type),
        }
    }
}

struct Group<'a> {
    addr: Labels<'a>,
    subspaces: Vec<usize>,
}

fn group_subspaces<'a>(value: &'a dyn Value, plan: &SparseReducePlan) -> Vec<Group<'a>> {
    let mut groups: Vec<Group<'a>> = vec![];
    let mut lookup: FxHashMap<Labels<'a>, usize> = FxHashMap::default();
    for_each_subspace(value, |addr, subspace| {
        let key: Labels<'a> = plan.keep_dims.iter().map(|i| addr[*i]).collect();
        match lookup.get(&key) {
            Some(group) => groups[*group].subspaces.push(subspace),
            None => {
                lookup.insert(key.clone(), groups.len());
                groups.push(Group {
                    addr: key,
                    subspaces: vec![subspace],
                });
            }
        }
    });
    if groups.is_empty() && plan.keep_dims.is_empty() {
        // a fully reduced sparse part always has exactly one result subspace
        groups.push(Group {
            addr: SmallVec::new(),
            subspaces: vec![],
        });
    }
    groups
}

fn reduce_typed<T: Cell>(
    value: &dyn Value,
    param: &ReduceParam,
    factory: &dyn ValueBuilderFactory,
) -> Box<dyn Value> {
    let cells = value.cells();
    let in_size = param.dense.in_size;
    let groups = group_subspaces(value, &param.sparse);
    let mut builder = create_value_builder::<T>(factory, &param.res_type, groups.len());
    let mut aggregator = param.aggr.create();
    for group in groups.iter() {
        let dst = builder.add_subspace(&group.addr);
        if group.subspaces.is_empty() {
            dst.fill(T::from_f64(param.aggr.empty_result()));
            continue;
        }
        let mut out = 0;
        param.dense.execute_keep(|offset| {
            let mut first = true;
            for subspace in group.subspaces.iter() {
                param.dense.execute_reduce(subspace * in_size + offset, |idx| {
                    let cell = cells.get(idx);
                    if first {
                        aggregator.first(cell);
                        first = false;
                    } else {
                        aggregator.next(cell);
                    }
                });
            }
            dst[out] = T::from_f64(aggregator.result());
            out += 1;
        });
    }
    builder.build()
}

pub fn perform_reduce(
    value: &dyn Value,
    param: &ReduceParam,
    factory: &dyn ValueBuilderFactory,
) -> Box<dyn Value> {
    with_cell_type!(param.res_type.cell_type(), T => reduce_typed::<T>(value, param, factory))
}
