// Copyright 2026 The Simlin Authors. All rights reserved.
// Use of this source code is governed by the Apache License,
// Version 2.0, that can be found in the LICENSE file.

//! Generic rename. Mapped labels are permuted into the result's dimension
//! order and dense cells are copied in result order through the source
//! strides, which transposes them when nontrivial indexed dimensions change
//! relative order.

use smallvec::SmallVec;

use tensor_core::value_type::ValueType;

use crate::nested_loop::run_nested_loop;
use crate::ops::dense_stride;
use crate::value::{
    Cell, Labels, Value, ValueBuilderFactory, create_value_builder, for_each_subspace,
};
use crate::with_cell_type;

/// Name in the source type of result dimension `name`.
pub(crate) fn source_name<'n>(name: &'n str, from: &'n [String], to: &'n [String]) -> &'n str {
    match to.iter().position(|t| t == name) {
        Some(i) => &from[i],
        None => name,
    }
}

/// For each mapped dimension of `res`, its position among the mapped
/// dimensions of `src`.
pub(crate) fn mapped_order(src: &ValueType, res: &ValueType, from: &[String], to: &[String]) -> Vec<usize> {
    let src_mapped = src.mapped_dimensions();
    res.mapped_dimensions()
        .iter()
        .filter_map(|dim| {
            let name = source_name(&dim.name, from, to);
            src_mapped.iter().position(|d| d.name == name)
        })
        .collect()
}

#[cfg_attr(feature = "debug-derive", derive(Debug))]
pub struct RenameParam {
    pub res_type: ValueType,
    mapped_order: Vec<usize>,
    subspace_size: usize,
    loops: Vec<usize>,
    stride: Vec<usize>,
}

impl RenameParam {
    pub fn new(src: &ValueType, res_type: &ValueType, from: &[String], to: &[String]) -> Self {
        let mut loops = vec![];
        let mut stride = vec![];
        for dim in res_type.nontrivial_indexed_dimensions() {
            loops.push(dim.size as usize);
            stride.push(dense_stride(src, source_name(&dim.name, from, to)));
        }
        RenameParam {
            res_type: res_type.clone(),
            mapped_order: mapped_order(src, res_type, from, to),
            subspace_size: src.dense_subspace_size(),
            loops,
            stride,
        }
    }
}

fn rename_typed<T: Cell>(
    value: &dyn Value,
    param: &RenameParam,
    factory: &dyn ValueBuilderFactory,
) -> Box<dyn Value> {
    let cells = value.cells();
    let mut builder = create_value_builder::<T>(factory, &param.res_type, value.index().size());
    let mut addr: Labels = SmallVec::from_elem("", param.mapped_order.len());
    for_each_subspace(value, |src_addr, subspace| {
        for (out, pos) in addr.iter_mut().zip(param.mapped_order.iter()) {
            *out = src_addr[*pos];
        }
        let dst = builder.add_subspace(&addr);
        let mut i = 0;
        run_nested_loop(
            subspace * param.subspace_size,
            &param.loops,
            &param.stride,
            &mut |idx| {
                dst[i] = T::from_f64(cells.get(idx));
                i += 1;
            },
        );
    });
    builder.build()
}

pub fn perform_rename(
    value: &dyn Value,
    param: &RenameParam,
    factory: &dyn ValueBuilderFactory,
) -> Box<dyn Value> {
    with_cell_type!(param.res_type.cell_type(), T => rename_typed::<T>(value, param, factory))
}
