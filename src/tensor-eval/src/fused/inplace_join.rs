// Copyright 2026 The Simlin Authors. All rights reserved.
// Use of this source code is governed by the Apache License,
// Version 2.0, that can be found in the LICENSE file.

//! Join of two dense values with identical types, written into the cells of
//! an operand the evaluation owns.

use crate::function::JoinFn;
use crate::interpreter::StackValue;
use crate::ops::join::{JoinParam, perform_join};
use crate::value::{Cell, TypedCells, TypedCellsMut, ValueBuilderFactory};

#[cfg_attr(feature = "debug-derive", derive(Debug))]
pub struct InplaceJoinParam {
    pub join: JoinParam,
    pub write_left: bool,
}

fn apply<T: Cell>(dst: &mut [T], src: TypedCells, function: JoinFn, dst_is_lhs: bool) -> bool {
    if dst.len() != src.len() {
        return false;
    }
    for (i, cell) in dst.iter_mut().enumerate() {
        let (a, b) = if dst_is_lhs {
            (cell.to_f64(), src.get(i))
        } else {
            (src.get(i), cell.to_f64())
        };
        *cell = T::from_f64(function.apply(a, b));
    }
    true
}

fn apply_typed(dst: TypedCellsMut, src: TypedCells, function: JoinFn, dst_is_lhs: bool) -> bool {
    match dst {
        TypedCellsMut::Double(cells) => apply(cells, src, function, dst_is_lhs),
        TypedCellsMut::Float(cells) => apply(cells, src, function, dst_is_lhs),
        TypedCellsMut::BFloat16(_) | TypedCellsMut::Int8(_) => false,
    }
}

/// Falls back to the generic join when the chosen operand is borrowed or
/// does not expose its cells.
pub fn perform_inplace_join<'a>(
    lhs: StackValue<'a>,
    rhs: StackValue<'a>,
    param: &InplaceJoinParam,
    factory: &dyn ValueBuilderFactory,
) -> StackValue<'a> {
    let (mut target, other) = if param.write_left {
        (lhs, rhs)
    } else {
        (rhs, lhs)
    };
    let done = match &mut target {
        StackValue::Owned(value) => match value.cells_mut() {
            Some(cells) => apply_typed(cells, other.cells(), param.join.function, param.write_left),
            None => false,
        },
        StackValue::Borrowed(_) => false,
    };
    if done {
        return target;
    }
    let (lhs, rhs) = if param.write_left {
        (target, other)
    } else {
        (other, target)
    };
    StackValue::Owned(perform_join(&*lhs, &*rhs, &param.join, factory))
}
