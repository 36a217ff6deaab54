// Copyright 2026 The Simlin Authors. All rights reserved.
// Use of this source code is governed by the Apache License,
// Version 2.0, that can be found in the LICENSE file.

//! Peephole replacement of generic node patterns with fused nodes.
//!
//! Every optimizer looks at one node together with the static types of its
//! descendants and either returns the fused replacement or declines. Nodes
//! are visited once, children before parents, and the first optimizer that
//! matches wins. A fused node always computes the same `TensorSpec` as the
//! generic nodes it replaces.

use tensor_core::cell_type::CellType;
use tensor_core::value_type::ValueType;

use crate::aggregator::Aggr;
use crate::function::{JoinFn, MapFn, NodeId, NodeKind, ScalarExpr, TensorFunction};
use crate::ops::rename::mapped_order;

type Optimizer = fn(&mut TensorFunction, NodeId) -> Option<NodeKind>;

const OPTIMIZERS: [(&str, Optimizer); 5] = [
    ("sum_max_dot_product", sum_max_dot_product as Optimizer),
    ("mixed_l2_distance", mixed_l2_distance as Optimizer),
    ("unpack_bits", unpack_bits as Optimizer),
    ("fast_rename", fast_rename as Optimizer),
    ("dense_inplace_join", dense_inplace_join as Optimizer),
];

/// Copy of `function` with every matching pattern replaced by its fused
/// form.
pub fn optimize(function: &TensorFunction) -> TensorFunction {
    let mut fun = function.clone();
    for id in function.reachable() {
        for (name, optimizer) in OPTIMIZERS.iter() {
            if let Some(kind) = optimizer(&mut fun, id) {
                tracing::debug!(optimizer = *name, node = id.index(), "replaced node");
                fun.replace(id, kind);
                break;
            }
        }
    }
    fun
}

/// True when renaming `from` to `to` keeps the relative order of every
/// nontrivial indexed dimension, so the dense cells can be reused as they
/// are. Mapped and size 1 dimensions may move freely.
pub fn is_stable_rename(from_type: &ValueType, to_type: &ValueType, from: &[&str], to: &[&str]) -> bool {
    let mut last = None;
    for dim in from_type.nontrivial_indexed_dimensions() {
        let name = match from.iter().position(|f| *f == dim.name) {
            Some(i) => to[i],
            None => dim.name.as_str(),
        };
        let Some(pos) = to_type.dimension_index(name) else {
            return false;
        };
        if last.is_some_and(|prev| pos <= prev) {
            return false;
        }
        last = Some(pos);
    }
    true
}

fn as_reduce(fun: &TensorFunction, id: NodeId, aggr: Aggr) -> Option<(NodeId, &[String])> {
    match &fun.node(id).kind {
        NodeKind::Reduce {
            child,
            aggr: a,
            dimensions,
        } if *a == aggr => Some((*child, dimensions.as_slice())),
        _ => None,
    }
}

fn as_join(fun: &TensorFunction, id: NodeId, function: JoinFn) -> Option<(NodeId, NodeId)> {
    match &fun.node(id).kind {
        NodeKind::Join {
            lhs,
            rhs,
            function: f,
        } if *f == function => Some((*lhs, *rhs)),
        _ => None,
    }
}

/// `reduce(reduce(reduce(q * d, sum, dp), max, y), sum, x)` where the query
/// varies over `x`, the document over `y`, and both share the float vector
/// dimension `dp`.
fn sum_max_dot_product(fun: &mut TensorFunction, id: NodeId) -> Option<NodeKind> {
    let (max_node, sum_dims) = as_reduce(fun, id, Aggr::Sum)?;
    let (dp_node, max_dims) = as_reduce(fun, max_node, Aggr::Max)?;
    let (join_node, dp_dims) = as_reduce(fun, dp_node, Aggr::Sum)?;
    let (lhs, rhs) = as_join(fun, join_node, JoinFn::Mul)?;
    let ([x], [y], [dp]) = (sum_dims, max_dims, dp_dims) else {
        return None;
    };
    if !fun.result_type(id).is_double() {
        return None;
    }

    let side = |node: NodeId, mapped: &str| -> Option<usize> {
        let ty = fun.result_type(node);
        if ty.cell_type() != CellType::Float || ty.dimensions().len() != 2 {
            return None;
        }
        let sparse = ty.dimension_index(mapped).map(|i| &ty.dimensions()[i])?;
        let dense = ty.dimension_index(dp).map(|i| &ty.dimensions()[i])?;
        (sparse.is_mapped() && dense.size > 1).then_some(dense.size as usize)
    };
    for (query, document) in [(lhs, rhs), (rhs, lhs)] {
        if let (Some(q_size), Some(d_size)) = (side(query, x), side(document, y)) {
            if q_size == d_size {
                return Some(NodeKind::SumMaxDotProduct {
                    query,
                    document,
                    dp_size: q_size,
                });
            }
        }
    }
    None
}

/// `reduce(map(mix - vec, square), sum, <vec dims>)` where `vec` is the
/// dense subspace type of `mix`.
fn mixed_l2_distance(fun: &mut TensorFunction, id: NodeId) -> Option<NodeKind> {
    let (map_node, dims) = as_reduce(fun, id, Aggr::Sum)?;
    let join_node = match &fun.node(map_node).kind {
        NodeKind::Map {
            child,
            function: MapFn::Square,
        } => *child,
        _ => return None,
    };
    let (lhs, rhs) = as_join(fun, join_node, JoinFn::Sub)?;

    for (mix, vec) in [(lhs, rhs), (rhs, lhs)] {
        let mix_type = fun.result_type(mix);
        let vec_type = fun.result_type(vec);
        if mix_type.count_mapped_dimensions() == 0
            || vec_type.dimensions().is_empty()
            || !vec_type.is_dense()
            || !matches!(vec_type.cell_type(), CellType::Float | CellType::Double)
            || mix_type.dense_subspace_type() != *vec_type
        {
            continue;
        }
        let mut reduced: Vec<&str> = dims.iter().map(|d| d.as_str()).collect();
        let mut expected = vec_type.dimension_names();
        reduced.sort_unstable();
        expected.sort_unstable();
        if reduced == expected && *fun.result_type(id) == mix_type.mapped_type() {
            return Some(NodeKind::MixedL2Distance { mix, vec });
        }
    }
    None
}

/// Recognize the lambda `bit(p[.., x / 8], 7 - x % 8)` (most significant bit
/// first) or `bit(p[.., x / 8], x % 8)` over an int8 parameter `p` whose
/// innermost dimension grows eightfold.
fn unpack_bits(fun: &mut TensorFunction, id: NodeId) -> Option<NodeKind> {
    let NodeKind::Lambda { bindings, body } = &fun.node(id).kind else {
        return None;
    };
    let [param] = bindings.as_slice() else {
        return None;
    };
    let param = *param;
    let res_type = fun.result_type(id);
    let src_type = fun.params().get(param)?;
    if src_type.cell_type() != CellType::Int8 || !src_type.is_dense() {
        return None;
    }
    let (src_dims, res_dims) = (src_type.dimensions(), res_type.dimensions());
    let n = res_dims.len();
    if n == 0 || src_dims.len() != n {
        return None;
    }
    for (i, (src, res)) in src_dims.iter().zip(res_dims.iter()).enumerate() {
        let expected = if i + 1 == n { src.size * 8 } else { src.size };
        if src.name != res.name || res.size != expected {
            return None;
        }
    }

    let ScalarExpr::Binary(JoinFn::Bit, peek, selector) = body else {
        return None;
    };
    let ScalarExpr::Peek { binding: 0, indexes } = peek.as_ref() else {
        return None;
    };
    if indexes.len() != n {
        return None;
    }
    let inner = n - 1;
    let outer_ok = indexes[..inner]
        .iter()
        .enumerate()
        .all(|(i, e)| *e == ScalarExpr::DimIndex(i));
    let byte = ScalarExpr::binary(JoinFn::Div, ScalarExpr::DimIndex(inner), ScalarExpr::Const(8.0));
    if !outer_ok || indexes[inner] != byte {
        return None;
    }
    let bit = ScalarExpr::binary(JoinFn::Mod, ScalarExpr::DimIndex(inner), ScalarExpr::Const(8.0));
    let big_endian = if **selector == bit {
        false
    } else if **selector == ScalarExpr::binary(JoinFn::Sub, ScalarExpr::Const(7.0), bit) {
        true
    } else {
        return None;
    };

    let src_type = src_type.clone();
    let child = fun.push_node(src_type, NodeKind::Inject(param));
    Some(NodeKind::UnpackBits { child, big_endian })
}

/// Renames that keep dense layout become a type replacement; a chain of them
/// collapses into one.
fn fast_rename(fun: &mut TensorFunction, id: NodeId) -> Option<NodeKind> {
    let NodeKind::Rename { child, from, to } = &fun.node(id).kind else {
        return None;
    };
    let child_type = fun.result_type(*child);
    let res_type = fun.result_type(id);
    let from_names: Vec<&str> = from.iter().map(|s| s.as_str()).collect();
    let to_names: Vec<&str> = to.iter().map(|s| s.as_str()).collect();
    if !is_stable_rename(child_type, res_type, &from_names, &to_names) {
        return None;
    }
    let order = mapped_order(child_type, res_type, from, to);
    match &fun.node(*child).kind {
        NodeKind::ReplaceType {
            child: grandchild,
            mapped_order: inner,
        } => Some(NodeKind::ReplaceType {
            child: *grandchild,
            mapped_order: order.iter().map(|pos| inner[*pos]).collect(),
        }),
        _ => Some(NodeKind::ReplaceType {
            child: *child,
            mapped_order: order,
        }),
    }
}

/// Operands that evaluate into a value the instruction owns.
fn produces_owned(kind: &NodeKind) -> bool {
    !matches!(
        kind,
        NodeKind::Inject(_) | NodeKind::ConstValue(_) | NodeKind::ReplaceType { .. }
    )
}

/// Join of two dense operands of one type, written into whichever operand
/// is a fresh intermediate.
fn dense_inplace_join(fun: &mut TensorFunction, id: NodeId) -> Option<NodeKind> {
    let NodeKind::Join { lhs, rhs, function } = &fun.node(id).kind else {
        return None;
    };
    let ty = fun.result_type(id);
    if ty.dimensions().is_empty()
        || !ty.is_dense()
        || !matches!(ty.cell_type(), CellType::Float | CellType::Double)
        || fun.result_type(*lhs) != ty
        || fun.result_type(*rhs) != ty
    {
        return None;
    }
    let write_left = if produces_owned(&fun.node(*lhs).kind) {
        true
    } else if produces_owned(&fun.node(*rhs).kind) {
        false
    } else {
        return None;
    };
    Some(NodeKind::DenseInplaceJoin {
        lhs: *lhs,
        rhs: *rhs,
        function: *function,
        write_left,
    })
}
