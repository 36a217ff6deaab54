// Copyright 2026 The Simlin Authors. All rights reserved.
// Use of this source code is governed by the Apache License,
// Version 2.0, that can be found in the LICENSE file.

//! Typed tensor expression trees.
//!
//! Nodes live in an arena owned by `TensorFunction` and refer to their
//! children by `NodeId`. Every node carries the result type inferred from its
//! children when it was created; a node whose inputs do not fit together has
//! the error type.

use std::fmt;
use std::sync::Arc;

use tensor_core::cell_type::CellType;
use tensor_core::value_type::{Dimension, ValueType};

use crate::aggregator::Aggr;
use crate::value::Value;

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum MapFn {
    Neg,
    Not,
    Abs,
    Square,
    Cube,
    Sqrt,
    Exp,
    Log,
    Relu,
    Sigmoid,
    Floor,
    Ceil,
    Inv,
}

impl MapFn {
    #[inline]
    pub fn apply(self, a: f64) -> f64 {
        match self {
            MapFn::Neg => -a,
            MapFn::Not => {
                if a != 0.0 {
                    0.0
                } else {
                    1.0
                }
            }
            MapFn::Abs => a.abs(),
            MapFn::Square => a * a,
            MapFn::Cube => a * a * a,
            MapFn::Sqrt => a.sqrt(),
            MapFn::Exp => a.exp(),
            MapFn::Log => a.ln(),
            MapFn::Relu => a.max(0.0),
            MapFn::Sigmoid => 1.0 / (1.0 + (-a).exp()),
            MapFn::Floor => a.floor(),
            MapFn::Ceil => a.ceil(),
            MapFn::Inv => 1.0 / a,
        }
    }

    pub fn name(self) -> &'static str {
        match self {
            MapFn::Neg => "neg",
            MapFn::Not => "not",
            MapFn::Abs => "abs",
            MapFn::Square => "square",
            MapFn::Cube => "cube",
            MapFn::Sqrt => "sqrt",
            MapFn::Exp => "exp",
            MapFn::Log => "log",
            MapFn::Relu => "relu",
            MapFn::Sigmoid => "sigmoid",
            MapFn::Floor => "floor",
            MapFn::Ceil => "ceil",
            MapFn::Inv => "inv",
        }
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum JoinFn {
    Add,
    Sub,
    Mul,
    Div,
    Mod,
    Pow,
    Max,
    Min,
    Bit,
    Hamming,
}

impl JoinFn {
    #[inline]
    pub fn apply(self, a: f64, b: f64) -> f64 {
        match self {
            JoinFn::Add => a + b,
            JoinFn::Sub => a - b,
            JoinFn::Mul => a * b,
            JoinFn::Div => a / b,
            JoinFn::Mod => a % b,
            JoinFn::Pow => a.powf(b),
            JoinFn::Max => a.max(b),
            JoinFn::Min => a.min(b),
            JoinFn::Bit => {
                let bit = b as i8;
                if (0..8).contains(&bit) {
                    (((a as i8 as u8) >> bit) & 1) as f64
                } else {
                    0.0
                }
            }
            JoinFn::Hamming => ((a as i8 as u8) ^ (b as i8 as u8)).count_ones() as f64,
        }
    }

    pub fn name(self) -> &'static str {
        match self {
            JoinFn::Add => "add",
            JoinFn::Sub => "sub",
            JoinFn::Mul => "mul",
            JoinFn::Div => "div",
            JoinFn::Mod => "mod",
            JoinFn::Pow => "pow",
            JoinFn::Max => "max",
            JoinFn::Min => "min",
            JoinFn::Bit => "bit",
            JoinFn::Hamming => "hamming",
        }
    }
}

/// Per cell expression of a tensor lambda. `DimIndex(i)` is the index of
/// the cell along the i-th result dimension; `Peek` reads a cell of a bound
/// dense tensor, truncating the computed indexes and reading 0 outside its
/// bounds.
#[derive(Clone, Debug, PartialEq)]
pub enum ScalarExpr {
    Const(f64),
    DimIndex(usize),
    Unary(MapFn, Box<ScalarExpr>),
    Binary(JoinFn, Box<ScalarExpr>, Box<ScalarExpr>),
    Peek {
        binding: usize,
        indexes: Vec<ScalarExpr>,
    },
}

impl ScalarExpr {
    pub fn unary(function: MapFn, child: ScalarExpr) -> Self {
        ScalarExpr::Unary(function, Box::new(child))
    }

    pub fn binary(function: JoinFn, lhs: ScalarExpr, rhs: ScalarExpr) -> Self {
        ScalarExpr::Binary(function, Box::new(lhs), Box::new(rhs))
    }

    pub fn eval(&self, dims: &[usize], bindings: &[&dyn Value]) -> f64 {
        match self {
            ScalarExpr::Const(v) => *v,
            ScalarExpr::DimIndex(i) => dims[*i] as f64,
            ScalarExpr::Unary(f, child) => f.apply(child.eval(dims, bindings)),
            ScalarExpr::Binary(f, lhs, rhs) => {
                f.apply(lhs.eval(dims, bindings), rhs.eval(dims, bindings))
            }
            ScalarExpr::Peek { binding, indexes } => {
                let value = bindings[*binding];
                let ty = value.value_type();
                let mut offset = 0;
                for (dim, expr) in ty.dimensions().iter().zip(indexes.iter()) {
                    let idx = expr.eval(dims, bindings).trunc();
                    if !(idx >= 0.0 && idx < dim.size as f64) {
                        return 0.0;
                    }
                    offset = offset * dim.size as usize + idx as usize;
                }
                value.cells().get(offset)
            }
        }
    }

    /// Whether every dimension index is below `rank` and every peek names a
    /// bound parameter with one index per dimension.
    fn fits(&self, rank: usize, binding_ranks: &[usize]) -> bool {
        match self {
            ScalarExpr::Const(_) => true,
            ScalarExpr::DimIndex(i) => *i < rank,
            ScalarExpr::Unary(_, child) => child.fits(rank, binding_ranks),
            ScalarExpr::Binary(_, lhs, rhs) => {
                lhs.fits(rank, binding_ranks) && rhs.fits(rank, binding_ranks)
            }
            ScalarExpr::Peek { binding, indexes } => {
                binding_ranks.get(*binding) == Some(&indexes.len())
                    && indexes.iter().all(|e| e.fits(rank, binding_ranks))
            }
        }
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct NodeId(usize);

impl NodeId {
    pub fn index(self) -> usize {
        self.0
    }
}

#[derive(Clone)]
pub enum NodeKind {
    ConstValue(Arc<dyn Value>),
    Inject(usize),
    Join {
        lhs: NodeId,
        rhs: NodeId,
        function: JoinFn,
    },
    Merge {
        lhs: NodeId,
        rhs: NodeId,
        function: JoinFn,
    },
    Concat {
        lhs: NodeId,
        rhs: NodeId,
        dimension: String,
    },
    Reduce {
        child: NodeId,
        aggr: Aggr,
        dimensions: Vec<String>,
    },
    Map {
        child: NodeId,
        function: MapFn,
    },
    Rename {
        child: NodeId,
        from: Vec<String>,
        to: Vec<String>,
    },
    CellCast {
        child: NodeId,
        cell_type: CellType,
    },
    Lambda {
        bindings: Vec<usize>,
        body: ScalarExpr,
    },
    MapSubspaces {
        child: NodeId,
        lambda: Arc<TensorFunction>,
    },
    FilterSubspaces {
        child: NodeId,
        lambda: Arc<TensorFunction>,
    },
    // fused forms, produced only by the optimizer
    ReplaceType {
        child: NodeId,
        /// for each result mapped dimension, its position among the child's
        mapped_order: Vec<usize>,
    },
    DenseInplaceJoin {
        lhs: NodeId,
        rhs: NodeId,
        function: JoinFn,
        write_left: bool,
    },
    SumMaxDotProduct {
        query: NodeId,
        document: NodeId,
        dp_size: usize,
    },
    UnpackBits {
        child: NodeId,
        big_endian: bool,
    },
    MixedL2Distance {
        mix: NodeId,
        vec: NodeId,
    },
}

impl NodeKind {
    pub fn name(&self) -> &'static str {
        match self {
            NodeKind::ConstValue(_) => "const_value",
            NodeKind::Inject(_) => "inject",
            NodeKind::Join { .. } => "join",
            NodeKind::Merge { .. } => "merge",
            NodeKind::Concat { .. } => "concat",
            NodeKind::Reduce { .. } => "reduce",
            NodeKind::Map { .. } => "map",
            NodeKind::Rename { .. } => "rename",
            NodeKind::CellCast { .. } => "cell_cast",
            NodeKind::Lambda { .. } => "tensor_lambda",
            NodeKind::MapSubspaces { .. } => "map_subspaces",
            NodeKind::FilterSubspaces { .. } => "filter_subspaces",
            NodeKind::ReplaceType { .. } => "replace_type",
            NodeKind::DenseInplaceJoin { .. } => "dense_inplace_join",
            NodeKind::SumMaxDotProduct { .. } => "sum_max_dot_product",
            NodeKind::UnpackBits { .. } => "unpack_bits",
            NodeKind::MixedL2Distance { .. } => "mixed_l2_distance",
        }
    }

    /// Child nodes in evaluation order.
    pub fn children(&self) -> Vec<NodeId> {
        match self {
            NodeKind::ConstValue(_) | NodeKind::Inject(_) | NodeKind::Lambda { .. } => vec![],
            NodeKind::Join { lhs, rhs, .. }
            | NodeKind::Merge { lhs, rhs, .. }
            | NodeKind::Concat { lhs, rhs, .. }
            | NodeKind::DenseInplaceJoin { lhs, rhs, .. } => vec![*lhs, *rhs],
            NodeKind::SumMaxDotProduct {
                query, document, ..
            } => vec![*query, *document],
            NodeKind::MixedL2Distance { mix, vec } => vec![*mix, *vec],
            NodeKind::Reduce { child, .. }
            | NodeKind::Map { child, .. }
            | NodeKind::Rename { child, .. }
            | NodeKind::CellCast { child, .. }
            | NodeKind::MapSubspaces { child, .. }
            | NodeKind::FilterSubspaces { child, .. }
            | NodeKind::ReplaceType { child, .. }
            | NodeKind::UnpackBits { child, .. } => vec![*child],
        }
    }
}

#[derive(Clone)]
pub struct TensorNode {
    pub result_type: ValueType,
    pub kind: NodeKind,
}

#[derive(Clone)]
pub struct TensorFunction {
    params: Vec<ValueType>,
    nodes: Vec<TensorNode>,
    root: Option<NodeId>,
}

impl TensorFunction {
    pub fn new(params: Vec<ValueType>) -> Self {
        TensorFunction {
            params,
            nodes: vec![],
            root: None,
        }
    }

    pub fn params(&self) -> &[ValueType] {
        &self.params
    }

    pub fn node(&self, id: NodeId) -> &TensorNode {
        &self.nodes[id.0]
    }

    pub fn result_type(&self, id: NodeId) -> &ValueType {
        &self.nodes[id.0].result_type
    }

    pub fn len(&self) -> usize {
        self.nodes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.nodes.is_empty()
    }

    pub fn root(&self) -> Option<NodeId> {
        self.root
    }

    pub fn set_root(&mut self, id: NodeId) {
        self.root = Some(id);
    }

    /// Result type of the whole function; the error type without a root.
    pub fn root_type(&self) -> ValueType {
        match self.root {
            Some(id) => self.result_type(id).clone(),
            None => ValueType::error(),
        }
    }

    /// Nodes reachable from the root, children before parents.
    pub fn reachable(&self) -> Vec<NodeId> {
        let mut seen = vec![false; self.nodes.len()];
        let mut order = vec![];
        if let Some(root) = self.root {
            self.post_order(root, &mut seen, &mut order);
        }
        order
    }

    fn post_order(&self, id: NodeId, seen: &mut [bool], order: &mut Vec<NodeId>) {
        if std::mem::replace(&mut seen[id.0], true) {
            return;
        }
        for child in self.nodes[id.0].kind.children() {
            self.post_order(child, seen, order);
        }
        order.push(id);
    }

    /// First reachable node with the error type.
    pub fn find_error(&self) -> Option<NodeId> {
        self.reachable()
            .into_iter()
            .find(|id| self.result_type(*id).is_error())
    }

    fn push(&mut self, result_type: ValueType, kind: NodeKind) -> NodeId {
        self.nodes.push(TensorNode { result_type, kind });
        NodeId(self.nodes.len() - 1)
    }

    pub(crate) fn replace(&mut self, id: NodeId, kind: NodeKind) {
        self.nodes[id.0].kind = kind;
    }

    pub(crate) fn push_node(&mut self, result_type: ValueType, kind: NodeKind) -> NodeId {
        self.push(result_type, kind)
    }

    pub fn const_value(&mut self, value: Arc<dyn Value>) -> NodeId {
        let ty = value.value_type().clone();
        self.push(ty, NodeKind::ConstValue(value))
    }

    pub fn inject(&mut self, param: usize) -> NodeId {
        let ty = match self.params.get(param) {
            Some(ty) => ty.clone(),
            None => ValueType::error(),
        };
        self.push(ty, NodeKind::Inject(param))
    }

    pub fn join(&mut self, lhs: NodeId, rhs: NodeId, function: JoinFn) -> NodeId {
        let ty = ValueType::join(self.result_type(lhs), self.result_type(rhs));
        self.push(ty, NodeKind::Join { lhs, rhs, function })
    }

    pub fn merge(&mut self, lhs: NodeId, rhs: NodeId, function: JoinFn) -> NodeId {
        let ty = ValueType::merge(self.result_type(lhs), self.result_type(rhs));
        self.push(ty, NodeKind::Merge { lhs, rhs, function })
    }

    pub fn concat(&mut self, lhs: NodeId, rhs: NodeId, dimension: &str) -> NodeId {
        let ty = ValueType::concat(self.result_type(lhs), self.result_type(rhs), dimension);
        let dimension = dimension.to_owned();
        self.push(ty, NodeKind::Concat {
            lhs,
            rhs,
            dimension,
        })
    }

    /// Reduce over `dimensions`; an empty list reduces every dimension.
    pub fn reduce(&mut self, child: NodeId, aggr: Aggr, dimensions: &[&str]) -> NodeId {
        let ty = self.result_type(child).reduce(dimensions);
        let dimensions = dimensions.iter().map(|d| (*d).to_owned()).collect();
        self.push(ty, NodeKind::Reduce {
            child,
            aggr,
            dimensions,
        })
    }

    pub fn map(&mut self, child: NodeId, function: MapFn) -> NodeId {
        let ty = self.result_type(child).map();
        self.push(ty, NodeKind::Map { child, function })
    }

    pub fn rename(&mut self, child: NodeId, from: &[&str], to: &[&str]) -> NodeId {
        let ty = self.result_type(child).rename(from, to);
        let from = from.iter().map(|d| (*d).to_owned()).collect();
        let to = to.iter().map(|d| (*d).to_owned()).collect();
        self.push(ty, NodeKind::Rename { child, from, to })
    }

    pub fn cell_cast(&mut self, child: NodeId, cell_type: CellType) -> NodeId {
        let ty = self.result_type(child).cell_cast(cell_type);
        self.push(ty, NodeKind::CellCast { child, cell_type })
    }

    /// Dense tensor computed cell by cell from `body`. `bindings` name the
    /// parameters `Peek` may read; each must be a dense parameter.
    pub fn lambda(&mut self, result_type: ValueType, bindings: Vec<usize>, body: ScalarExpr) -> NodeId {
        let binding_ranks: Option<Vec<usize>> = bindings
            .iter()
            .map(|p| match self.params.get(*p) {
                Some(ty) if !ty.is_error() && ty.count_mapped_dimensions() == 0 => {
                    Some(ty.dimensions().len())
                }
                _ => None,
            })
            .collect();
        let body_ok = binding_ranks
            .as_deref()
            .is_some_and(|ranks| body.fits(result_type.dimensions().len(), ranks));
        let ty = if body_ok && !result_type.is_error() && result_type.count_mapped_dimensions() == 0 {
            result_type
        } else {
            ValueType::error()
        };
        self.push(ty, NodeKind::Lambda { bindings, body })
    }

    /// Apply `lambda` to every dense subspace of `child`. The lambda takes
    /// one parameter of the child's dense subspace type and must produce a
    /// dense result.
    pub fn map_subspaces(&mut self, child: NodeId, lambda: TensorFunction) -> NodeId {
        let child_ty = self.result_type(child);
        let inner = lambda.root_type();
        let ty = if lambda.params() != [child_ty.dense_subspace_type()]
            || inner.is_error()
            || inner.count_mapped_dimensions() > 0
        {
            ValueType::error()
        } else {
            let dims: Vec<Dimension> = child_ty
                .mapped_dimensions()
                .into_iter()
                .chain(inner.dimensions().iter())
                .cloned()
                .collect();
            if dims.is_empty() {
                ValueType::double()
            } else if inner.dimensions().is_empty() {
                ValueType::make_type(CellType::Double, dims)
            } else {
                ValueType::make_type(inner.cell_type(), dims)
            }
        };
        self.push(ty, NodeKind::MapSubspaces {
            child,
            lambda: Arc::new(lambda),
        })
    }

    /// Keep the subspaces of `child` for which `lambda` yields a nonzero
    /// scalar.
    pub fn filter_subspaces(&mut self, child: NodeId, lambda: TensorFunction) -> NodeId {
        let child_ty = self.result_type(child);
        let ty = if lambda.params() == [child_ty.dense_subspace_type()]
            && lambda.root_type().is_double()
        {
            child_ty.clone()
        } else {
            ValueType::error()
        };
        self.push(ty, NodeKind::FilterSubspaces {
            child,
            lambda: Arc::new(lambda),
        })
    }

    fn fmt_node(&self, f: &mut fmt::Formatter, id: NodeId, depth: usize) -> fmt::Result {
        let node = self.node(id);
        write!(f, "{:indent$}{}", "", node.kind.name(), indent = depth * 2)?;
        match &node.kind {
            NodeKind::Inject(param) => write!(f, "({param})")?,
            NodeKind::Join { function, .. }
            | NodeKind::Merge { function, .. }
            | NodeKind::DenseInplaceJoin { function, .. } => write!(f, "({})", function.name())?,
            NodeKind::Map { function, .. } => write!(f, "({})", function.name())?,
            NodeKind::Reduce {
                aggr, dimensions, ..
            } => write!(f, "({}, [{}])", aggr, dimensions.join(","))?,
            _ => {}
        }
        writeln!(f, " -> {}", node.result_type)?;
        for child in node.kind.children() {
            self.fmt_node(f, child, depth + 1)?;
        }
        Ok(())
    }
}

impl fmt::Display for TensorFunction {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        match self.root {
            Some(root) => self.fmt_node(f, root, 0),
            None => writeln!(f, "<empty>"),
        }
    }
}
