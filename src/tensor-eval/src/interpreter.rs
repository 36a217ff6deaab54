// Copyright 2026 The Simlin Authors. All rights reserved.
// Use of this source code is governed by the Apache License,
// Version 2.0, that can be found in the LICENSE file.

//! Compilation of a `TensorFunction` into a flat instruction program and the
//! stack machine that runs it.
//!
//! Instruction parameters (plans, nested programs, constants) live in a
//! `Stash` owned by the compiled function, so they are allocated once and
//! shared by every evaluation. Values on the operand stack either borrow
//! from the caller (parameters), from the stash (constants), or are owned
//! by the evaluation.

use std::any::Any;
use std::fmt;
use std::ops::Deref;
use std::sync::Arc;

use smallvec::SmallVec;

use tensor_core::common::{Error, ErrorCode, ErrorKind, Result};
use tensor_core::tensor_spec::TensorSpec;
use tensor_core::value_type::ValueType;
use tensor_core::eval_err;

use crate::accel::{Accelerator, SIMD_ACCELERATOR};
use crate::function::{NodeId, NodeKind, TensorFunction};
use crate::fused::inplace_join::{InplaceJoinParam, perform_inplace_join};
use crate::fused::mixed_l2::perform_mixed_l2_distance;
use crate::fused::replace_type::ReplaceTypeValue;
use crate::fused::sum_max_dot::perform_sum_max_dot_product;
use crate::fused::unpack_bits::{UnpackBitsParam, perform_unpack_bits};
use crate::ops::cell_cast::perform_cell_cast;
use crate::ops::concat::{ConcatParam, perform_concat};
use crate::ops::join::{JoinParam, perform_join};
use crate::ops::lambda::{LambdaParam, perform_lambda};
use crate::ops::map::{MapParam, perform_map};
use crate::ops::merge::{MergeParam, perform_merge};
use crate::ops::reduce::{ReduceParam, perform_reduce};
use crate::ops::rename::{RenameParam, perform_rename};
use crate::ops::subspaces::{SubspacesParam, perform_filter_subspaces, perform_map_subspaces};
use crate::optimizer::optimize;
use crate::value::{Value, ValueBuilderFactory, spec_from_value};

/// Index of a parameter block in a `Stash`.
pub type StashId = usize;

/// Arena of heterogeneous instruction parameters, alive as long as the
/// compiled function.
#[derive(Default)]
pub struct Stash {
    items: Vec<Box<dyn Any + Send + Sync>>,
}

impl Stash {
    pub fn new() -> Self {
        Stash::default()
    }

    pub fn create<T: Any + Send + Sync>(&mut self, item: T) -> StashId {
        self.items.push(Box::new(item));
        self.items.len() - 1
    }

    pub fn get<T: Any>(&self, id: StashId) -> &T {
        // the compiler stores exactly the type the opcode reads back
        self.items[id].downcast_ref::<T>().unwrap()
    }

    pub fn len(&self) -> usize {
        self.items.len()
    }

    pub fn is_empty(&self) -> bool {
        self.items.is_empty()
    }
}

/// A value on the operand stack.
pub enum StackValue<'a> {
    Borrowed(&'a dyn Value),
    Owned(Box<dyn Value + 'a>),
}

impl<'a> Deref for StackValue<'a> {
    type Target = dyn Value + 'a;

    fn deref(&self) -> &(dyn Value + 'a) {
        match self {
            StackValue::Borrowed(value) => *value,
            StackValue::Owned(value) => value.as_ref(),
        }
    }
}

impl StackValue<'_> {
    pub fn to_spec(&self) -> TensorSpec {
        spec_from_value(&**self)
    }
}

#[derive(Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "debug-derive", derive(Debug))]
pub(crate) enum Opcode {
    // === OPERANDS ===
    ConstValue { param: StashId },
    Inject { param: usize },

    // === GENERIC ===
    Join { param: StashId },
    Merge { param: StashId },
    Concat { param: StashId },
    Reduce { param: StashId },
    Map { param: StashId },
    Rename { param: StashId },
    CellCast { param: StashId },
    Lambda { param: StashId },
    MapSubspaces { param: StashId },
    FilterSubspaces { param: StashId },

    // === FUSED ===
    ReplaceType { param: StashId },
    DenseInplaceJoin { param: StashId },
    SumMaxDotProduct { dp_size: usize },
    UnpackBits { param: StashId },
    MixedL2Distance { param: StashId },
}

struct ReplaceTypeParam {
    res_type: ValueType,
    mapped_order: Option<Vec<usize>>,
}

/// Compile-time choices.
#[derive(Clone, Copy)]
pub struct CompileOptions {
    /// run the optimizer pass before emitting instructions
    pub optimize: bool,
    /// kernel provider for fused instructions
    pub accelerator: &'static dyn Accelerator,
}

impl Default for CompileOptions {
    fn default() -> Self {
        CompileOptions {
            optimize: true,
            accelerator: &SIMD_ACCELERATOR,
        }
    }
}

impl CompileOptions {
    pub fn generic() -> Self {
        CompileOptions {
            optimize: false,
            ..CompileOptions::default()
        }
    }
}

pub struct InterpretedFunction {
    params: Vec<ValueType>,
    result_type: ValueType,
    program: Vec<Opcode>,
    stash: Stash,
    factory: &'static dyn ValueBuilderFactory,
    accel: &'static dyn Accelerator,
}

impl fmt::Debug for InterpretedFunction {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        f.debug_struct("InterpretedFunction")
            .field("result_type", &self.result_type.to_spec())
            .field("instructions", &self.program.len())
            .field("factory", &self.factory.name())
            .finish()
    }
}

struct Compiler<'f> {
    fun: &'f TensorFunction,
    factory: &'static dyn ValueBuilderFactory,
    options: CompileOptions,
    stash: Stash,
    program: Vec<Opcode>,
}

impl Compiler<'_> {
    fn child_type(&self, id: NodeId) -> &ValueType {
        self.fun.result_type(id)
    }

    fn compile(&mut self, id: NodeId) -> Result<()> {
        let fun = self.fun;
        let node = fun.node(id);
        for child in node.kind.children() {
            self.compile(child)?;
        }
        let res_type = node.result_type.clone();
        let op = match &node.kind {
            NodeKind::ConstValue(value) => Opcode::ConstValue {
                param: self.stash.create(value.clone()),
            },
            NodeKind::Inject(param) => Opcode::Inject { param: *param },
            NodeKind::Join { lhs, rhs, function } => {
                let param = JoinParam::new(self.child_type(*lhs), self.child_type(*rhs), &res_type, *function);
                Opcode::Join {
                    param: self.stash.create(param),
                }
            }
            NodeKind::Merge { function, .. } => Opcode::Merge {
                param: self.stash.create(MergeParam {
                    res_type,
                    function: *function,
                }),
            },
            NodeKind::Concat {
                lhs,
                rhs,
                dimension,
            } => {
                let param = ConcatParam::new(self.child_type(*lhs), self.child_type(*rhs), &res_type, dimension);
                Opcode::Concat {
                    param: self.stash.create(param),
                }
            }
            NodeKind::Reduce { child, aggr, .. } => {
                let param = ReduceParam::new(self.child_type(*child), &res_type, *aggr);
                Opcode::Reduce {
                    param: self.stash.create(param),
                }
            }
            NodeKind::Map { function, .. } => Opcode::Map {
                param: self.stash.create(MapParam {
                    res_type,
                    function: *function,
                }),
            },
            NodeKind::Rename { child, from, to } => {
                let param = RenameParam::new(self.child_type(*child), &res_type, from, to);
                Opcode::Rename {
                    param: self.stash.create(param),
                }
            }
            NodeKind::CellCast { .. } => Opcode::CellCast {
                param: self.stash.create(res_type),
            },
            NodeKind::Lambda { bindings, body } => Opcode::Lambda {
                param: self.stash.create(LambdaParam {
                    res_type,
                    bindings: bindings.clone(),
                    body: body.clone(),
                }),
            },
            NodeKind::MapSubspaces { child, lambda } => Opcode::MapSubspaces {
                param: self.compile_subspaces(*child, lambda, res_type)?,
            },
            NodeKind::FilterSubspaces { child, lambda } => Opcode::FilterSubspaces {
                param: self.compile_subspaces(*child, lambda, res_type)?,
            },
            NodeKind::ReplaceType { child, mapped_order } => {
                let identity = mapped_order.iter().enumerate().all(|(i, pos)| i == *pos);
                debug_assert_eq!(
                    self.child_type(*child).count_mapped_dimensions(),
                    mapped_order.len()
                );
                Opcode::ReplaceType {
                    param: self.stash.create(ReplaceTypeParam {
                        res_type,
                        mapped_order: if identity {
                            None
                        } else {
                            Some(mapped_order.clone())
                        },
                    }),
                }
            }
            NodeKind::DenseInplaceJoin {
                lhs,
                rhs,
                function,
                write_left,
            } => {
                let join = JoinParam::new(self.child_type(*lhs), self.child_type(*rhs), &res_type, *function);
                Opcode::DenseInplaceJoin {
                    param: self.stash.create(InplaceJoinParam {
                        join,
                        write_left: *write_left,
                    }),
                }
            }
            NodeKind::SumMaxDotProduct { dp_size, .. } => Opcode::SumMaxDotProduct { dp_size: *dp_size },
            NodeKind::UnpackBits { big_endian, .. } => Opcode::UnpackBits {
                param: self.stash.create(UnpackBitsParam {
                    res_type,
                    big_endian: *big_endian,
                }),
            },
            NodeKind::MixedL2Distance { .. } => Opcode::MixedL2Distance {
                param: self.stash.create(res_type),
            },
        };
        tracing::trace!(node = id.index(), kind = node.kind.name(), "emit instruction");
        self.program.push(op);
        Ok(())
    }

    fn compile_subspaces(
        &mut self,
        child: NodeId,
        lambda: &TensorFunction,
        res_type: ValueType,
    ) -> Result<StashId> {
        let inner = InterpretedFunction::new(lambda, self.factory, self.options)?;
        let subspace_type = self.child_type(child).dense_subspace_type();
        Ok(self.stash.create(SubspacesParam {
            res_type,
            subspace_type,
            inner,
        }))
    }
}

/// Operand stack of one evaluation.
struct Stack<'a> {
    stack: Vec<StackValue<'a>>,
}

impl<'a> Stack<'a> {
    fn new() -> Self {
        Stack {
            stack: Vec::with_capacity(8),
        }
    }

    #[inline(always)]
    fn push(&mut self, value: StackValue<'a>) {
        self.stack.push(value)
    }

    #[inline(always)]
    fn push_owned(&mut self, value: Box<dyn Value>) {
        self.stack.push(StackValue::Owned(value))
    }

    #[inline(always)]
    fn pop(&mut self) -> StackValue<'a> {
        self.stack.pop().unwrap()
    }
}

impl InterpretedFunction {
    /// Compile `function`. Fails when the function has no root or any
    /// reachable node has the error type.
    pub fn new(
        function: &TensorFunction,
        factory: &'static dyn ValueBuilderFactory,
        options: CompileOptions,
    ) -> Result<Self> {
        let Some(root) = function.root() else {
            return Err(Error::new(
                ErrorKind::Type,
                ErrorCode::ErrorType,
                Some("function has no root".to_owned()),
            ));
        };
        if let Some(bad) = function.find_error() {
            let kind = &function.node(bad).kind;
            let code = match kind {
                NodeKind::Lambda { .. } | NodeKind::MapSubspaces { .. } | NodeKind::FilterSubspaces { .. } => {
                    ErrorCode::LambdaResultType
                }
                _ => ErrorCode::ErrorType,
            };
            return Err(Error::new(
                ErrorKind::Type,
                code,
                Some(format!("node {} ({}) has the error type", bad.index(), kind.name())),
            ));
        }

        let optimized;
        let fun = if options.optimize {
            optimized = optimize(function);
            &optimized
        } else {
            function
        };
        let mut compiler = Compiler {
            fun,
            factory,
            options,
            stash: Stash::new(),
            program: vec![],
        };
        compiler.compile(fun.root().unwrap_or(root))?;
        tracing::debug!(
            instructions = compiler.program.len(),
            stash = compiler.stash.len(),
            factory = factory.name(),
            "compiled tensor function"
        );

        Ok(InterpretedFunction {
            params: function.params().to_vec(),
            result_type: fun.root_type(),
            program: compiler.program,
            stash: compiler.stash,
            factory,
            accel: options.accelerator,
        })
    }

    pub fn params(&self) -> &[ValueType] {
        &self.params
    }

    pub fn result_type(&self) -> &ValueType {
        &self.result_type
    }

    pub fn num_instructions(&self) -> usize {
        self.program.len()
    }

    /// Evaluate with `params`, whose count and types must match the
    /// function's parameter types.
    pub fn eval<'a>(&'a self, params: &[&'a dyn Value]) -> Result<StackValue<'a>> {
        if params.len() != self.params.len() {
            return eval_err!(
                BadParamCount,
                format!("expected {} params, got {}", self.params.len(), params.len())
            );
        }
        for (i, (value, ty)) in params.iter().zip(self.params.iter()).enumerate() {
            if value.value_type() != ty {
                return eval_err!(
                    ParamTypeMismatch,
                    format!("param {}: expected {}, got {}", i, ty, value.value_type())
                );
            }
        }
        Ok(self.run(params))
    }

    /// Evaluate without checking `params`.
    pub(crate) fn run<'a>(&'a self, params: &[&'a dyn Value]) -> StackValue<'a> {
        let factory = self.factory;
        let stash = &self.stash;
        let mut stack = Stack::new();
        for op in self.program.iter() {
            match *op {
                Opcode::ConstValue { param } => {
                    let value = stash.get::<Arc<dyn Value>>(param);
                    stack.push(StackValue::Borrowed(value.as_ref()));
                }
                Opcode::Inject { param } => {
                    stack.push(StackValue::Borrowed(params[param]));
                }
                Opcode::Join { param } => {
                    let rhs = stack.pop();
                    let lhs = stack.pop();
                    let param = stash.get::<JoinParam>(param);
                    stack.push_owned(perform_join(&*lhs, &*rhs, param, factory));
                }
                Opcode::Merge { param } => {
                    let rhs = stack.pop();
                    let lhs = stack.pop();
                    let param = stash.get::<MergeParam>(param);
                    stack.push_owned(perform_merge(&*lhs, &*rhs, param, factory));
                }
                Opcode::Concat { param } => {
                    let rhs = stack.pop();
                    let lhs = stack.pop();
                    let param = stash.get::<ConcatParam>(param);
                    stack.push_owned(perform_concat(&*lhs, &*rhs, param, factory));
                }
                Opcode::Reduce { param } => {
                    let child = stack.pop();
                    let param = stash.get::<ReduceParam>(param);
                    stack.push_owned(perform_reduce(&*child, param, factory));
                }
                Opcode::Map { param } => {
                    let child = stack.pop();
                    let param = stash.get::<MapParam>(param);
                    stack.push_owned(perform_map(&*child, param, factory));
                }
                Opcode::Rename { param } => {
                    let child = stack.pop();
                    let param = stash.get::<RenameParam>(param);
                    stack.push_owned(perform_rename(&*child, param, factory));
                }
                Opcode::CellCast { param } => {
                    let child = stack.pop();
                    let res_type = stash.get::<ValueType>(param);
                    stack.push_owned(perform_cell_cast(&*child, res_type, factory));
                }
                Opcode::Lambda { param } => {
                    let param = stash.get::<LambdaParam>(param);
                    let bindings: SmallVec<[&dyn Value; 4]> =
                        param.bindings.iter().map(|p| params[*p]).collect();
                    stack.push_owned(perform_lambda(param, &bindings, factory));
                }
                Opcode::MapSubspaces { param } => {
                    let child = stack.pop();
                    let param = stash.get::<SubspacesParam>(param);
                    stack.push_owned(perform_map_subspaces(&*child, param, factory));
                }
                Opcode::FilterSubspaces { param } => {
                    let child = stack.pop();
                    let param = stash.get::<SubspacesParam>(param);
                    stack.push_owned(perform_filter_subspaces(&*child, param, factory));
                }
                Opcode::ReplaceType { param } => {
                    let child = stack.pop();
                    let param = stash.get::<ReplaceTypeParam>(param);
                    let value = ReplaceTypeValue::new(child, &param.res_type, param.mapped_order.as_deref());
                    stack.push(StackValue::Owned(Box::new(value)));
                }
                Opcode::DenseInplaceJoin { param } => {
                    let rhs = stack.pop();
                    let lhs = stack.pop();
                    let param = stash.get::<InplaceJoinParam>(param);
                    stack.push(perform_inplace_join(lhs, rhs, param, factory));
                }
                Opcode::SumMaxDotProduct { dp_size } => {
                    let document = stack.pop();
                    let query = stack.pop();
                    let result = perform_sum_max_dot_product(&*query, &*document, dp_size, self.accel);
                    stack.push_owned(Box::new(result));
                }
                Opcode::UnpackBits { param } => {
                    let child = stack.pop();
                    let param = stash.get::<UnpackBitsParam>(param);
                    stack.push_owned(perform_unpack_bits(&*child, param, factory));
                }
                Opcode::MixedL2Distance { param } => {
                    let vec = stack.pop();
                    let mix = stack.pop();
                    let res_type = stash.get::<ValueType>(param);
                    stack.push_owned(perform_mixed_l2_distance(&*mix, &*vec, res_type, self.accel, factory));
                }
            }
        }
        debug_assert_eq!(1, stack.stack.len());
        stack.pop()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::aggregator::Aggr;
    use crate::fast_value::FastValueBuilderFactory;
    use crate::function::{JoinFn, MapFn};
    use crate::simple_value::SimpleValueBuilderFactory;
    use crate::value::{DoubleValue, value_from_spec};
    use tensor_core::common::ErrorKind;
    use tensor_core::tensor_spec::{Label, address};

    fn types(specs: &[&str]) -> Vec<ValueType> {
        specs.iter().map(|s| ValueType::from_spec(s)).collect()
    }

    fn mixed_spec() -> TensorSpec {
        TensorSpec::new("tensor(x{},y[2])")
            .add(address(&[("x", "a".into()), ("y", Label::Index(0))]), 1.0)
            .add(address(&[("x", "a".into()), ("y", Label::Index(1))]), 5.0)
            .add(address(&[("x", "b".into()), ("y", Label::Index(0))]), 2.0)
            .add(address(&[("x", "b".into()), ("y", Label::Index(1))]), 6.0)
            .add(address(&[("x", "c".into()), ("y", Label::Index(0))]), -3.0)
            .add(address(&[("x", "c".into()), ("y", Label::Index(1))]), 3.0)
    }

    #[test]
    fn evaluates_expression_tree() {
        // reduce(map(a, square) + 1, sum, y)
        let mut fun = TensorFunction::new(types(&["tensor(x{},y[2])"]));
        let a = fun.inject(0);
        let squared = fun.map(a, MapFn::Square);
        let one = fun.const_value(Arc::new(DoubleValue::new(1.0)));
        let plus = fun.join(squared, one, JoinFn::Add);
        let sum = fun.reduce(plus, Aggr::Sum, &["y"]);
        fun.set_root(sum);

        let compiled = InterpretedFunction::new(&fun, &FastValueBuilderFactory, CompileOptions::default()).unwrap();
        assert_eq!(5, compiled.num_instructions());
        let input = value_from_spec(&mixed_spec(), &FastValueBuilderFactory).unwrap();
        let result = compiled.eval(&[input.as_ref()]).unwrap();
        let expected = TensorSpec::new("tensor(x{})")
            .add(address(&[("x", "a".into())]), 28.0)
            .add(address(&[("x", "b".into())]), 42.0)
            .add(address(&[("x", "c".into())]), 20.0);
        assert_eq!(expected, result.to_spec());
    }

    #[test]
    fn parameter_checks() {
        let mut fun = TensorFunction::new(types(&["tensor(x[2])"]));
        let a = fun.inject(0);
        fun.set_root(a);
        let compiled = InterpretedFunction::new(&fun, &SimpleValueBuilderFactory, CompileOptions::default()).unwrap();

        let err = compiled.eval(&[]).err().unwrap();
        assert_eq!(ErrorKind::Eval, err.kind);
        assert_eq!(ErrorCode::BadParamCount, err.code);

        let wrong = DoubleValue::new(1.0);
        let err = compiled.eval(&[&wrong]).err().unwrap();
        assert_eq!(ErrorCode::ParamTypeMismatch, err.code);
    }

    #[test]
    fn refuses_error_typed_functions() {
        let mut fun = TensorFunction::new(types(&["tensor(x[2])", "tensor(x{})"]));
        let a = fun.inject(0);
        let b = fun.inject(1);
        let bad = fun.join(a, b, JoinFn::Add);
        fun.set_root(bad);
        let err = InterpretedFunction::new(&fun, &SimpleValueBuilderFactory, CompileOptions::default())
            .err()
            .unwrap();
        assert_eq!(ErrorKind::Type, err.kind);
        assert_eq!(ErrorCode::ErrorType, err.code);

        let empty = TensorFunction::new(vec![]);
        assert!(InterpretedFunction::new(&empty, &SimpleValueBuilderFactory, CompileOptions::default()).is_err());

        let mut fun = TensorFunction::new(types(&["tensor(x{},y[2])"]));
        let a = fun.inject(0);
        let mut inner = TensorFunction::new(types(&["tensor(x[2])"]));
        let p = inner.inject(0);
        inner.set_root(p);
        let mapped = fun.map_subspaces(a, inner);
        fun.set_root(mapped);
        let err = InterpretedFunction::new(&fun, &SimpleValueBuilderFactory, CompileOptions::default())
            .err()
            .unwrap();
        assert_eq!(ErrorCode::LambdaResultType, err.code);
    }

    #[test]
    fn map_and_filter_subspaces() {
        let factory = &FastValueBuilderFactory;
        let mut fun = TensorFunction::new(types(&["tensor(x{},y[2])"]));
        let a = fun.inject(0);

        // keep subspaces whose cells sum to more than 4
        let mut keep = TensorFunction::new(types(&["tensor(y[2])"]));
        let p = keep.inject(0);
        let sum = keep.reduce(p, Aggr::Sum, &[]);
        let limit = keep.const_value(Arc::new(DoubleValue::new(4.0)));
        let over = keep.join(sum, limit, JoinFn::Sub);
        let positive = keep.map(over, MapFn::Relu);
        keep.set_root(positive);
        let filtered = fun.filter_subspaces(a, keep);

        // then take the max of each survivor
        let mut max = TensorFunction::new(types(&["tensor(y[2])"]));
        let p = max.inject(0);
        let m = max.reduce(p, Aggr::Max, &[]);
        max.set_root(m);
        let maxed = fun.map_subspaces(filtered, max);
        fun.set_root(maxed);
        assert_eq!("tensor(x{})", fun.root_type().to_spec());

        let compiled = InterpretedFunction::new(&fun, factory, CompileOptions::default()).unwrap();
        let input = value_from_spec(&mixed_spec(), factory).unwrap();
        let result = compiled.eval(&[input.as_ref()]).unwrap();
        let expected = TensorSpec::new("tensor(x{})")
            .add(address(&[("x", "a".into())]), 5.0)
            .add(address(&[("x", "b".into())]), 6.0);
        assert_eq!(expected, result.to_spec());
    }

    #[test]
    fn result_borrows_parameter() {
        let mut fun = TensorFunction::new(types(&["tensor(x{},y[2])"]));
        let a = fun.inject(0);
        let renamed = fun.rename(a, &["x"], &["z"]);
        fun.set_root(renamed);
        let compiled = InterpretedFunction::new(&fun, &SimpleValueBuilderFactory, CompileOptions::default()).unwrap();
        let input = value_from_spec(&mixed_spec(), &SimpleValueBuilderFactory).unwrap();
        let result = compiled.eval(&[input.as_ref()]).unwrap();
        // a stable rename shares the parameter's cells
        assert_eq!(input.cells(), result.cells());
        assert_eq!("tensor(y[2],z{})", result.value_type().to_spec());
    }
}
