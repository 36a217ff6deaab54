// Copyright 2026 The Simlin Authors. All rights reserved.
// Use of this source code is governed by the Apache License,
// Version 2.0, that can be found in the LICENSE file.

use tensor_core::value_type::ValueType;

use crate::function::ScalarExpr;
use crate::nested_loop::SubscriptIterator;
use crate::value::{Cell, Value, ValueBuilderFactory, create_value_builder};
use crate::with_cell_type;

#[cfg_attr(feature = "debug-derive", derive(Debug))]
pub struct LambdaParam {
    pub res_type: ValueType,
    /// parameter numbers bound to the expression's peek bindings
    pub bindings: Vec<usize>,
    pub body: ScalarExpr,
}

fn lambda_typed<T: Cell>(
    param: &LambdaParam,
    bindings: &[&dyn Value],
    factory: &dyn ValueBuilderFactory,
) -> Box<dyn Value> {
    let sizes: Vec<usize> = param
        .res_type
        .dimensions()
        .iter()
        .map(|d| d.size as usize)
        .collect();
    let mut builder = create_value_builder::<T>(factory, &param.res_type, 1);
    let dst = builder.add_subspace(&[]);
    let mut iter = SubscriptIterator::new(&sizes);
    let mut subscript = vec![0; sizes.len()];
    let mut i = 0;
    while iter.next_into(&mut subscript) {
        dst[i] = T::from_f64(param.body.eval(&subscript, bindings));
        i += 1;
    }
    builder.build()
}

/// Build the dense result of a tensor lambda, evaluating the body once per
/// cell in row-major order.
pub fn perform_lambda(
    param: &LambdaParam,
    bindings: &[&dyn Value],
    factory: &dyn ValueBuilderFactory,
) -> Box<dyn Value> {
    with_cell_type!(param.res_type.cell_type(), T => lambda_typed::<T>(param, bindings, factory))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::function::JoinFn;
    use crate::simple_value::SimpleValueBuilderFactory;
    use crate::value::value_from_spec;
    use tensor_core::tensor_spec::{Label, TensorSpec, address};

    #[test]
    fn generated_matrix() {
        // tensor(x[2],y[3])(x*10+y)
        let param = LambdaParam {
            res_type: ValueType::from_spec("tensor(x[2],y[3])"),
            bindings: vec![],
            body: ScalarExpr::binary(
                JoinFn::Add,
                ScalarExpr::binary(JoinFn::Mul, ScalarExpr::DimIndex(0), ScalarExpr::Const(10.0)),
                ScalarExpr::DimIndex(1),
            ),
        };
        let result = perform_lambda(&param, &[], &SimpleValueBuilderFactory);
        assert_eq!(
            vec![0.0, 1.0, 2.0, 10.0, 11.0, 12.0],
            result.cells().iter().collect::<Vec<_>>()
        );
    }

    #[test]
    fn peek_out_of_bounds_reads_zero() {
        let factory = SimpleValueBuilderFactory;
        let spec = TensorSpec::new("tensor<int8>(x[2])")
            .add(address(&[("x", Label::Index(0))]), 7.0)
            .add(address(&[("x", Label::Index(1))]), -1.0);
        let input = value_from_spec(&spec, &factory).unwrap();
        // tensor<int8>(x[4])(input{x:x-1})
        let param = LambdaParam {
            res_type: ValueType::from_spec("tensor<int8>(x[4])"),
            bindings: vec![0],
            body: ScalarExpr::Peek {
                binding: 0,
                indexes: vec![ScalarExpr::binary(
                    JoinFn::Sub,
                    ScalarExpr::DimIndex(0),
                    ScalarExpr::Const(1.0),
                )],
            },
        };
        let result = perform_lambda(&param, &[input.as_ref()], &factory);
        assert_eq!(
            vec![0.0, 7.0, -1.0, 0.0],
            result.cells().iter().collect::<Vec<_>>()
        );
    }
}
