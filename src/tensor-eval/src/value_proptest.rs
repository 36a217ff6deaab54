// Copyright 2026 The Simlin Authors. All rights reserved.
// Use of this source code is governed by the Apache License,
// Version 2.0, that can be found in the LICENSE file.

//! Property-based tests for sparse address interning, storage engines and
//! stable renames.

use std::collections::HashSet;

use proptest::prelude::*;

use tensor_core::value_type::ValueType;

use crate::ALL_FACTORIES;
use crate::fast_sparse_map::{FastSparseMap, NPOS};
use crate::function::TensorFunction;
use crate::interpreter::{CompileOptions, InterpretedFunction};
use crate::optimizer::is_stable_rename;
use crate::test_common::{LAYOUTS, gen_spec};
use crate::value::{copy_value, spec_from_value, value_from_spec};

fn address_strategy() -> impl Strategy<Value = (String, String)> {
    ("[a-z]{1,4}", "[a-z0-9]{0,3}")
}

fn dim_names() -> Vec<&'static str> {
    vec!["a", "b", "c", "d"]
}

/// A shuffled assignment of `a..d` to four dimensions, two mapped and two
/// indexed of size 1, 2 or 3.
fn layout_strategy() -> impl Strategy<Value = String> {
    (
        Just(dim_names()).prop_shuffle(),
        prop::collection::vec(1u32..=3, 2),
    )
        .prop_map(|(names, sizes)| {
            format!(
                "tensor({}{{}},{}{{}},{}[{}],{}[{}])",
                names[0], names[1], names[2], sizes[0], names[3], sizes[1]
            )
        })
}

proptest! {
    #![proptest_config(ProptestConfig::with_cases(128))]

    #[test]
    fn sparse_map_assigns_unique_indexes(
        addrs in prop::collection::hash_set(address_strategy(), 1..64),
        missing in address_strategy(),
    ) {
        let addrs: Vec<(String, String)> = addrs.into_iter().collect();
        let mut map = FastSparseMap::new(2, addrs.len());
        for (i, (x, y)) in addrs.iter().enumerate() {
            prop_assert_eq!(i, map.add_mapping(&[x.as_str(), y.as_str()]));
        }
        prop_assert_eq!(addrs.len(), map.size());

        let mut seen = HashSet::new();
        for (i, (x, y)) in addrs.iter().enumerate() {
            let idx = map.lookup(&[x.as_str(), y.as_str()]);
            prop_assert_eq!(i, idx);
            prop_assert!(seen.insert(idx));
            prop_assert_eq!(&[x.clone(), y.clone()][..], map.make_addr(idx));
        }
        if !addrs.contains(&missing) {
            prop_assert_eq!(NPOS, map.lookup(&[missing.0.as_str(), missing.1.as_str()]));
        }
    }

    #[test]
    fn engines_agree_on_content(layout in 0..LAYOUTS.len(), seed in any::<u64>()) {
        let spec = gen_spec(LAYOUTS[layout], seed);
        let reference = value_from_spec(&spec, ALL_FACTORIES[0]).unwrap();
        for factory in ALL_FACTORIES.iter() {
            let value = copy_value(reference.as_ref(), *factory);
            prop_assert_eq!(&spec.normalize(), &spec_from_value(value.as_ref()).normalize());
        }
    }

    #[test]
    fn renames_match_generic_path(layout in layout_strategy(), target in Just(dim_names()).prop_shuffle(), seed in any::<u64>()) {
        let from_type = ValueType::from_spec(&layout);
        let mut fun = TensorFunction::new(vec![from_type.clone()]);
        let p = fun.inject(0);
        let names = dim_names();
        let renamed = fun.rename(p, &names, &target);
        fun.set_root(renamed);
        let to_type = fun.root_type();
        prop_assert!(!to_type.is_error());

        let generic = InterpretedFunction::new(&fun, ALL_FACTORIES[1], CompileOptions::generic()).unwrap();
        let optimized = InterpretedFunction::new(&fun, ALL_FACTORIES[1], CompileOptions::default()).unwrap();
        let input = value_from_spec(&gen_spec(&layout, seed), ALL_FACTORIES[1]).unwrap();
        let expected = generic.eval(&[input.as_ref()]).unwrap().to_spec();
        prop_assert_eq!(&expected, &optimized.eval(&[input.as_ref()]).unwrap().to_spec());

        // stable renames never move dense cells
        if is_stable_rename(&from_type, &to_type, &names, &target) {
            let result = optimized.eval(&[input.as_ref()]).unwrap();
            prop_assert_eq!(input.cells(), result.cells());
        }
    }
}
