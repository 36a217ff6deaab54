// Copyright 2026 The Simlin Authors. All rights reserved.
// Use of this source code is governed by the Apache License,
// Version 2.0, that can be found in the LICENSE file.

//! Cross-engine tests: values encoded by one storage engine decode to the
//! same content with every other engine, and every engine's index views
//! enumerate partial address matches the same way. Malformed input is
//! rejected with the same error code by every engine.

use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};

use tensor_core::cell_type::ALL_CELL_TYPES;
use tensor_core::common::ErrorCode;
use tensor_core::tensor_spec::{Address, Label, TensorSpec};
use tensor_core::value_type::ValueType;
use tensor_eval::value::create_value_builder;
use tensor_eval::{
    ALL_FACTORIES, ValueBuilderFactory, copy_value, decode_value, encode_to_vec, spec_from_value,
    value_from_spec,
};

const LAYOUTS: [&str; 6] = [
    "tensor(x[3])",
    "tensor(x[2],y[1],z[2])",
    "tensor(x{})",
    "tensor(x{},y{})",
    "tensor(x{},y[2])",
    "tensor(a{},b[1],c{},d[3])",
];

const LABELS: [&str; 3] = ["foo", "bar", "b\u{e5}z"];

fn random_spec(type_spec: &str, rng: &mut StdRng) -> TensorSpec {
    let ty = ValueType::from_spec(type_spec);
    let mut spec = TensorSpec::new(type_spec);
    let mapped = ty.mapped_dimensions();
    let indexed = ty.indexed_dimensions();
    let num_subspaces = if mapped.is_empty() { 1 } else { rng.random_range(0..6) };
    for _ in 0..num_subspaces {
        let mut base = Address::new();
        for dim in mapped.iter() {
            base.insert(dim.name.clone(), Label::from(LABELS[rng.random_range(0..LABELS.len())]));
        }
        for offset in 0..ty.dense_subspace_size() {
            let mut addr = base.clone();
            let mut rest = offset;
            for dim in indexed.iter().rev() {
                addr.insert(dim.name.clone(), Label::Index(rest as u32 % dim.size));
                rest /= dim.size as usize;
            }
            spec.insert(addr, rng.random_range(-8i32..=8) as f64);
        }
    }
    spec
}

#[test]
fn decode_with_any_engine() {
    let mut rng = StdRng::seed_from_u64(0x5eed);
    for layout in LAYOUTS.iter() {
        for cell_type in ALL_CELL_TYPES.iter() {
            let type_spec = ValueType::from_spec(layout).cell_cast(*cell_type).to_spec();
            let spec = random_spec(&type_spec, &mut rng);
            for src in ALL_FACTORIES.iter() {
                let value = value_from_spec(&spec, *src).unwrap();
                let bytes = encode_to_vec(value.as_ref());
                for dst in ALL_FACTORIES.iter() {
                    let decoded = decode_value(&bytes, *dst).unwrap();
                    assert_eq!(
                        spec.normalize(),
                        spec_from_value(decoded.as_ref()).normalize(),
                        "{} from {} into {}",
                        type_spec,
                        src.name(),
                        dst.name()
                    );
                    assert_eq!(bytes, encode_to_vec(copy_value(decoded.as_ref(), *src).as_ref()));
                }
            }
        }
    }
}

#[test]
fn scalar_roundtrip() {
    let spec = TensorSpec::new("double").add(Address::new(), 2.5);
    for factory in ALL_FACTORIES.iter() {
        let value = value_from_spec(&spec, *factory).unwrap();
        let decoded = decode_value(&encode_to_vec(value.as_ref()), *factory).unwrap();
        assert_eq!(2.5, decoded.as_double());
        assert!(decoded.value_type().is_double());
    }
}

fn labeled_grid(factory: &dyn ValueBuilderFactory) -> Box<dyn tensor_eval::Value> {
    let ty = ValueType::from_spec("tensor(x{},y{})");
    let mut builder = create_value_builder::<f64>(factory, &ty, 6);
    builder.add_subspace(&["a", "0"])[0] = 1.0;
    builder.add_subspace(&["a", "1"])[0] = 5.0;
    builder.add_subspace(&["b", "0"])[0] = 2.0;
    builder.add_subspace(&["b", "1"])[0] = 6.0;
    builder.add_subspace(&["c", "0"])[0] = 3.0;
    builder.add_subspace(&["c", "1"])[0] = 7.0;
    builder.build()
}

#[test]
fn partial_view_enumerates_each_match_once() {
    for factory in ALL_FACTORIES.iter() {
        let value = labeled_grid(*factory);
        let index = value.index();
        assert_eq!(6, index.size());

        let mut view = index.create_view(&[1]);
        view.lookup(&["0"]);
        let mut label = [""];
        let mut found = vec![];
        while let Some(subspace) = view.next_result(&mut label) {
            found.push((label[0], value.cells().get(subspace)));
        }
        assert_eq!(
            vec![("a", 1.0), ("b", 2.0), ("c", 3.0)],
            found,
            "{}",
            factory.name()
        );

        view.lookup(&["2"]);
        assert_eq!(None, view.next_result(&mut label));

        let mut view = index.create_view(&[0, 1]);
        view.lookup(&["b", "1"]);
        let mut none: [&str; 0] = [];
        let subspace = view.next_result(&mut none).unwrap();
        assert_eq!(6.0, value.cells().get(subspace));
        assert_eq!(None, view.next_result(&mut none));
    }
}

#[test]
fn full_scan_visits_subspaces_in_insertion_order() {
    for factory in ALL_FACTORIES.iter() {
        let value = labeled_grid(*factory);
        let mut view = value.index().create_view(&[]);
        view.lookup(&[]);
        let mut addr = ["", ""];
        let mut order = vec![];
        while let Some(subspace) = view.next_result(&mut addr) {
            order.push((addr[0].to_owned(), addr[1].to_owned(), subspace));
        }
        assert_eq!(6, order.len(), "{}", factory.name());
        let mut subspaces: Vec<usize> = order.iter().map(|(_, _, s)| *s).collect();
        subspaces.sort_unstable();
        assert_eq!(vec![0, 1, 2, 3, 4, 5], subspaces);
        for (x, y, subspace) in order {
            let expected = match (x.as_str(), y.as_str()) {
                ("a", "0") => 1.0,
                ("a", "1") => 5.0,
                ("b", "0") => 2.0,
                ("b", "1") => 6.0,
                ("c", "0") => 3.0,
                _ => 7.0,
            };
            assert_eq!(expected, value.cells().get(subspace));
        }
    }
}

const SPARSE: u8 = 1;
const DENSE: u8 = 2;
const CELL_TYPE: u8 = 4;
const HUGE: [u8; 4] = [0xff, 0xff, 0xff, 0xff];

/// Byte strings that no engine may accept, with the code each must report.
fn malformed_inputs() -> Vec<(&'static str, Vec<u8>, ErrorCode)> {
    fn cat(parts: &[&[u8]]) -> Vec<u8> {
        parts.concat()
    }
    let one = 1.0f64.to_be_bytes();
    vec![
        ("empty", vec![], ErrorCode::TruncatedStream),
        ("unknown tag bit", vec![0x08], ErrorCode::BadFormatTag),
        ("no layout bits", vec![CELL_TYPE, 1], ErrorCode::BadFormatTag),
        ("unknown cell type", vec![DENSE | CELL_TYPE, 7, 0], ErrorCode::BadCellType),
        ("float scalar", vec![DENSE | CELL_TYPE, 1, 0, 0, 0, 0, 0], ErrorCode::BadCellType),
        ("zero size", vec![DENSE, 1, 1, b'x', 0], ErrorCode::BadDimension),
        ("repeated mapped name", vec![SPARSE, 2, 1, b'x', 1, b'x', 0], ErrorCode::BadDimension),
        (
            "oversize dense type",
            cat(&[&[DENSE, 2, 1, b'x'], &HUGE, &[1, b'y'], &HUGE]),
            ErrorCode::BadDimension,
        ),
        ("label is not UTF-8", vec![SPARSE, 1, 1, b'x', 1, 1, 0xc3], ErrorCode::BadLabel),
        (
            "repeated address",
            cat(&[&[SPARSE, 1, 1, b'x', 2, 1, b'a'], &one, &[1, b'a'], &one]),
            ErrorCode::BadLabel,
        ),
        ("repeated empty address", cat(&[&[SPARSE, 0, 2], &one, &one]), ErrorCode::BadLabel),
        ("truncated label", vec![SPARSE, 1, 1, b'x', 1, 3, b'a'], ErrorCode::TruncatedStream),
        ("truncated cells", cat(&[&[DENSE, 1, 1, b'x', 2], &one]), ErrorCode::TruncatedStream),
        ("large type without cells", cat(&[&[DENSE, 1, 1, b'x'], &HUGE]), ErrorCode::TruncatedStream),
        (
            "subspace count past the data",
            cat(&[&[SPARSE, 1, 1, b'x'], &HUGE, &[1, b'a'], &one]),
            ErrorCode::TruncatedStream,
        ),
        ("trailing bytes", cat(&[&[DENSE, 0], &one, &[0]]), ErrorCode::TrailingBytes),
    ]
}

#[test]
fn malformed_input_is_rejected_by_every_engine() {
    for (name, bytes, expected) in malformed_inputs() {
        for factory in ALL_FACTORIES.iter() {
            let code = decode_value(&bytes, *factory).err().map(|e| e.code);
            assert_eq!(Some(expected), code, "{name} with {}", factory.name());
        }
    }
}
