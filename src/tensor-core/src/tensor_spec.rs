// Copyright 2026 The Simlin Authors. All rights reserved.
// Use of this source code is governed by the Apache License,
// Version 2.0, that can be found in the LICENSE file.

//! Engine independent tensor representation used for verification.
//!
//! A `TensorSpec` is a type spec plus a map from full addresses (every
//! dimension bound to a label or an index) to cell values. Two values are
//! considered equal when their specs are equal, regardless of the storage
//! engine that produced them.

use std::collections::BTreeMap;
use std::fmt;

use float_cmp::approx_eq;
use serde::{Deserialize, Serialize};

use crate::value_type::ValueType;

#[derive(Clone, Debug, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(untagged)]
pub enum Label {
    Index(u32),
    Name(String),
}

impl Label {
    pub fn is_mapped(&self) -> bool {
        matches!(self, Label::Name(_))
    }
}

impl From<&str> for Label {
    fn from(name: &str) -> Self {
        Label::Name(name.to_owned())
    }
}

impl From<String> for Label {
    fn from(name: String) -> Self {
        Label::Name(name)
    }
}

impl From<u32> for Label {
    fn from(index: u32) -> Self {
        Label::Index(index)
    }
}

impl fmt::Display for Label {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        match self {
            Label::Index(index) => write!(f, "{index}"),
            Label::Name(name) => write!(f, "{name}"),
        }
    }
}

pub type Address = BTreeMap<String, Label>;

pub fn address(entries: &[(&str, Label)]) -> Address {
    entries
        .iter()
        .map(|(dim, label)| ((*dim).to_owned(), label.clone()))
        .collect()
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(into = "TensorSpecJson", from = "TensorSpecJson")]
pub struct TensorSpec {
    type_spec: String,
    cells: BTreeMap<Address, f64>,
}

#[derive(Clone, Serialize, Deserialize)]
struct CellJson {
    address: Address,
    value: f64,
}

#[derive(Clone, Serialize, Deserialize)]
struct TensorSpecJson {
    #[serde(rename = "type")]
    type_spec: String,
    #[serde(default)]
    cells: Vec<CellJson>,
}

impl From<TensorSpec> for TensorSpecJson {
    fn from(spec: TensorSpec) -> Self {
        TensorSpecJson {
            type_spec: spec.type_spec,
            cells: spec
                .cells
                .into_iter()
                .map(|(address, value)| CellJson { address, value })
                .collect(),
        }
    }
}

impl From<TensorSpecJson> for TensorSpec {
    fn from(json: TensorSpecJson) -> Self {
        let mut spec = TensorSpec::new(&json.type_spec);
        for cell in json.cells {
            spec.insert(cell.address, cell.value);
        }
        spec
    }
}

impl TensorSpec {
    pub fn new(type_spec: &str) -> Self {
        TensorSpec {
            type_spec: type_spec.to_owned(),
            cells: BTreeMap::new(),
        }
    }

    pub fn type_spec(&self) -> &str {
        &self.type_spec
    }

    pub fn value_type(&self) -> ValueType {
        ValueType::from_spec(&self.type_spec)
    }

    pub fn cells(&self) -> &BTreeMap<Address, f64> {
        &self.cells
    }

    /// Set a cell, overwriting any previous value for the address.
    pub fn insert(&mut self, address: Address, value: f64) {
        self.cells.insert(address, value);
    }

    /// Accumulate into a cell, treating a missing cell as 0.
    pub fn add_to(&mut self, address: Address, value: f64) {
        *self.cells.entry(address).or_insert(0.0) += value;
    }

    pub fn add(mut self, address: Address, value: f64) -> Self {
        self.insert(address, value);
        self
    }

    /// Canonical form: the type spec is rewritten in canonical order, values
    /// are rounded to the cell precision and dense subspaces are filled with
    /// explicit zeros.
    pub fn normalize(&self) -> TensorSpec {
        let ty = self.value_type();
        let mut result = TensorSpec::new(&ty.to_spec());
        if ty.is_error() {
            return result;
        }
        let cell_type = ty.cell_type();
        let mapped: Vec<&str> = ty
            .mapped_dimensions()
            .iter()
            .map(|d| d.name.as_str())
            .collect();
        let indexed: Vec<(&str, u32)> = ty
            .indexed_dimensions()
            .iter()
            .map(|d| (d.name.as_str(), d.size))
            .collect();

        let mut sparse_parts: Vec<Address> = Vec::new();
        if mapped.is_empty() {
            sparse_parts.push(Address::new());
        }
        for (addr, value) in self.cells.iter() {
            result.insert(addr.clone(), cell_type.cast(*value));
            let sparse: Address = addr
                .iter()
                .filter(|(dim, _)| mapped.contains(&dim.as_str()))
                .map(|(dim, label)| (dim.clone(), label.clone()))
                .collect();
            if !sparse_parts.contains(&sparse) {
                sparse_parts.push(sparse);
            }
        }

        let dense_size: usize = indexed.iter().map(|(_, size)| *size as usize).product();
        for sparse in sparse_parts.iter() {
            for flat in 0..dense_size {
                let mut addr = sparse.clone();
                let mut rest = flat;
                for (name, size) in indexed.iter().rev() {
                    let size = *size as usize;
                    addr.insert((*name).to_owned(), Label::Index((rest % size) as u32));
                    rest /= size;
                }
                result.cells.entry(addr).or_insert(0.0);
            }
        }
        result
    }

    /// Equality where cell values may differ by a few units in the last
    /// place; NaN compares equal to NaN.
    pub fn approx_eq(&self, other: &TensorSpec, ulps: i64) -> bool {
        if self.value_type() != other.value_type() || self.cells.len() != other.cells.len() {
            return false;
        }
        self.cells.iter().zip(other.cells.iter()).all(|((a_addr, a), (b_addr, b))| {
            a_addr == b_addr
                && (a == b || (a.is_nan() && b.is_nan()) || approx_eq!(f64, *a, *b, ulps = ulps))
        })
    }

    pub fn to_json(&self) -> String {
        // serializing string keyed maps and finite floats cannot fail
        serde_json::to_string(self).unwrap_or_default()
    }

    pub fn from_json(json: &str) -> serde_json::Result<TensorSpec> {
        serde_json::from_str(json)
    }
}

impl fmt::Display for TensorSpec {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        writeln!(f, "spec({}) {{", self.type_spec)?;
        for (addr, value) in self.cells.iter() {
            let labels: Vec<String> = addr.iter().map(|(d, l)| format!("{d}:{l}")).collect();
            writeln!(f, "  {{{}}}: {}", labels.join(","), value)?;
        }
        write!(f, "}}")
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn json_shape() {
        let spec = TensorSpec::new("tensor(x{},y[2])")
            .add(address(&[("x", "a".into()), ("y", Label::Index(1))]), 5.0)
            .add(address(&[("x", "a".into()), ("y", Label::Index(0))]), 1.0);
        let json = spec.to_json();
        assert_eq!(
            r#"{"type":"tensor(x{},y[2])","cells":[{"address":{"x":"a","y":0},"value":1.0},{"address":{"x":"a","y":1},"value":5.0}]}"#,
            json
        );
        assert_eq!(spec, TensorSpec::from_json(&json).unwrap());
    }

    #[test]
    fn json_without_cells() {
        let spec = TensorSpec::from_json(r#"{"type":"tensor(x{})"}"#).unwrap();
        assert_eq!("tensor(x{})", spec.type_spec());
        assert!(spec.cells().is_empty());
    }

    #[test]
    fn normalize_fills_dense_gaps_and_rounds() {
        let spec = TensorSpec::new("tensor<int8>(y[2],x{})")
            .add(address(&[("x", "a".into()), ("y", Label::Index(1))]), 3.7)
            .add(address(&[("x", "b".into()), ("y", Label::Index(0))]), -200.0);
        let expected = TensorSpec::new("tensor<int8>(x{},y[2])")
            .add(address(&[("x", "a".into()), ("y", Label::Index(0))]), 0.0)
            .add(address(&[("x", "a".into()), ("y", Label::Index(1))]), 3.0)
            .add(address(&[("x", "b".into()), ("y", Label::Index(0))]), -128.0)
            .add(address(&[("x", "b".into()), ("y", Label::Index(1))]), 0.0);
        assert_eq!(expected, spec.normalize());
    }

    #[test]
    fn normalize_dense_without_cells() {
        let expected = TensorSpec::new("tensor(x[2])")
            .add(address(&[("x", Label::Index(0))]), 0.0)
            .add(address(&[("x", Label::Index(1))]), 0.0);
        assert_eq!(expected, TensorSpec::new("tensor(x[2])").normalize());
        assert_eq!(
            TensorSpec::new("double").add(Address::new(), 0.0),
            TensorSpec::new("double").normalize()
        );
        assert_eq!(
            TensorSpec::new("tensor(x{})"),
            TensorSpec::new("tensor(x{})").normalize()
        );
    }

    #[test]
    fn approx_equality() {
        let a = TensorSpec::new("tensor(x[1])").add(address(&[("x", Label::Index(0))]), 0.1 + 0.2);
        let b = TensorSpec::new("tensor(x[1])").add(address(&[("x", Label::Index(0))]), 0.3);
        assert_ne!(a, b);
        assert!(a.approx_eq(&b, 4));
        let c = TensorSpec::new("tensor(x[1])").add(address(&[("x", Label::Index(0))]), f64::NAN);
        assert!(c.approx_eq(&c.clone(), 0));
        assert!(!a.approx_eq(&c, 4));
    }
}
