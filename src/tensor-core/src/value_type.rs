// Copyright 2026 The Simlin Authors. All rights reserved.
// Use of this source code is governed by the Apache License,
// Version 2.0, that can be found in the LICENSE file.

//! Tensor shapes and the type algebra used to infer result types.
//!
//! Type errors are values: every operation on an error type, and every
//! operation whose inputs do not fit together, produces `ValueType::error()`.

use std::fmt;

use crate::cell_type::CellType;

#[derive(Clone, Debug, PartialEq, Eq, Hash)]
pub struct Dimension {
    pub name: String,
    /// 0 for mapped dimensions, the number of elements otherwise
    pub size: u32,
}

impl Dimension {
    pub fn mapped(name: &str) -> Self {
        Dimension {
            name: name.to_owned(),
            size: 0,
        }
    }

    pub fn indexed(name: &str, size: u32) -> Self {
        debug_assert!(size > 0);
        Dimension {
            name: name.to_owned(),
            size,
        }
    }

    pub fn is_mapped(&self) -> bool {
        self.size == 0
    }

    pub fn is_indexed(&self) -> bool {
        self.size > 0
    }

    pub fn is_trivial(&self) -> bool {
        self.size == 1
    }
}

#[derive(Clone, Debug, PartialEq, Eq, Hash)]
pub struct ValueType {
    error: bool,
    cell_type: CellType,
    dimensions: Vec<Dimension>,
}

/// Expected number of nonzero entries for an indexed dimension, given as
/// `name[N]_K` in a type spec. Not part of the type identity.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct DensityHint {
    pub dimension: String,
    pub nonzero: u32,
}

impl ValueType {
    pub fn error() -> Self {
        ValueType {
            error: true,
            cell_type: CellType::Double,
            dimensions: vec![],
        }
    }

    pub fn double() -> Self {
        ValueType {
            error: false,
            cell_type: CellType::Double,
            dimensions: vec![],
        }
    }

    /// Build a type, sorting dimensions by name. Duplicate names and
    /// non-double scalars yield the error type.
    pub fn make_type(cell_type: CellType, mut dimensions: Vec<Dimension>) -> Self {
        dimensions.sort_by(|a, b| a.name.cmp(&b.name));
        if dimensions.windows(2).any(|w| w[0].name == w[1].name) {
            return ValueType::error();
        }
        if dimensions.is_empty() && cell_type != CellType::Double {
            return ValueType::error();
        }
        ValueType {
            error: false,
            cell_type,
            dimensions,
        }
    }

    pub fn from_spec(spec: &str) -> Self {
        parse_spec_with_hints(spec).0
    }

    pub fn to_spec(&self) -> String {
        if self.error {
            return "error".to_owned();
        }
        if self.dimensions.is_empty() {
            return "double".to_owned();
        }
        let mut out = String::from("tensor");
        if self.cell_type != CellType::Double {
            out.push('<');
            out.push_str(self.cell_type.name());
            out.push('>');
        }
        out.push('(');
        for (i, dim) in self.dimensions.iter().enumerate() {
            if i > 0 {
                out.push(',');
            }
            out.push_str(&dim.name);
            if dim.is_mapped() {
                out.push_str("{}");
            } else {
                out.push_str(&format!("[{}]", dim.size));
            }
        }
        out.push(')');
        out
    }

    pub fn is_error(&self) -> bool {
        self.error
    }

    pub fn is_double(&self) -> bool {
        !self.error && self.dimensions.is_empty()
    }

    pub fn cell_type(&self) -> CellType {
        self.cell_type
    }

    pub fn dimensions(&self) -> &[Dimension] {
        &self.dimensions
    }

    pub fn count_mapped_dimensions(&self) -> usize {
        self.dimensions.iter().filter(|d| d.is_mapped()).count()
    }

    pub fn count_indexed_dimensions(&self) -> usize {
        self.dimensions.iter().filter(|d| d.is_indexed()).count()
    }

    pub fn mapped_dimensions(&self) -> Vec<&Dimension> {
        self.dimensions.iter().filter(|d| d.is_mapped()).collect()
    }

    pub fn indexed_dimensions(&self) -> Vec<&Dimension> {
        self.dimensions.iter().filter(|d| d.is_indexed()).collect()
    }

    pub fn nontrivial_indexed_dimensions(&self) -> Vec<&Dimension> {
        self.dimensions
            .iter()
            .filter(|d| d.is_indexed() && !d.is_trivial())
            .collect()
    }

    pub fn dense_subspace_size(&self) -> usize {
        self.dimensions
            .iter()
            .filter(|d| d.is_indexed())
            .map(|d| d.size as usize)
            .product()
    }

    pub fn dimension_index(&self, name: &str) -> Option<usize> {
        self.dimensions.iter().position(|d| d.name == name)
    }

    pub fn dimension_names(&self) -> Vec<&str> {
        self.dimensions.iter().map(|d| d.name.as_str()).collect()
    }

    pub fn is_dense(&self) -> bool {
        !self.error && self.count_mapped_dimensions() == 0
    }

    pub fn is_sparse(&self) -> bool {
        !self.error
            && !self.dimensions.is_empty()
            && self.dimensions.iter().all(|d| d.is_mapped())
    }

    pub fn is_mixed(&self) -> bool {
        self.count_mapped_dimensions() > 0 && self.count_indexed_dimensions() > 0
    }

    /// Type with only the mapped dimensions, as produced by reducing away
    /// every indexed dimension.
    pub fn mapped_type(&self) -> ValueType {
        if self.error {
            return ValueType::error();
        }
        let dims: Vec<Dimension> = self
            .dimensions
            .iter()
            .filter(|d| d.is_mapped())
            .cloned()
            .collect();
        if dims.is_empty() {
            return ValueType::double();
        }
        ValueType::make_type(self.cell_type.decay(), dims)
    }

    /// Type of one dense subspace, keeping the cell type.
    pub fn dense_subspace_type(&self) -> ValueType {
        if self.error {
            return ValueType::error();
        }
        let dims: Vec<Dimension> = self
            .dimensions
            .iter()
            .filter(|d| d.is_indexed())
            .cloned()
            .collect();
        if dims.is_empty() {
            return ValueType::double();
        }
        ValueType::make_type(self.cell_type, dims)
    }

    /// Result type of applying a scalar function to every cell.
    pub fn map(&self) -> ValueType {
        if self.error {
            return ValueType::error();
        }
        self.with_cell_type(self.cell_type.decay())
    }

    pub fn cell_cast(&self, cell_type: CellType) -> ValueType {
        if self.error {
            return ValueType::error();
        }
        ValueType::make_type(cell_type, self.dimensions.clone())
    }

    /// Remove the named dimensions; an empty list removes all of them.
    pub fn reduce(&self, dims: &[&str]) -> ValueType {
        if self.error {
            return ValueType::error();
        }
        if dims.is_empty() {
            return ValueType::double();
        }
        if dims.iter().any(|name| self.dimension_index(name).is_none()) {
            return ValueType::error();
        }
        let kept: Vec<Dimension> = self
            .dimensions
            .iter()
            .filter(|d| !dims.contains(&d.name.as_str()))
            .cloned()
            .collect();
        if kept.is_empty() {
            return ValueType::double();
        }
        ValueType::make_type(self.cell_type.decay(), kept)
    }

    pub fn rename(&self, from: &[&str], to: &[&str]) -> ValueType {
        if self.error || from.is_empty() || from.len() != to.len() {
            return ValueType::error();
        }
        for (i, name) in from.iter().enumerate() {
            if from[..i].contains(name) || self.dimension_index(name).is_none() {
                return ValueType::error();
            }
        }
        let dims = self
            .dimensions
            .iter()
            .map(|d| match from.iter().position(|name| *name == d.name) {
                Some(i) => Dimension {
                    name: to[i].to_owned(),
                    size: d.size,
                },
                None => d.clone(),
            })
            .collect();
        ValueType::make_type(self.cell_type, dims)
    }

    pub fn join(lhs: &ValueType, rhs: &ValueType) -> ValueType {
        if lhs.error || rhs.error {
            return ValueType::error();
        }
        let Some(dims) = join_dimensions(&lhs.dimensions, &rhs.dimensions) else {
            return ValueType::error();
        };
        if dims.is_empty() {
            return ValueType::double();
        }
        ValueType::make_type(unify_cell_types(lhs, rhs).decay(), dims)
    }

    /// Merge requires identical dimensions; overlapping cells are combined.
    pub fn merge(lhs: &ValueType, rhs: &ValueType) -> ValueType {
        if lhs.error || rhs.error || lhs.dimensions != rhs.dimensions {
            return ValueType::error();
        }
        if lhs.dimensions.is_empty() {
            return ValueType::double();
        }
        ValueType::make_type(
            CellType::unify(lhs.cell_type, rhs.cell_type).decay(),
            lhs.dimensions.clone(),
        )
    }

    pub fn concat(lhs: &ValueType, rhs: &ValueType, dimension: &str) -> ValueType {
        if lhs.error || rhs.error {
            return ValueType::error();
        }
        let size_in = |ty: &ValueType| -> Option<u32> {
            match ty.dimension_index(dimension) {
                Some(i) if ty.dimensions[i].is_mapped() => None,
                Some(i) => Some(ty.dimensions[i].size),
                None => Some(1),
            }
        };
        let (Some(lhs_size), Some(rhs_size)) = (size_in(lhs), size_in(rhs)) else {
            return ValueType::error();
        };
        let strip = |ty: &ValueType| -> Vec<Dimension> {
            ty.dimensions
                .iter()
                .filter(|d| d.name != dimension)
                .cloned()
                .collect()
        };
        let Some(mut dims) = join_dimensions(&strip(lhs), &strip(rhs)) else {
            return ValueType::error();
        };
        dims.push(Dimension::indexed(dimension, lhs_size + rhs_size));
        ValueType::make_type(unify_cell_types(lhs, rhs), dims)
    }

    fn with_cell_type(&self, cell_type: CellType) -> ValueType {
        if self.dimensions.is_empty() {
            return ValueType::double();
        }
        ValueType::make_type(cell_type, self.dimensions.clone())
    }
}

impl fmt::Display for ValueType {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write!(f, "{}", self.to_spec())
    }
}

/// Scalars do not take part in cell type unification.
fn unify_cell_types(lhs: &ValueType, rhs: &ValueType) -> CellType {
    if lhs.dimensions.is_empty() {
        rhs.cell_type
    } else if rhs.dimensions.is_empty() {
        lhs.cell_type
    } else {
        CellType::unify(lhs.cell_type, rhs.cell_type)
    }
}

/// Union of two sorted dimension lists. Shared indexed dimensions keep the
/// smaller size; a dimension that is mapped on one side and indexed on the
/// other is a conflict.
fn join_dimensions(lhs: &[Dimension], rhs: &[Dimension]) -> Option<Vec<Dimension>> {
    let mut result = Vec::with_capacity(lhs.len() + rhs.len());
    let (mut i, mut j) = (0, 0);
    while i < lhs.len() || j < rhs.len() {
        if j == rhs.len() || (i < lhs.len() && lhs[i].name < rhs[j].name) {
            result.push(lhs[i].clone());
            i += 1;
        } else if i == lhs.len() || rhs[j].name < lhs[i].name {
            result.push(rhs[j].clone());
            j += 1;
        } else {
            let (a, b) = (&lhs[i], &rhs[j]);
            if a.is_mapped() != b.is_mapped() {
                return None;
            }
            result.push(Dimension {
                name: a.name.clone(),
                size: a.size.min(b.size),
            });
            i += 1;
            j += 1;
        }
    }
    Some(result)
}

// ============================================================================
// Type spec parsing
// ============================================================================

struct SpecParser<'a> {
    input: &'a [u8],
    pos: usize,
}

impl<'a> SpecParser<'a> {
    fn new(input: &'a str) -> Self {
        SpecParser {
            input: input.as_bytes(),
            pos: 0,
        }
    }

    fn skip_ws(&mut self) {
        while self.pos < self.input.len() && self.input[self.pos].is_ascii_whitespace() {
            self.pos += 1;
        }
    }

    fn peek(&mut self) -> Option<u8> {
        self.skip_ws();
        self.input.get(self.pos).copied()
    }

    fn eat(&mut self, c: u8) -> bool {
        if self.peek() == Some(c) {
            self.pos += 1;
            true
        } else {
            false
        }
    }

    fn ident(&mut self) -> Option<&'a str> {
        self.skip_ws();
        let start = self.pos;
        while self.pos < self.input.len() {
            let c = self.input[self.pos];
            let ok = c.is_ascii_alphabetic()
                || c == b'_'
                || (self.pos > start && c.is_ascii_digit());
            if !ok {
                break;
            }
            self.pos += 1;
        }
        if self.pos == start {
            return None;
        }
        std::str::from_utf8(&self.input[start..self.pos]).ok()
    }

    fn number(&mut self) -> Option<u32> {
        self.skip_ws();
        let start = self.pos;
        while self.pos < self.input.len() && self.input[self.pos].is_ascii_digit() {
            self.pos += 1;
        }
        std::str::from_utf8(&self.input[start..self.pos])
            .ok()?
            .parse()
            .ok()
    }

    fn at_end(&mut self) -> bool {
        self.skip_ws();
        self.pos == self.input.len()
    }

    fn dimension(&mut self, hints: &mut Vec<DensityHint>) -> Option<Dimension> {
        let name = self.ident()?;
        if self.eat(b'{') {
            if !self.eat(b'}') {
                return None;
            }
            return Some(Dimension::mapped(name));
        }
        if !self.eat(b'[') {
            return None;
        }
        let size = self.number()?;
        if size == 0 || !self.eat(b']') {
            return None;
        }
        // no whitespace is allowed between ']' and the hint suffix
        if self.input.get(self.pos) == Some(&b'_') {
            self.pos += 1;
            let nonzero = self.number()?;
            hints.push(DensityHint {
                dimension: name.to_owned(),
                nonzero,
            });
        }
        Some(Dimension::indexed(name, size))
    }

    fn value_type(&mut self, hints: &mut Vec<DensityHint>) -> Option<ValueType> {
        let keyword = self.ident()?;
        match keyword {
            "error" => return Some(ValueType::error()),
            "double" => return Some(ValueType::double()),
            "tensor" => {}
            _ => return None,
        }
        let mut cell_type = CellType::Double;
        if self.eat(b'<') {
            cell_type = CellType::from_name(self.ident()?)?;
            if !self.eat(b'>') {
                return None;
            }
        }
        if !self.eat(b'(') {
            return None;
        }
        let mut dims = Vec::new();
        if !self.eat(b')') {
            loop {
                dims.push(self.dimension(hints)?);
                if self.eat(b')') {
                    break;
                }
                if !self.eat(b',') {
                    return None;
                }
            }
        }
        Some(ValueType::make_type(cell_type, dims))
    }
}

/// Parse a type spec, also returning any `name[N]_K` density hints.
/// Malformed input produces the error type and no hints.
pub fn parse_spec_with_hints(spec: &str) -> (ValueType, Vec<DensityHint>) {
    let mut parser = SpecParser::new(spec);
    let mut hints = Vec::new();
    let parsed = parser.value_type(&mut hints);
    let at_end = parser.at_end();
    match parsed {
        Some(ty) if at_end && !ty.is_error() => (ty, hints),
        _ => (ValueType::error(), vec![]),
    }
}
