// Copyright 2026 The Simlin Authors. All rights reserved.
// Use of this source code is governed by the Apache License,
// Version 2.0, that can be found in the LICENSE file.

//! Self describing binary format for values.
//!
//! ```text
//! tag            u8   bit 0: mapped dims, bit 1: indexed dims (or scalar),
//!                     bit 2: explicit cell type
//! [cell type]    u8   present only with bit 2; omitted for double
//! [mapped]       n, n * name
//! [indexed]      n, n * (name, size)
//! [subspaces]    n    present only with bit 0
//! per subspace   labels for the mapped dims, then the dense cells
//! ```
//!
//! Integers are written in a compact form: one byte below 0x80, otherwise
//! four big-endian bytes with the high bit set. Strings are a compact length
//! followed by UTF-8 bytes. Cells are big-endian.

use rustc_hash::FxHashSet;
use smallvec::SmallVec;
use tracing::debug;

use tensor_core::cell_type::{CellType, CellValue};
use tensor_core::common::Result;
use tensor_core::decode_err;
use tensor_core::value_type::{Dimension, ValueType};

use crate::value::{
    Cell, Labels, TypedCells, Value, ValueBuilderFactory, create_value_builder,
    for_each_subspace,
};
use crate::with_cell_type;

const SPARSE_BIT: u8 = 0x1;
const DENSE_BIT: u8 = 0x2;
const CELL_TYPE_BIT: u8 = 0x4;

const MAX_COMPACT: u32 = 0x7fff_ffff;

fn write_compact(out: &mut Vec<u8>, value: usize) {
    debug_assert!(value <= MAX_COMPACT as usize);
    if value < 0x80 {
        out.push(value as u8);
    } else {
        out.extend_from_slice(&((value as u32) | 0x8000_0000).to_be_bytes());
    }
}

fn write_string(out: &mut Vec<u8>, s: &str) {
    write_compact(out, s.len());
    out.extend_from_slice(s.as_bytes());
}

fn write_cells(out: &mut Vec<u8>, cells: TypedCells<'_>) {
    match cells {
        TypedCells::Double(c) => c.iter().for_each(|v| v.write_be(out)),
        TypedCells::Float(c) => c.iter().for_each(|v| v.write_be(out)),
        TypedCells::BFloat16(c) => c.iter().for_each(|v| v.write_be(out)),
        TypedCells::Int8(c) => c.iter().for_each(|v| v.write_be(out)),
    }
}

/// Append the binary form of `value` to `out`.
pub fn encode_value(value: &dyn Value, out: &mut Vec<u8>) {
    let ty = value.value_type();
    let mapped = ty.mapped_dimensions();
    let indexed = ty.indexed_dimensions();
    let cell_type = ty.cell_type();

    let mut tag = 0;
    if !mapped.is_empty() {
        tag |= SPARSE_BIT;
    }
    if !indexed.is_empty() || mapped.is_empty() {
        tag |= DENSE_BIT;
    }
    if cell_type != CellType::Double {
        tag |= CELL_TYPE_BIT;
    }
    out.push(tag);
    if tag & CELL_TYPE_BIT != 0 {
        out.push(cell_type.id());
    }
    if tag & SPARSE_BIT != 0 {
        write_compact(out, mapped.len());
        for dim in mapped.iter() {
            write_string(out, &dim.name);
        }
    }
    if tag & DENSE_BIT != 0 {
        write_compact(out, indexed.len());
        for dim in indexed.iter() {
            write_string(out, &dim.name);
            write_compact(out, dim.size as usize);
        }
    }
    if tag & SPARSE_BIT != 0 {
        write_compact(out, value.index().size());
    }
    let cells = value.cells();
    let size = ty.dense_subspace_size();
    for_each_subspace(value, |addr, subspace| {
        for label in addr {
            write_string(out, label);
        }
        write_cells(out, cells.slice(subspace * size, size));
    });
}

pub fn encode_to_vec(value: &dyn Value) -> Vec<u8> {
    let mut out = Vec::new();
    encode_value(value, &mut out);
    out
}

struct Reader<'a> {
    data: &'a [u8],
    pos: usize,
}

impl<'a> Reader<'a> {
    fn remaining(&self) -> usize {
        self.data.len() - self.pos
    }

    fn take(&mut self, n: usize) -> Result<&'a [u8]> {
        if n > self.remaining() {
            return decode_err!(
                TruncatedStream,
                format!("wanted {} bytes at offset {}, {} left", n, self.pos, self.remaining())
            );
        }
        let bytes = &self.data[self.pos..self.pos + n];
        self.pos += n;
        Ok(bytes)
    }

    fn byte(&mut self) -> Result<u8> {
        Ok(self.take(1)?[0])
    }

    fn compact(&mut self) -> Result<usize> {
        let first = self.byte()?;
        if first & 0x80 == 0 {
            return Ok(first as usize);
        }
        let rest = self.take(3)?;
        let value = u32::from_be_bytes([first, rest[0], rest[1], rest[2]]) & MAX_COMPACT;
        Ok(value as usize)
    }

    fn string(&mut self) -> Result<&'a str> {
        let len = self.compact()?;
        let bytes = self.take(len)?;
        match std::str::from_utf8(bytes) {
            Ok(s) => Ok(s),
            Err(err) => decode_err!(BadLabel, format!("invalid UTF-8: {err}")),
        }
    }

    fn cells<T: Cell>(&mut self, dst: &mut [T]) -> Result<()> {
        let width = T::CELL_TYPE.mem_size();
        let bytes = self.take(dst.len() * width)?;
        for (cell, chunk) in dst.iter_mut().zip(bytes.chunks_exact(width)) {
            *cell = T::read_be(chunk);
        }
        Ok(())
    }
}

fn decode_type(reader: &mut Reader<'_>) -> Result<(u8, ValueType)> {
    let tag = reader.byte()?;
    if tag & !(SPARSE_BIT | DENSE_BIT | CELL_TYPE_BIT) != 0 || tag & (SPARSE_BIT | DENSE_BIT) == 0
    {
        return decode_err!(BadFormatTag, format!("tag {tag:#04x}"));
    }
    let cell_type = if tag & CELL_TYPE_BIT != 0 {
        let id = reader.byte()?;
        match CellType::from_id(id) {
            Some(ct) => ct,
            None => return decode_err!(BadCellType, format!("cell type id {id}")),
        }
    } else {
        CellType::Double
    };

    let mut dimensions = Vec::new();
    // bytes in one dense subspace, kept addressable
    let mut subspace_bytes = cell_type.mem_size();
    if tag & SPARSE_BIT != 0 {
        let n = reader.compact()?;
        for _ in 0..n {
            dimensions.push(Dimension::mapped(reader.string()?));
        }
    }
    if tag & DENSE_BIT != 0 {
        let n = reader.compact()?;
        for _ in 0..n {
            let name = reader.string()?;
            let size = reader.compact()?;
            if size == 0 {
                return decode_err!(BadDimension, format!("indexed dimension '{name}' of size 0"));
            }
            subspace_bytes = match subspace_bytes.checked_mul(size) {
                Some(bytes) => bytes,
                None => return decode_err!(BadDimension, format!("dense subspace too large at '{name}'")),
            };
            dimensions.push(Dimension::indexed(name, size as u32));
        }
    }
    if dimensions.is_empty() && cell_type != CellType::Double {
        return decode_err!(BadCellType, format!("scalar with cell type {cell_type}"));
    }
    let ty = ValueType::make_type(cell_type, dimensions);
    if ty.is_error() {
        return decode_err!(BadDimension, "duplicate dimension names".to_string());
    }
    Ok((tag, ty))
}

fn decode_cells<T: Cell>(
    reader: &mut Reader<'_>,
    tag: u8,
    ty: &ValueType,
    factory: &dyn ValueBuilderFactory,
) -> Result<Box<dyn Value>> {
    let num_mapped = ty.count_mapped_dimensions();
    // decode_type bounds the subspace byte count, so this cannot overflow
    let subspace_bytes = ty.dense_subspace_size() * T::CELL_TYPE.mem_size();
    let num_subspaces = if tag & SPARSE_BIT != 0 {
        reader.compact()?
    } else {
        1
    };
    // never trust the declared count for allocation
    let expected = num_subspaces.min(reader.remaining() / subspace_bytes);
    let mut builder = create_value_builder::<T>(factory, ty, expected);
    let mut seen: FxHashSet<SmallVec<[&str; 4]>> = FxHashSet::default();
    for _ in 0..num_subspaces {
        let mut addr: Labels = SmallVec::with_capacity(num_mapped);
        for _ in 0..num_mapped {
            addr.push(reader.string()?);
        }
        // a type without mapped dimensions has only the empty address
        if !seen.insert(addr.clone()) {
            return decode_err!(BadLabel, format!("duplicate address {addr:?}"));
        }
        if reader.remaining() < subspace_bytes {
            return decode_err!(
                TruncatedStream,
                format!("need {subspace_bytes} bytes of cells, {} left", reader.remaining())
            );
        }
        let dst = builder.add_subspace(&addr);
        reader.cells(dst)?;
    }
    Ok(builder.build())
}

fn decode(data: &[u8], factory: &dyn ValueBuilderFactory) -> Result<Box<dyn Value>> {
    let mut reader = Reader { data, pos: 0 };
    let (tag, ty) = decode_type(&mut reader)?;
    let value = with_cell_type!(ty.cell_type(), T => decode_cells::<T>(&mut reader, tag, &ty, factory))?;
    if reader.remaining() > 0 {
        return decode_err!(TrailingBytes, format!("{} bytes after value", reader.remaining()));
    }
    Ok(value)
}

/// Decode one value occupying all of `data`, building it with `factory`.
pub fn decode_value(data: &[u8], factory: &dyn ValueBuilderFactory) -> Result<Box<dyn Value>> {
    let result = decode(data, factory);
    if let Err(ref err) = result {
        debug!(code = %err.code, len = data.len(), "value decode failed");
    }
    result
}
