// Copyright 2026 The Simlin Authors. All rights reserved.
// Use of this source code is governed by the Apache License,
// Version 2.0, that can be found in the LICENSE file.

//! Cell types and the scalar trait the engine is generic over.
//!
//! Every cell type is exactly representable as `f64`, so generic code reads
//! cells as `f64`, computes in double precision, and narrows once when the
//! result is written into a builder of the result cell type.

use std::fmt;

use half::bf16;
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CellType {
    Double,
    Float,
    #[serde(rename = "bfloat16")]
    BFloat16,
    Int8,
}

pub const ALL_CELL_TYPES: [CellType; 4] = [
    CellType::Double,
    CellType::Float,
    CellType::BFloat16,
    CellType::Int8,
];

impl CellType {
    /// Identifier used by the binary format.
    pub fn id(self) -> u8 {
        match self {
            CellType::Double => 0,
            CellType::Float => 1,
            CellType::BFloat16 => 2,
            CellType::Int8 => 3,
        }
    }

    pub fn from_id(id: u8) -> Option<CellType> {
        match id {
            0 => Some(CellType::Double),
            1 => Some(CellType::Float),
            2 => Some(CellType::BFloat16),
            3 => Some(CellType::Int8),
            _ => None,
        }
    }

    pub fn name(self) -> &'static str {
        match self {
            CellType::Double => "double",
            CellType::Float => "float",
            CellType::BFloat16 => "bfloat16",
            CellType::Int8 => "int8",
        }
    }

    pub fn from_name(name: &str) -> Option<CellType> {
        match name {
            "double" => Some(CellType::Double),
            "float" => Some(CellType::Float),
            "bfloat16" => Some(CellType::BFloat16),
            "int8" => Some(CellType::Int8),
            _ => None,
        }
    }

    /// Bytes used by one cell in memory and on the wire.
    pub fn mem_size(self) -> usize {
        match self {
            CellType::Double => 8,
            CellType::Float => 4,
            CellType::BFloat16 => 2,
            CellType::Int8 => 1,
        }
    }

    /// Common cell type of two operands before any arithmetic decay.
    pub fn unify(a: CellType, b: CellType) -> CellType {
        if a == b {
            a
        } else if a == CellType::Double || b == CellType::Double {
            CellType::Double
        } else {
            CellType::Float
        }
    }

    /// Cell type of an arithmetic result; reduced precision types are
    /// widened to float.
    pub fn decay(self) -> CellType {
        match self {
            CellType::BFloat16 | CellType::Int8 => CellType::Float,
            other => other,
        }
    }

    /// Round `value` to the precision of this cell type.
    pub fn cast(self, value: f64) -> f64 {
        match self {
            CellType::Double => value,
            CellType::Float => f32::from_f64(value).to_f64(),
            CellType::BFloat16 => bf16::from_f64(value).to_f64(),
            CellType::Int8 => <i8 as CellValue>::from_f64(value).to_f64(),
        }
    }
}

impl fmt::Display for CellType {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write!(f, "{}", self.name())
    }
}

/// A scalar type usable as tensor cell storage.
pub trait CellValue:
    Copy + Clone + PartialEq + Default + fmt::Debug + Send + Sync + 'static
{
    const CELL_TYPE: CellType;

    /// Narrowing conversion; `i8` saturates and truncates toward zero.
    fn from_f64(v: f64) -> Self;

    fn to_f64(self) -> f64;

    /// Append the big-endian encoding of this cell.
    fn write_be(self, out: &mut Vec<u8>);

    /// Decode a cell from exactly `CELL_TYPE.mem_size()` big-endian bytes.
    fn read_be(bytes: &[u8]) -> Self;
}

impl CellValue for f64 {
    const CELL_TYPE: CellType = CellType::Double;

    #[inline(always)]
    fn from_f64(v: f64) -> Self {
        v
    }
    #[inline(always)]
    fn to_f64(self) -> f64 {
        self
    }
    fn write_be(self, out: &mut Vec<u8>) {
        out.extend_from_slice(&self.to_be_bytes());
    }
    fn read_be(bytes: &[u8]) -> Self {
        let mut buf = [0u8; 8];
        buf.copy_from_slice(bytes);
        f64::from_be_bytes(buf)
    }
}

impl CellValue for f32 {
    const CELL_TYPE: CellType = CellType::Float;

    #[inline(always)]
    fn from_f64(v: f64) -> Self {
        v as f32
    }
    #[inline(always)]
    fn to_f64(self) -> f64 {
        self as f64
    }
    fn write_be(self, out: &mut Vec<u8>) {
        out.extend_from_slice(&self.to_be_bytes());
    }
    fn read_be(bytes: &[u8]) -> Self {
        let mut buf = [0u8; 4];
        buf.copy_from_slice(bytes);
        f32::from_be_bytes(buf)
    }
}

impl CellValue for bf16 {
    const CELL_TYPE: CellType = CellType::BFloat16;

    #[inline(always)]
    fn from_f64(v: f64) -> Self {
        bf16::from_f64(v)
    }
    #[inline(always)]
    fn to_f64(self) -> f64 {
        bf16::to_f64(self)
    }
    fn write_be(self, out: &mut Vec<u8>) {
        out.extend_from_slice(&self.to_bits().to_be_bytes());
    }
    fn read_be(bytes: &[u8]) -> Self {
        bf16::from_bits(u16::from_be_bytes([bytes[0], bytes[1]]))
    }
}

impl CellValue for i8 {
    const CELL_TYPE: CellType = CellType::Int8;

    #[inline(always)]
    fn from_f64(v: f64) -> Self {
        v as i8
    }
    #[inline(always)]
    fn to_f64(self) -> f64 {
        self as f64
    }
    fn write_be(self, out: &mut Vec<u8>) {
        out.push(self as u8);
    }
    fn read_be(bytes: &[u8]) -> Self {
        bytes[0] as i8
    }
}
