// Copyright 2026 The Simlin Authors. All rights reserved.
// Use of this source code is governed by the Apache License,
// Version 2.0, that can be found in the LICENSE file.

#![forbid(unsafe_code)]

pub mod cell_type;
pub mod common;
pub mod tensor_spec;
pub mod value_type;

pub use self::cell_type::{ALL_CELL_TYPES, CellType, CellValue};
pub use self::common::{Error, ErrorCode, ErrorKind, Result};
pub use self::tensor_spec::{Address, Label, TensorSpec, address};
pub use self::value_type::{DensityHint, Dimension, ValueType, parse_spec_with_hints};
