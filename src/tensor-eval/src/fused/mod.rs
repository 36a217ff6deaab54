// Copyright 2026 The Simlin Authors. All rights reserved.
// Use of this source code is governed by the Apache License,
// Version 2.0, that can be found in the LICENSE file.

//! Specialized instructions substituted by the optimizer. Each produces the
//! same cells as the generic instructions it replaces.

pub mod inplace_join;
pub mod mixed_l2;
pub mod replace_type;
pub mod sum_max_dot;
pub mod unpack_bits;
