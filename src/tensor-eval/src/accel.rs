// Copyright 2026 The Simlin Authors. All rights reserved.
// Use of this source code is governed by the Apache License,
// Version 2.0, that can be found in the LICENSE file.

//! Vector kernels used by fused instructions. Results are returned in
//! double precision. `SimdAccelerator` dispatches to the simsimd kernels
//! for the host CPU and drops back to the portable loops when a kernel
//! declines the input.

use simsimd::SpatialSimilarity;

pub trait Accelerator: Send + Sync {
    fn name(&self) -> &'static str;
    fn dot_product_f32(&self, a: &[f32], b: &[f32]) -> f64;
    fn dot_product_f64(&self, a: &[f64], b: &[f64]) -> f64;
    fn squared_euclidean_distance_f32(&self, a: &[f32], b: &[f32]) -> f64;
    fn squared_euclidean_distance_f64(&self, a: &[f64], b: &[f64]) -> f64;
}

/// Portable implementation, always available.
#[derive(Clone, Copy, Debug, Default)]
pub struct ScalarAccelerator;

pub static SCALAR_ACCELERATOR: ScalarAccelerator = ScalarAccelerator;

#[inline]
fn inner<T: Copy + Into<f64>>(a: &[T], b: &[T]) -> f64 {
    debug_assert_eq!(a.len(), b.len());
    a.iter().zip(b).map(|(x, y)| (*x).into() * (*y).into()).sum()
}

#[inline]
fn sqeuclidean<T: Copy + Into<f64>>(a: &[T], b: &[T]) -> f64 {
    debug_assert_eq!(a.len(), b.len());
    a.iter()
        .zip(b)
        .map(|(x, y)| {
            let d = (*x).into() - (*y).into();
            d * d
        })
        .sum()
}

impl Accelerator for ScalarAccelerator {
    fn name(&self) -> &'static str {
        "scalar"
    }
    fn dot_product_f32(&self, a: &[f32], b: &[f32]) -> f64 {
        inner(a, b)
    }
    fn dot_product_f64(&self, a: &[f64], b: &[f64]) -> f64 {
        inner(a, b)
    }
    fn squared_euclidean_distance_f32(&self, a: &[f32], b: &[f32]) -> f64 {
        sqeuclidean(a, b)
    }
    fn squared_euclidean_distance_f64(&self, a: &[f64], b: &[f64]) -> f64 {
        sqeuclidean(a, b)
    }
}

/// Kernels from simsimd, selected at runtime for the host CPU.
#[derive(Clone, Copy, Debug, Default)]
pub struct SimdAccelerator;

pub static SIMD_ACCELERATOR: SimdAccelerator = SimdAccelerator;

impl Accelerator for SimdAccelerator {
    fn name(&self) -> &'static str {
        "simd"
    }
    fn dot_product_f32(&self, a: &[f32], b: &[f32]) -> f64 {
        match f32::dot(a, b) {
            Some(result) => f64::from(result),
            None => inner(a, b),
        }
    }
    fn dot_product_f64(&self, a: &[f64], b: &[f64]) -> f64 {
        match f64::dot(a, b) {
            Some(result) => f64::from(result),
            None => inner(a, b),
        }
    }
    fn squared_euclidean_distance_f32(&self, a: &[f32], b: &[f32]) -> f64 {
        match f32::sqeuclidean(a, b) {
            Some(result) => f64::from(result),
            None => sqeuclidean(a, b),
        }
    }
    fn squared_euclidean_distance_f64(&self, a: &[f64], b: &[f64]) -> f64 {
        match f64::sqeuclidean(a, b) {
            Some(result) => f64::from(result),
            None => sqeuclidean(a, b),
        }
    }
}
