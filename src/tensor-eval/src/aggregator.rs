// Copyright 2026 The Simlin Authors. All rights reserved.
// Use of this source code is governed by the Apache License,
// Version 2.0, that can be found in the LICENSE file.

//! Streaming aggregation used by reduce.
//!
//! An aggregator is fed with `first` followed by any number of `next` calls
//! and read with `result`. A fresh aggregator that has seen no values
//! reports the empty result of its kind.

use std::fmt;

use ordered_float::OrderedFloat;

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum Aggr {
    Avg,
    Count,
    Prod,
    Sum,
    Max,
    Median,
    Min,
}

pub const ALL_AGGRS: [Aggr; 7] = [
    Aggr::Avg,
    Aggr::Count,
    Aggr::Prod,
    Aggr::Sum,
    Aggr::Max,
    Aggr::Median,
    Aggr::Min,
];

impl Aggr {
    pub fn name(self) -> &'static str {
        match self {
            Aggr::Avg => "avg",
            Aggr::Count => "count",
            Aggr::Prod => "prod",
            Aggr::Sum => "sum",
            Aggr::Max => "max",
            Aggr::Median => "median",
            Aggr::Min => "min",
        }
    }

    pub fn from_name(name: &str) -> Option<Aggr> {
        ALL_AGGRS.iter().copied().find(|aggr| aggr.name() == name)
    }

    /// Result of aggregating zero values.
    pub fn empty_result(self) -> f64 {
        match self {
            Aggr::Avg | Aggr::Count | Aggr::Sum => 0.0,
            Aggr::Prod => 1.0,
            Aggr::Max => f64::NEG_INFINITY,
            Aggr::Min => f64::INFINITY,
            Aggr::Median => f64::NAN,
        }
    }

    pub fn create(self) -> Box<dyn Aggregator> {
        match self {
            Aggr::Avg => Box::new(AvgAggregator { sum: 0.0, count: 0 }),
            Aggr::Count => Box::new(CountAggregator { count: 0 }),
            Aggr::Prod => Box::new(ProdAggregator { prod: 1.0 }),
            Aggr::Sum => Box::new(SumAggregator { sum: 0.0 }),
            Aggr::Max => Box::new(MaxAggregator {
                max: f64::NEG_INFINITY,
            }),
            Aggr::Median => Box::new(MedianAggregator { values: Vec::new() }),
            Aggr::Min => Box::new(MinAggregator { min: f64::INFINITY }),
        }
    }
}

impl fmt::Display for Aggr {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write!(f, "{}", self.name())
    }
}

pub trait Aggregator: Send {
    /// Restart with `value` as the only value seen.
    fn first(&mut self, value: f64);
    fn next(&mut self, value: f64);
    fn result(&self) -> f64;
}

struct AvgAggregator {
    sum: f64,
    count: usize,
}

impl Aggregator for AvgAggregator {
    fn first(&mut self, value: f64) {
        self.sum = value;
        self.count = 1;
    }
    fn next(&mut self, value: f64) {
        self.sum += value;
        self.count += 1;
    }
    fn result(&self) -> f64 {
        if self.count == 0 {
            0.0
        } else {
            self.sum / self.count as f64
        }
    }
}

struct CountAggregator {
    count: usize,
}

impl Aggregator for CountAggregator {
    fn first(&mut self, _value: f64) {
        self.count = 1;
    }
    fn next(&mut self, _value: f64) {
        self.count += 1;
    }
    fn result(&self) -> f64 {
        self.count as f64
    }
}

struct ProdAggregator {
    prod: f64,
}

impl Aggregator for ProdAggregator {
    fn first(&mut self, value: f64) {
        self.prod = value;
    }
    fn next(&mut self, value: f64) {
        self.prod *= value;
    }
    fn result(&self) -> f64 {
        self.prod
    }
}

struct SumAggregator {
    sum: f64,
}

impl Aggregator for SumAggregator {
    fn first(&mut self, value: f64) {
        self.sum = value;
    }
    fn next(&mut self, value: f64) {
        self.sum += value;
    }
    fn result(&self) -> f64 {
        self.sum
    }
}

struct MaxAggregator {
    max: f64,
}

impl Aggregator for MaxAggregator {
    fn first(&mut self, value: f64) {
        self.max = value;
    }
    fn next(&mut self, value: f64) {
        self.max = self.max.max(value);
    }
    fn result(&self) -> f64 {
        self.max
    }
}

struct MinAggregator {
    min: f64,
}

impl Aggregator for MinAggregator {
    fn first(&mut self, value: f64) {
        self.min = value;
    }
    fn next(&mut self, value: f64) {
        self.min = self.min.min(value);
    }
    fn result(&self) -> f64 {
        self.min
    }
}

struct MedianAggregator {
    values: Vec<f64>,
}

impl Aggregator for MedianAggregator {
    fn first(&mut self, value: f64) {
        self.values.clear();
        self.values.push(value);
    }
    fn next(&mut self, value: f64) {
        self.values.push(value);
    }
    fn result(&self) -> f64 {
        let n = self.values.len();
        if n == 0 || self.values.iter().any(|v| v.is_nan()) {
            return f64::NAN;
        }
        let mut sorted: Vec<OrderedFloat<f64>> =
            self.values.iter().map(|v| OrderedFloat(*v)).collect();
        sorted.sort_unstable();
        if n % 2 == 1 {
            sorted[n / 2].0
        } else {
            (sorted[n / 2 - 1].0 + sorted[n / 2].0) / 2.0
        }
    }
}
