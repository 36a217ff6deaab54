// Copyright 2026 The Simlin Authors. All rights reserved.
// Use of this source code is governed by the Apache License,
// Version 2.0, that can be found in the LICENSE file.

//! Interning of sparse addresses into dense subspace indexes.
//!
//! Every label is hashed with XXH3-64 and the hashes of an address are folded
//! left to right (`h = 31 * h + label_hash`), so permutations of the same
//! labels produce different keys. Distinct addresses whose folded hashes
//! collide are not detected; the map stores only the 64-bit key.

use rustc_hash::FxHashMap;
use xxhash_rust::xxh3::xxh3_64;

/// Returned by lookups that find no subspace.
pub const NPOS: usize = usize::MAX;

#[inline]
pub fn hash_label(label: &str) -> u64 {
    xxh3_64(label.as_bytes())
}

#[inline]
pub fn combine_hash(hash: u64, label_hash: u64) -> u64 {
    hash.wrapping_mul(31).wrapping_add(label_hash)
}

pub fn hash_labels<'s, I>(labels: I) -> u64
where
    I: IntoIterator<Item = &'s str>,
{
    labels
        .into_iter()
        .fold(0, |hash, label| combine_hash(hash, hash_label(label)))
}

#[derive(Clone, Debug)]
pub struct FastSparseMap {
    num_dims: usize,
    labels: Vec<String>,
    label_hashes: Vec<u64>,
    map: FxHashMap<u64, u32>,
}

impl FastSparseMap {
    pub fn new(num_dims: usize, expected_subspaces: usize) -> Self {
        FastSparseMap {
            num_dims,
            labels: Vec::with_capacity(num_dims * expected_subspaces),
            label_hashes: Vec::with_capacity(num_dims * expected_subspaces),
            map: FxHashMap::with_capacity_and_hasher(expected_subspaces, Default::default()),
        }
    }

    pub fn num_dims(&self) -> usize {
        self.num_dims
    }

    pub fn size(&self) -> usize {
        self.map.len()
    }

    /// Assign the next subspace index to `addr`. The address must not already
    /// be present.
    pub fn add_mapping(&mut self, addr: &[&str]) -> usize {
        let hash = hash_labels(addr.iter().copied());
        self.add_mapping_with_hash(addr, hash)
    }

    pub fn add_mapping_with_hash(&mut self, addr: &[&str], hash: u64) -> usize {
        debug_assert_eq!(self.num_dims, addr.len());
        let idx = self.map.len();
        for label in addr {
            self.labels.push((*label).to_owned());
            self.label_hashes.push(hash_label(label));
        }
        let prev = self.map.insert(hash, idx as u32);
        debug_assert!(prev.is_none(), "duplicate sparse address");
        idx
    }

    pub fn lookup(&self, addr: &[&str]) -> usize {
        self.lookup_hash(hash_labels(addr.iter().copied()))
    }

    pub fn lookup_hash(&self, hash: u64) -> usize {
        match self.map.get(&hash) {
            Some(idx) => *idx as usize,
            None => NPOS,
        }
    }

    /// The labels stored for subspace `idx`, in dimension order.
    pub fn make_addr(&self, idx: usize) -> &[String] {
        &self.labels[idx * self.num_dims..(idx + 1) * self.num_dims]
    }

    pub fn addr_hashes(&self, idx: usize) -> &[u64] {
        &self.label_hashes[idx * self.num_dims..(idx + 1) * self.num_dims]
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn indexes_follow_insertion_order() {
        let mut map = FastSparseMap::new(2, 4);
        assert_eq!(0, map.add_mapping(&["a", "x"]));
        assert_eq!(1, map.add_mapping(&["b", "x"]));
        assert_eq!(2, map.add_mapping(&["x", "a"]));
        assert_eq!(3, map.size());
        assert_eq!(1, map.lookup(&["b", "x"]));
        assert_eq!(2, map.lookup(&["x", "a"]));
        assert_eq!(NPOS, map.lookup(&["x", "b"]));
        assert_eq!(&["x".to_string(), "a".to_string()], map.make_addr(2));
        assert_eq!(hash_label("a"), map.addr_hashes(2)[1]);
    }

    #[test]
    fn address_hash_is_order_sensitive() {
        assert_ne!(hash_labels(["a", "b"]), hash_labels(["b", "a"]));
        let expected = combine_hash(combine_hash(0, hash_label("a")), hash_label("b"));
        assert_eq!(expected, hash_labels(["a", "b"]));
    }

    #[test]
    fn zero_dimensional_map_holds_one_subspace() {
        let mut map = FastSparseMap::new(0, 1);
        assert_eq!(NPOS, map.lookup(&[]));
        assert_eq!(0, map.add_mapping(&[]));
        assert_eq!(0, map.lookup(&[]));
        assert!(map.make_addr(0).is_empty());
    }
}
