// Copyright 2026 The Simlin Authors. All rights reserved.
// Use of this source code is governed by the Apache License,
// Version 2.0, that can be found in the LICENSE file.

//! Strided loops over dense cell layouts. Each loop level has a trip count
//! and a stride per offset being tracked; the innermost level is last.

pub fn run_nested_loop<F>(idx: usize, loops: &[usize], stride: &[usize], f: &mut F)
where
    F: FnMut(usize),
{
    match loops.split_first() {
        None => f(idx),
        Some((&n, inner)) => {
            let step = stride[0];
            for i in 0..n {
                run_nested_loop(idx + i * step, inner, &stride[1..], f);
            }
        }
    }
}

pub fn run_nested_loop2<F>(
    idx1: usize,
    idx2: usize,
    loops: &[usize],
    stride1: &[usize],
    stride2: &[usize],
    f: &mut F,
) where
    F: FnMut(usize, usize),
{
    match loops.split_first() {
        None => f(idx1, idx2),
        Some((&n, inner)) => {
            let (step1, step2) = (stride1[0], stride2[0]);
            for i in 0..n {
                run_nested_loop2(
                    idx1 + i * step1,
                    idx2 + i * step2,
                    inner,
                    &stride1[1..],
                    &stride2[1..],
                    f,
                );
            }
        }
    }
}

/// Odometer over a list of dimension sizes, last index varying fastest.
pub struct SubscriptIterator {
    sizes: Vec<usize>,
    next: Vec<usize>,
    remaining: usize,
}

impl SubscriptIterator {
    pub fn new(sizes: &[usize]) -> Self {
        SubscriptIterator {
            sizes: sizes.to_vec(),
            next: vec![0; sizes.len()],
            remaining: sizes.iter().product(),
        }
    }

    /// Write the next subscript into `out`, returning false once exhausted.
    pub fn next_into(&mut self, out: &mut [usize]) -> bool {
        if self.remaining == 0 {
            return false;
        }
        out.copy_from_slice(&self.next);
        self.remaining -= 1;
        for (i, n) in self.next.iter_mut().enumerate().rev() {
            *n += 1;
            if *n < self.sizes[i] {
                break;
            }
            *n = 0;
        }
        true
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn nested_loop_offsets() {
        let mut seen = vec![];
        run_nested_loop(1, &[2, 3], &[10, 2], &mut |idx| seen.push(idx));
        assert_eq!(vec![1, 3, 5, 11, 13, 15], seen);

        let mut seen = vec![];
        run_nested_loop(7, &[], &[], &mut |idx| seen.push(idx));
        assert_eq!(vec![7], seen);
    }

    #[test]
    fn nested_loop_pairs() {
        let mut seen = vec![];
        run_nested_loop2(0, 0, &[2, 2], &[2, 1], &[0, 1], &mut |a, b| seen.push((a, b)));
        assert_eq!(vec![(0, 0), (1, 1), (2, 0), (3, 1)], seen);
    }

    #[test]
    fn subscripts() {
        let cases: &[(Vec<usize>, Vec<Vec<usize>>)] = &[
            (vec![0], vec![]),
            (vec![3], vec![vec![0], vec![1], vec![2]]),
            (
                vec![3, 2],
                vec![
                    vec![0, 0],
                    vec![0, 1],
                    vec![1, 0],
                    vec![1, 1],
                    vec![2, 0],
                    vec![2, 1],
                ],
            ),
            (vec![1, 2], vec![vec![0, 0], vec![0, 1]]),
            (vec![], vec![vec![]]),
        ];
        for (sizes, expected) in cases {
            let mut iter = SubscriptIterator::new(sizes);
            let mut out = vec![0; sizes.len()];
            let mut actual = vec![];
            while iter.next_into(&mut out) {
                actual.push(out.clone());
            }
            assert_eq!(*expected, actual);
        }
    }
}
