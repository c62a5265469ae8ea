//! Counting distinct positions of an affine index `sa*a + sb*b`.
//!
//! For reduced strides `a' = sa/g`, `b' = sb/g` (with `g = gcd(sa, sb)`), two iteration points
//! collide exactly when they differ by `(+b', -a')`. Collisions therefore form chains and
//! every link removes one distinct value, which gives
//!
//! `A*B - max(0, B - a') * max(0, A - b')`.

use crate::error::{Result, WorkloadError};

pub fn gcd(a: u64, b: u64) -> Result<u64> {
    if a == 0 || b == 0 { Err(WorkloadError::Arithmetic("gcd of zero"))? }
    let (mut a, mut b) = (a, b);
    while b != 0 { (a, b) = (b, a % b); }
    Ok(a)
}

/// Number of distinct values of `sa*a + sb*b` for `a in 0..A`, `b in 0..B`.
#[allow(non_snake_case)]
pub fn count_unique(sa: u64, A: u64, sb: u64, B: u64) -> Result<u64> {
    if A == 0 || B == 0 { Err(WorkloadError::Arithmetic("empty generator range"))? }
    let g = gcd(sa, sb)?;
    let (sa, sb) = (sa / g, sb / g);
    // links never outnumber the points, so only the product can overflow
    let points = A.checked_mul(B).ok_or(WorkloadError::Arithmetic("generator ranges overflow u64"))?;
    Ok(points - B.saturating_sub(sa) * A.saturating_sub(sb))
}

/// [`count_unique`] over the two `(scaling, size)` generator pairs of one relation
pub fn count_unique_pairs(pairs: &[(u64, u64)]) -> Result<u64> {
    let &[(sa, a), (sb, b)] = pairs else {
        return Err(WorkloadError::Arithmetic("exactly two generator dimensions are required"));
    };
    count_unique(sa, a, sb, b)
}

#[cfg(test)]
mod tests {
    use super::*;
    use rand::Rng;
    use std::collections::HashSet;

    fn brute_force(sa: u64, a: u64, sb: u64, b: u64) -> u64 {
        let mut seen = HashSet::new();
        for i in 0..a { for j in 0..b { seen.insert(sa * i + sb * j); } }
        seen.len() as u64
    }

    #[test]
    fn sliding_window_overlap() {
        assert_eq!(count_unique(1, 4, 1, 3).unwrap(), 6);
        for a in 1..10 { for b in 1..10 {
            assert_eq!(count_unique(1, a, 1, b).unwrap(), a + b - 1);
        }}
    }

    #[test]
    fn strided_window() {
        // stride 2, kernel 3 over 4 outputs: 0..=8
        assert_eq!(count_unique(2, 4, 1, 3).unwrap(), 9);
        // stride larger than the kernel leaves gaps
        assert_eq!(count_unique(3, 4, 1, 2).unwrap(), 8);
        // dilated kernel
        assert_eq!(count_unique(1, 5, 2, 3).unwrap(), 9);
    }

    #[test]
    fn rejects_degenerate_input() {
        assert!(gcd(0, 3).is_err());
        assert!(count_unique(0, 4, 1, 3).is_err());
        assert!(count_unique(1, 0, 1, 3).is_err());
        assert!(count_unique_pairs(&[(1, 4)]).is_err());
        assert!(count_unique_pairs(&[(1, 4), (1, 3), (1, 2)]).is_err());
        assert_eq!(count_unique(1, u64::MAX, 1, 2), Err(WorkloadError::Arithmetic("generator ranges overflow u64")));
        assert_eq!(count_unique(1, 1 << 32, 1 << 32, 1 << 31).unwrap(), 1 << 63);
    }

    #[test]
    fn randomized_against_enumeration() {
        let mut rng = rand::thread_rng();
        for _ in 0..500 {
            let sa = rng.gen_range(1..6);
            let sb = rng.gen_range(1..6);
            let a = rng.gen_range(1..12);
            let b = rng.gen_range(1..12);
            let expected = brute_force(sa, a, sb, b);
            assert_eq!(count_unique(sa, a, sb, b).unwrap(), expected, "{sa}*{a} + {sb}*{b}");
            assert_eq!(count_unique(sb, b, sa, a).unwrap(), expected);
        }
    }
}
