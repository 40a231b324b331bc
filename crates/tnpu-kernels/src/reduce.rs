//! Summation order shared by the floating-point kernels.

use std::ops::Add;

const BLOCK: usize = 128;
const LANES: usize = 8;

/// Pairwise sum with eight interleaved accumulators per 128-element block,
/// the order NumPy's `sum` uses along a contiguous axis. Matching it keeps
/// rounding identical to the NumPy reference for the same element type.
pub(crate) fn pairwise_sum<T>(a: &[T]) -> T
where
    T: Copy + Default + Add<Output = T>,
{
    let n = a.len();
    if n < LANES {
        return a.iter().fold(T::default(), |acc, &x| acc + x);
    }
    if n > BLOCK {
        let half = n / 2;
        let split = half - half % LANES;
        return pairwise_sum(&a[..split]) + pairwise_sum(&a[split..]);
    }

    let mut r = [T::default(); LANES];
    r.copy_from_slice(&a[..LANES]);
    let whole = n - n % LANES;
    for chunk in a[LANES..whole].chunks_exact(LANES) {
        for (acc, &x) in r.iter_mut().zip(chunk) {
            *acc = *acc + x;
        }
    }
    let mut res = ((r[0] + r[1]) + (r[2] + r[3])) + ((r[4] + r[5]) + (r[6] + r[7]));
    for &x in &a[whole..] {
        res = res + x;
    }
    res
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn short_and_blocked_sums_are_exact_for_integers() {
        let v: Vec<f64> = (1..=300).map(f64::from).collect();
        assert_eq!(pairwise_sum(&v[..5]), 15.0);
        assert_eq!(pairwise_sum(&v[..20]), 210.0);
        assert_eq!(pairwise_sum(&v), 45150.0);
        assert_eq!(pairwise_sum::<f32>(&[]), 0.0);
    }

    #[test]
    fn lane_order_differs_from_sequential_in_f32() {
        // Sequentially the small terms are absorbed by 1e8 one at a time;
        // paired first, they survive.
        let mut v = vec![1.0f32; 16];
        v[0] = 1e8;
        let sequential = v.iter().fold(0.0f32, |a, &x| a + x);
        assert_eq!(sequential, 1e8);
        assert_eq!(pairwise_sum(&v), 100_000_008.0);
    }
}
