//! Utilities for numerics.

use std::cmp::Ordering;

/// Applies the standard sigmoid/logistic function to the input.
pub fn sigmoid(v: f32) -> f32 {
    1.0 / (1.0 + (-v).exp())
}

/// An `f32` that implements [`Ord`] according to the IEEE 754 totalOrder predicate.
#[derive(Debug, Clone, Copy)]
pub struct TotalF32(pub f32);

impl PartialEq for TotalF32 {
    fn eq(&self, other: &Self) -> bool {
        self.cmp(other) == Ordering::Equal
    }
}

impl Eq for TotalF32 {}

impl PartialOrd for TotalF32 {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl Ord for TotalF32 {
    fn cmp(&self, other: &Self) -> Ordering {
        self.0.total_cmp(&other.0)
    }
}

#[cfg(test)]
mod tests {
    use approx::assert_relative_eq;

    use super::*;

    #[test]
    fn sigmoid_range() {
        assert_eq!(sigmoid(0.0), 0.5);
        assert_relative_eq!(sigmoid(10.0), 1.0, epsilon = 1e-4);
        assert_relative_eq!(sigmoid(-10.0), 0.0, epsilon = 1e-4);
    }

    #[test]
    fn total_order() {
        let mut values = [3.0, -1.0, f32::INFINITY, 0.0, -0.0].map(TotalF32);
        values.sort();
        assert_eq!(
            values.map(|v| v.0.to_bits()),
            [-1.0f32, -0.0, 0.0, 3.0, f32::INFINITY].map(f32::to_bits)
        );
    }
}
