#[cfg(feature = "parallel")]
use rayon::prelude::*;
use serde::Deserialize;

use crate::problem::Distance;

/// Nearest-integer rule applied to euclidean distances.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum RoundingMode {
    /// ties to even, e.g. 2.5 -> 2 and 3.5 -> 4
    #[default]
    HalfEven,
    /// TSPLIB `nint`: floor(d + 0.5)
    HalfUp,
}

impl RoundingMode {
    pub fn round(&self, value: f64) -> Distance {
        match self {
            RoundingMode::HalfEven => value.round_ties_even() as Distance,
            RoundingMode::HalfUp => (value + 0.5).floor() as Distance,
        }
    }
}

pub trait TravelMatrix {
    fn distance(&self, from: usize, to: usize) -> Distance;
    fn max_distance(&self) -> Distance;
    fn num_nodes(&self) -> usize;
}

#[derive(Debug, Clone)]
pub struct FixSizedTravelMatrix {
    n: usize,
    data: Vec<Distance>,
    max_distance: Distance,
}

fn euclidean(a: &(f64, f64), b: &(f64, f64)) -> f64 {
    let dx = a.0 - b.0;
    let dy = a.1 - b.1;
    (dx * dx + dy * dy).sqrt()
}

impl FixSizedTravelMatrix {
    /// Builds the full matrix from planar coordinates. Only the upper triangle is evaluated,
    /// the lower one is mirrored from it.
    pub fn with_euclidean_distances(coords: &[(f64, f64)], rounding: RoundingMode) -> Self {
        let n = coords.len();

        let upper = |i: usize| -> Vec<Distance> {
            ((i + 1)..n)
                .map(|j| rounding.round(euclidean(&coords[i], &coords[j])))
                .collect()
        };

        #[cfg(feature = "parallel")]
        let rows: Vec<Vec<Distance>> = (0..n).into_par_iter().map(upper).collect();
        #[cfg(not(feature = "parallel"))]
        let rows: Vec<Vec<Distance>> = (0..n).map(upper).collect();

        let mut data = vec![0; n * n];
        let mut max_distance = 0;
        for (i, row) in rows.into_iter().enumerate() {
            for (offset, distance) in row.into_iter().enumerate() {
                let j = i + 1 + offset;
                data[i * n + j] = distance;
                data[j * n + i] = distance;
                if distance > max_distance {
                    max_distance = distance;
                }
            }
        }

        Self {
            n,
            data,
            max_distance,
        }
    }

    #[inline(always)]
    fn idx(&self, from: usize, to: usize) -> usize {
        debug_assert!(from < self.n);
        debug_assert!(to < self.n);
        from * self.n + to
    }

    pub fn is_symmetric(&self) -> bool {
        (0..self.n).all(|i| (0..i).all(|j| self.data[self.idx(i, j)] == self.data[self.idx(j, i)]))
    }
}

impl TravelMatrix for FixSizedTravelMatrix {
    #[inline(always)]
    fn distance(&self, from: usize, to: usize) -> Distance {
        self.data[self.idx(from, to)]
    }
    #[inline(always)]
    fn max_distance(&self) -> Distance {
        self.max_distance
    }
    #[inline(always)]
    fn num_nodes(&self) -> usize {
        self.n
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn rounding_modes_differ_on_ties_only() {
        assert_eq!(RoundingMode::HalfEven.round(2.5), 2);
        assert_eq!(RoundingMode::HalfUp.round(2.5), 3);
        assert_eq!(RoundingMode::HalfEven.round(3.5), 4);
        assert_eq!(RoundingMode::HalfUp.round(3.5), 4);
        assert_eq!(RoundingMode::HalfEven.round(2.4999), 2);
        assert_eq!(RoundingMode::HalfUp.round(2.6), 3);
    }

    #[test]
    fn symmetric_with_zero_diagonal() {
        let coords = vec![(0.0, 0.0), (3.0, 4.0), (-1.5, 2.25), (10.0, -7.0), (0.5, 0.5)];
        let matrix = FixSizedTravelMatrix::with_euclidean_distances(&coords, RoundingMode::HalfEven);
        assert_eq!(matrix.num_nodes(), 5);
        assert!(matrix.is_symmetric());
        for i in 0..coords.len() {
            assert_eq!(matrix.distance(i, i), 0);
            for j in 0..coords.len() {
                assert!(matrix.distance(i, j) >= 0);
            }
        }
        assert_eq!(matrix.distance(0, 1), 5);
        let max = (0..5).flat_map(|i| (0..5).map(move |j| (i, j))).map(|(i, j)| matrix.distance(i, j)).max();
        assert_eq!(Some(matrix.max_distance()), max);
    }

    #[test]
    fn ties_follow_rounding_mode() {
        // 0.5 apart: a tie between 0 and 1
        let coords = vec![(0.0, 0.0), (0.5, 0.0)];
        let even = FixSizedTravelMatrix::with_euclidean_distances(&coords, RoundingMode::HalfEven);
        let up = FixSizedTravelMatrix::with_euclidean_distances(&coords, RoundingMode::HalfUp);
        assert_eq!(even.distance(0, 1), 0);
        assert_eq!(up.distance(1, 0), 1);
    }

    #[test]
    fn single_node_matrix() {
        let matrix = FixSizedTravelMatrix::with_euclidean_distances(&[(1.0, 2.0)], RoundingMode::HalfUp);
        assert_eq!(matrix.distance(0, 0), 0);
        assert_eq!(matrix.max_distance(), 0);
    }
}
