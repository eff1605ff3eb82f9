use std::fmt::Debug;
use std::ops::{Add, AddAssign, Sub};

use lattice_dtype::NativeCellType;
use lattice_error::LatticeResult;

use crate::range::Range;
use crate::schema::Field;
use crate::subarray::Subarray;

/// Estimated result footprint of a subarray for one field, in bytes.
///
/// Estimates, not oracles: the reader may still overflow and ask the
/// partitioner to re-split.
#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct SizeEstimate {
    /// Fixed-size stream bytes: values for fixed fields, offsets for
    /// var-sized ones.
    pub fixed_bytes: f64,
    /// Var-size stream bytes; zero for fixed fields.
    pub var_bytes: f64,
}

impl Add for SizeEstimate {
    type Output = SizeEstimate;

    fn add(self, rhs: SizeEstimate) -> SizeEstimate {
        SizeEstimate {
            fixed_bytes: self.fixed_bytes + rhs.fixed_bytes,
            var_bytes: self.var_bytes + rhs.var_bytes,
        }
    }
}

impl AddAssign for SizeEstimate {
    fn add_assign(&mut self, rhs: SizeEstimate) {
        *self = *self + rhs;
    }
}

impl Sub for SizeEstimate {
    type Output = SizeEstimate;

    fn sub(self, rhs: SizeEstimate) -> SizeEstimate {
        SizeEstimate {
            fixed_bytes: self.fixed_bytes - rhs.fixed_bytes,
            var_bytes: self.var_bytes - rhs.var_bytes,
        }
    }
}

/// Predicts the result footprint of a subarray for one field.
///
/// The partitioner only needs two properties from an implementation:
/// estimates are monotone (a subarray covering a smaller span never
/// estimates larger) and additive across disjoint flattened ranges. Real
/// deployments back this with tile-overlap metadata; that machinery is
/// opaque here.
pub trait ResultSizeEstimator<T: NativeCellType>: Debug {
    /// Estimates the result footprint of `subarray` for `field`.
    fn estimate(&self, subarray: &Subarray<T>, field: &Field) -> LatticeResult<SizeEstimate>;
}

/// Estimator assuming results are uniformly dense over the domain.
///
/// Estimated cells = `density × ∏_d Σ_r span_volume(r)`; integer spans
/// count cells exactly, float spans measure interval length.
#[derive(Debug, Clone)]
pub struct UniformDensityEstimator {
    density: f64,
    mean_var_cell_size: f64,
}

/// Assumed bytes per var-sized cell when nothing better is known.
pub const DEFAULT_MEAN_VAR_CELL_SIZE: f64 = 16.0;

impl UniformDensityEstimator {
    /// Creates an estimator with `density` result cells per unit of domain
    /// volume and a mean var-sized cell payload of `mean_var_cell_size`
    /// bytes.
    pub fn new(density: f64, mean_var_cell_size: f64) -> Self {
        Self {
            density,
            mean_var_cell_size,
        }
    }
}

impl Default for UniformDensityEstimator {
    fn default() -> Self {
        Self::new(1.0, DEFAULT_MEAN_VAR_CELL_SIZE)
    }
}

impl<T: NativeCellType> ResultSizeEstimator<T> for UniformDensityEstimator {
    fn estimate(&self, subarray: &Subarray<T>, field: &Field) -> LatticeResult<SizeEstimate> {
        let mut cells = self.density;
        for dim in 0..subarray.dim_num() {
            cells *= subarray
                .ranges(dim)
                .iter()
                .map(Range::span_volume)
                .sum::<f64>();
        }
        let var_bytes = if field.is_var() {
            cells * self.mean_var_cell_size
        } else {
            0.0
        };
        Ok(SizeEstimate {
            fixed_bytes: cells * field.fixed_cell_size() as f64,
            var_bytes,
        })
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use lattice_dtype::PType;

    use super::*;
    use crate::schema::{ArraySchema, CellOrder, Dimension};
    use crate::subarray::Layout;

    fn int_subarray() -> Subarray<i32> {
        let schema = Arc::new(
            ArraySchema::new(
                vec![
                    Dimension::new("d0", Range::new(1, 100).unwrap(), None).unwrap(),
                    Dimension::new("d1", Range::new(1, 100).unwrap(), None).unwrap(),
                ],
                vec![
                    Field::fixed("a", PType::I32),
                    Field::var("v", PType::U8),
                ],
                CellOrder::RowMajor,
                CellOrder::RowMajor,
            )
            .unwrap(),
        );
        let mut s = Subarray::new(schema, Layout::RowMajor);
        s.add_range(0, Range::new(1, 10).unwrap()).unwrap();
        s.add_range(0, Range::new(21, 30).unwrap()).unwrap();
        s.add_range(1, Range::new(1, 5).unwrap()).unwrap();
        s
    }

    #[test]
    fn counts_integer_cells() {
        let s = int_subarray();
        let est = s
            .estimate_result_size("a", &UniformDensityEstimator::default())
            .unwrap();
        // (10 + 10) * 5 cells, 4 bytes each.
        assert_eq!(est.fixed_bytes, 400.0);
        assert_eq!(est.var_bytes, 0.0);
    }

    #[test]
    fn var_fields_estimate_both_streams() {
        let s = int_subarray();
        let est = s
            .estimate_result_size("v", &UniformDensityEstimator::default())
            .unwrap();
        // 100 cells: 8-byte offsets plus the assumed payload.
        assert_eq!(est.fixed_bytes, 800.0);
        assert_eq!(est.var_bytes, 100.0 * DEFAULT_MEAN_VAR_CELL_SIZE);
    }

    #[test]
    fn unknown_field_is_rejected() {
        let s = int_subarray();
        assert!(s
            .estimate_result_size("missing", &UniformDensityEstimator::default())
            .is_err());
    }

    #[test]
    fn float_estimates_scale_with_span() {
        let schema = Arc::new(
            ArraySchema::new(
                vec![Dimension::new("x", Range::new(0.0_f64, 1.0).unwrap(), None).unwrap()],
                vec![Field::fixed("a", PType::F64)],
                CellOrder::RowMajor,
                CellOrder::RowMajor,
            )
            .unwrap(),
        );
        let est = UniformDensityEstimator::new(1000.0, DEFAULT_MEAN_VAR_CELL_SIZE);
        let whole = Subarray::new(schema.clone(), Layout::RowMajor);
        let mut half = Subarray::new(schema, Layout::RowMajor);
        half.add_range(0, Range::new(0.0, 0.5).unwrap()).unwrap();
        let whole_est = whole.estimate_result_size("a", &est).unwrap();
        let half_est = half.estimate_result_size("a", &est).unwrap();
        assert_eq!(whole_est.fixed_bytes, 8000.0);
        assert_eq!(half_est.fixed_bytes, 4000.0);
    }

    #[test]
    fn estimate_arithmetic() {
        let a = SizeEstimate {
            fixed_bytes: 10.0,
            var_bytes: 4.0,
        };
        let b = SizeEstimate {
            fixed_bytes: 6.0,
            var_bytes: 1.0,
        };
        let mut c = a + b;
        assert_eq!(c.fixed_bytes, 16.0);
        c += b;
        assert_eq!(c.var_bytes, 6.0);
        assert_eq!((c - a).fixed_bytes, 12.0);
    }
}
