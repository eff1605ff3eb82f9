use std::sync::Arc;

use lattice_dtype::NativeCellType;
use lattice_error::{lattice_bail, lattice_err, LatticeResult};

use crate::estimate::{ResultSizeEstimator, SizeEstimate};
use crate::range::Range;
use crate::schema::{ArraySchema, CellOrder};

/// Traversal layout of a subarray's flattened range-index space.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub enum Layout {
    /// Last dimension varies fastest.
    RowMajor,
    /// First dimension varies fastest.
    ColMajor,
    /// Cells are traversed in the array's storage tile order; partitions
    /// must respect space-tile boundaries.
    GlobalOrder,
    /// No ordering guarantee; the flattening borrows the schema cell order
    /// and stays stable for the lifetime of a partitioner.
    Unordered,
}

/// A cross product of per-dimension range lists plus a traversal layout.
///
/// Dimensions with no explicitly added range carry an implicit default
/// range covering the whole domain; the first [`Subarray::add_range`] on a
/// dimension replaces the default.
///
/// The N-tuples of range indices flatten to a 1D index space of size
/// `∏ Nd` in layout order; the partitioner works in that space.
#[derive(Debug, Clone)]
pub struct Subarray<T> {
    schema: Arc<ArraySchema<T>>,
    layout: Layout,
    dim_ranges: Vec<Vec<Range<T>>>,
    is_default: Vec<bool>,
}

impl<T: NativeCellType> Subarray<T> {
    /// Creates a subarray covering the whole domain.
    pub fn new(schema: Arc<ArraySchema<T>>, layout: Layout) -> Self {
        let dim_ranges = schema
            .dimensions()
            .iter()
            .map(|d| vec![*d.domain()])
            .collect();
        let is_default = vec![true; schema.dim_num()];
        Self {
            schema,
            layout,
            dim_ranges,
            is_default,
        }
    }

    /// The array schema this subarray queries.
    pub fn schema(&self) -> &Arc<ArraySchema<T>> {
        &self.schema
    }

    /// The traversal layout.
    pub fn layout(&self) -> Layout {
        self.layout
    }

    /// Number of dimensions.
    pub fn dim_num(&self) -> usize {
        self.dim_ranges.len()
    }

    /// Appends a range on `dim`. Multi-range dimensions are permitted.
    pub fn add_range(&mut self, dim: usize, range: Range<T>) -> LatticeResult<()> {
        if dim >= self.dim_num() {
            lattice_bail!(Domain: "dimension index {} out of bounds", dim);
        }
        let domain = self.schema.dimension(dim).domain();
        if !domain.encloses(&range) {
            lattice_bail!(
                Domain: "range {} exceeds the domain {} of dimension {}",
                range,
                domain,
                self.schema.dimension(dim).name()
            );
        }
        if self.is_default[dim] {
            self.dim_ranges[dim].clear();
            self.is_default[dim] = false;
        }
        self.dim_ranges[dim].push(range);
        Ok(())
    }

    /// Number of ranges on `dim`.
    pub fn dim_range_num(&self, dim: usize) -> u64 {
        self.dim_ranges[dim].len() as u64
    }

    /// Total number of flattened range indices, `∏ Nd`.
    pub fn range_num(&self) -> u64 {
        self.dim_ranges.iter().map(|r| r.len() as u64).product()
    }

    /// The ranges on `dim`, in insertion order.
    pub fn ranges(&self, dim: usize) -> &[Range<T>] {
        &self.dim_ranges[dim]
    }

    /// The `idx`-th range on `dim`.
    pub fn range(&self, dim: usize, idx: u64) -> &Range<T> {
        &self.dim_ranges[dim][idx as usize]
    }

    /// Dimension indices ordered slowest-varying first under the effective
    /// traversal order. Unordered borrows the schema cell order;
    /// GlobalOrder follows the tile order.
    pub(crate) fn traversal_dims(&self) -> Vec<usize> {
        let order = match self.layout {
            Layout::RowMajor => CellOrder::RowMajor,
            Layout::ColMajor => CellOrder::ColMajor,
            Layout::Unordered => self.schema.cell_order(),
            Layout::GlobalOrder => self.schema.tile_order(),
        };
        match order {
            CellOrder::RowMajor => (0..self.dim_num()).collect(),
            CellOrder::ColMajor => (0..self.dim_num()).rev().collect(),
        }
    }

    /// Per-dimension range indices of flattened index `flat`.
    pub fn range_coords(&self, flat: u64) -> Vec<u64> {
        let mut coords = vec![0u64; self.dim_num()];
        let mut rem = flat;
        for &d in self.traversal_dims().iter().rev() {
            let n = self.dim_range_num(d);
            coords[d] = rem % n;
            rem /= n;
        }
        coords
    }

    /// The flattened index of per-dimension range indices.
    pub fn flat_index(&self, coords: &[u64]) -> u64 {
        let mut flat = 0;
        for &d in &self.traversal_dims() {
            flat = flat * self.dim_range_num(d) + coords[d];
        }
        flat
    }

    /// The single-range subarray at flattened index `flat`: exactly one
    /// range per dimension.
    pub fn flat_range(&self, flat: u64) -> LatticeResult<Subarray<T>> {
        if flat >= self.range_num() {
            lattice_bail!(
                Partitioner: "flattened index {} out of bounds ({} ranges)",
                flat,
                self.range_num()
            );
        }
        let coords = self.range_coords(flat);
        let dim_ranges = coords
            .iter()
            .enumerate()
            .map(|(d, &c)| vec![self.dim_ranges[d][c as usize]])
            .collect();
        Ok(self.with_ranges(dim_ranges))
    }

    /// Materializes the flattened interval `[start, end]` as a subarray.
    /// The interval must be exactly representable as a cross product of
    /// per-dimension index runs, which calibration guarantees.
    pub(crate) fn interval(&self, start: u64, end: u64) -> LatticeResult<Subarray<T>> {
        if end < start || end >= self.range_num() {
            lattice_bail!(Partitioner: "invalid flattened interval [{}, {}]", start, end);
        }
        let cs = self.range_coords(start);
        let ce = self.range_coords(end);
        let mut dim_ranges = Vec::with_capacity(self.dim_num());
        let mut covered = 1u64;
        for d in 0..self.dim_num() {
            if ce[d] < cs[d] {
                lattice_bail!(
                    Partitioner: "flattened interval [{}, {}] is not an aligned block",
                    start,
                    end
                );
            }
            covered *= ce[d] - cs[d] + 1;
            dim_ranges.push(self.dim_ranges[d][cs[d] as usize..=ce[d] as usize].to_vec());
        }
        if covered != end - start + 1 {
            lattice_bail!(
                Partitioner: "flattened interval [{}, {}] is not an aligned block",
                start,
                end
            );
        }
        Ok(self.with_ranges(dim_ranges))
    }

    /// Whether the subarray is a single cell.
    pub fn is_unary(&self) -> bool {
        self.dim_ranges
            .iter()
            .all(|rs| rs.len() == 1 && rs[0].is_unary())
    }

    /// Estimates the result footprint of this subarray for `field`.
    pub fn estimate_result_size(
        &self,
        field: &str,
        estimator: &dyn ResultSizeEstimator<T>,
    ) -> LatticeResult<SizeEstimate> {
        let field = self
            .schema
            .field(field)
            .ok_or_else(|| lattice_err!(Budget: "unknown field {}", field))?;
        estimator.estimate(self, field)
    }

    /// Splits at `point` on `dim`: ranges entirely at or below the point go
    /// left, entirely above go right, and a straddling range is itself
    /// split. All other dimensions are carried verbatim.
    pub fn split(&self, dim: usize, point: T) -> LatticeResult<(Subarray<T>, Subarray<T>)> {
        if dim >= self.dim_num() {
            lattice_bail!(Domain: "dimension index {} out of bounds", dim);
        }
        let mut left = Vec::new();
        let mut right = Vec::new();
        for r in &self.dim_ranges[dim] {
            if r.hi() <= point {
                left.push(*r);
            } else if r.lo() > point {
                right.push(*r);
            } else {
                let (l, rr) = r.split_at(point)?;
                left.push(l);
                right.push(rr);
            }
        }
        if left.is_empty() || right.is_empty() {
            lattice_bail!(
                Domain: "splitting point {} does not separate dimension {}",
                point,
                self.schema.dimension(dim).name()
            );
        }
        Ok((
            self.with_dim_ranges(dim, left),
            self.with_dim_ranges(dim, right),
        ))
    }

    /// Splits the range list on `dim` after `index`: left keeps ranges
    /// `[0, index]`, right the rest. Unlike [`Subarray::split`] this
    /// preserves flattening order even when the list is not value-sorted.
    pub fn split_at_range_index(
        &self,
        dim: usize,
        index: u64,
    ) -> LatticeResult<(Subarray<T>, Subarray<T>)> {
        if dim >= self.dim_num() {
            lattice_bail!(Domain: "dimension index {} out of bounds", dim);
        }
        let n = self.dim_range_num(dim);
        if index + 1 >= n {
            lattice_bail!(
                Domain: "range index {} cannot split the {} ranges of dimension {}",
                index,
                n,
                self.schema.dimension(dim).name()
            );
        }
        let (l, r) = self.dim_ranges[dim].split_at((index + 1) as usize);
        Ok((
            self.with_dim_ranges(dim, l.to_vec()),
            self.with_dim_ranges(dim, r.to_vec()),
        ))
    }

    fn with_ranges(&self, dim_ranges: Vec<Vec<Range<T>>>) -> Subarray<T> {
        Subarray {
            schema: self.schema.clone(),
            layout: self.layout,
            dim_ranges,
            is_default: vec![false; self.dim_num()],
        }
    }

    fn with_dim_ranges(&self, dim: usize, ranges: Vec<Range<T>>) -> Subarray<T> {
        let mut dim_ranges = self.dim_ranges.clone();
        dim_ranges[dim] = ranges;
        self.with_ranges(dim_ranges)
    }
}
