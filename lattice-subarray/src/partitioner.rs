use std::collections::{HashMap, VecDeque};
use std::sync::Arc;

use lattice_dtype::NativeCellType;
use lattice_error::{lattice_bail, lattice_err, LatticeResult};

use crate::budget::{BudgetStore, ResultBudget};
use crate::estimate::{ResultSizeEstimator, SizeEstimate};
use crate::schema::Field;
use crate::subarray::{Layout, Subarray};

/// Information about the current partition.
///
/// Besides the partition itself this records the interval `[start, end]`
/// of flattened range indices of the *original* subarray the partition was
/// constructed from, which is what allows the partitioner to split the
/// current partition further when the reader asks for it.
#[derive(Debug, Clone)]
pub struct PartitionInfo<T> {
    partition: Subarray<T>,
    start: u64,
    end: u64,
    split_multi_range: bool,
}

impl<T: NativeCellType> PartitionInfo<T> {
    /// The current partition.
    pub fn partition(&self) -> &Subarray<T> {
        &self.partition
    }

    /// First flattened range index the partition was constructed from.
    pub fn start(&self) -> u64 {
        self.start
    }

    /// Last flattened range index the partition was constructed from.
    pub fn end(&self) -> u64 {
        self.end
    }

    /// Whether this partition came off the multi-range queue.
    pub fn split_multi_range(&self) -> bool {
        self.split_multi_range
    }
}

/// The remaining work of a partitioner: the interval of the original
/// flattening still to be consumed, plus the two queues of subarrays that
/// resulted from splitting and are next in line for emission.
#[derive(Debug, Clone)]
pub struct PartitionerState<T> {
    start: u64,
    end: u64,
    single_range: VecDeque<Subarray<T>>,
    multi_range: VecDeque<Subarray<T>>,
}

impl<T: NativeCellType> PartitionerState<T> {
    /// First flattened range index not yet consumed.
    pub fn start(&self) -> u64 {
        self.start
    }

    /// Last flattened range index of the original subarray.
    pub fn end(&self) -> u64 {
        self.end
    }

    /// Pending single-range subarrays, front first.
    pub fn single_range(&self) -> &VecDeque<Subarray<T>> {
        &self.single_range
    }

    /// Pending multi-range subarrays, front first.
    pub fn multi_range(&self) -> &VecDeque<Subarray<T>> {
        &self.multi_range
    }
}

enum MultiSplit<T> {
    /// Halve the range list: left keeps indices `[0, index]`.
    AtRangeIndex { dim: usize, index: u64 },
    /// Value-split the single range on the splitting dimension.
    AtPoint { dim: usize, point: T },
}

/// Iterates over partitions of a subarray such that the results each
/// partition would produce (approximately) fit the caller's budgets.
///
/// Works like an iterator: [`SubarrayPartitioner::next`] advances to the
/// next partition, [`SubarrayPartitioner::current`] exposes it, and
/// [`SubarrayPartitioner::done`] reports exhaustion. When the reader finds
/// that actual results overflowed despite the estimate, it calls
/// [`SubarrayPartitioner::split_current`] to re-split the current
/// partition in place.
///
/// Every operation is single-threaded, lock-free, and bounded-time.
#[derive(Debug, Clone)]
pub struct SubarrayPartitioner<T> {
    subarray: Subarray<T>,
    estimator: Arc<dyn ResultSizeEstimator<T>>,
    budget: BudgetStore,
    current: PartitionInfo<T>,
    state: PartitionerState<T>,
    // Per-field prefix sums of per-flat-range estimates over the original
    // subarray, built lazily and reused across `next` calls.
    prefix_estimates: HashMap<String, Vec<SizeEstimate>>,
}

impl<T: NativeCellType> SubarrayPartitioner<T> {
    /// Creates a partitioner over `subarray`, estimating result sizes with
    /// `estimator`.
    pub fn new(
        subarray: Subarray<T>,
        estimator: Arc<dyn ResultSizeEstimator<T>>,
    ) -> LatticeResult<Self> {
        if subarray.layout() == Layout::GlobalOrder {
            for dim in 0..subarray.dim_num() {
                if subarray.dim_range_num(dim) != 1 {
                    lattice_bail!(
                        Domain: "global order subarrays must have one range per dimension; dimension {} has {}",
                        dim,
                        subarray.dim_range_num(dim)
                    );
                }
                if subarray.schema().dimension(dim).tile_extent().is_none() {
                    lattice_bail!(
                        Domain: "global order partitioning requires a tile extent on dimension {}",
                        subarray.schema().dimension(dim).name()
                    );
                }
            }
        }
        let end = subarray.range_num() - 1;
        let current = PartitionInfo {
            partition: subarray.clone(),
            start: 0,
            end,
            split_multi_range: false,
        };
        Ok(Self {
            subarray,
            estimator,
            budget: BudgetStore::default(),
            current,
            state: PartitionerState {
                start: 0,
                end,
                single_range: VecDeque::new(),
                multi_range: VecDeque::new(),
            },
            prefix_estimates: HashMap::new(),
        })
    }

    /// The subarray being partitioned.
    pub fn subarray(&self) -> &Subarray<T> {
        &self.subarray
    }

    /// The remaining-work state.
    pub fn state(&self) -> &PartitionerState<T> {
        &self.state
    }

    /// The current partition; meaningful iff `!done()`.
    pub fn current(&self) -> &Subarray<T> {
        &self.current.partition
    }

    /// The current partition info; meaningful iff `!done()`.
    pub fn current_partition_info(&self) -> &PartitionInfo<T> {
        &self.current
    }

    /// Whether there are no more partitions.
    pub fn done(&self) -> bool {
        self.state.start > self.state.end
            && self.state.single_range.is_empty()
            && self.state.multi_range.is_empty()
    }

    /// Exchanges all state with `other` in one step.
    pub fn swap(&mut self, other: &mut Self) {
        std::mem::swap(self, other);
    }

    /// Sets the result budget (in bytes) for a fixed-sized field.
    pub fn set_result_budget(&mut self, field: &str, budget: u64) -> LatticeResult<()> {
        let field = self.lookup_field(field)?.clone();
        self.budget.set_fixed(&field, budget)
    }

    /// Sets the offsets and values result budgets (in bytes) for a
    /// var-sized field.
    pub fn set_result_budget_var(
        &mut self,
        field: &str,
        budget_off: u64,
        budget_val: u64,
    ) -> LatticeResult<()> {
        let field = self.lookup_field(field)?.clone();
        self.budget.set_var(&field, budget_off, budget_val)
    }

    /// The result budget set for `field`, or `None` if unset.
    pub fn get_result_budget(&self, field: &str) -> LatticeResult<Option<ResultBudget>> {
        self.lookup_field(field)?;
        Ok(self.budget.get(field).copied())
    }

    /// All field budgets that have been set.
    pub fn budget(&self) -> &BudgetStore {
        &self.budget
    }

    /// Sets the memory budget pair (fixed-size bytes, var-size bytes).
    pub fn set_memory_budget(&mut self, budget: u64, budget_var: u64) -> LatticeResult<()> {
        self.budget.set_memory_budget(budget, budget_var)
    }

    /// The `(fixed, var)` memory budget pair.
    pub fn memory_budget(&self) -> (u64, u64) {
        self.budget.memory_budget()
    }

    /// Advances to the next partition.
    ///
    /// If the next partition overflows the budget but cannot be split
    /// further (typically a single cell), it is still emitted and
    /// `unsplittable` is set; callers must check the flag on every call.
    /// After `done()` this is a no-op.
    pub fn next(&mut self, unsplittable: &mut bool) -> LatticeResult<()> {
        *unsplittable = false;
        if self.done() {
            return Ok(());
        }
        if !self.state.single_range.is_empty() {
            return self.next_from_single_range(unsplittable);
        }
        if !self.state.multi_range.is_empty() {
            return self.next_from_multi_range(unsplittable);
        }

        let start = self.state.start;
        let (end, found) = self.compute_current_start_end()?;
        if !found {
            log::debug!("flattened range {start} overflows the budget on its own; splitting it");
            let single = self.subarray.flat_range(start)?;
            self.current.start = start;
            self.current.end = start;
            self.state.single_range.push_front(single);
            return self.next_from_single_range(unsplittable);
        }

        let (end, must_split_slab) = self.calibrate_current_start_end(start, end);
        self.current.start = start;
        self.current.end = end;
        if must_split_slab {
            log::debug!("slab [{start}, {end}] overflows the budget; splitting it");
            let slab = self.subarray.interval(start, end)?;
            self.state.multi_range.push_front(slab);
            return self.next_from_multi_range(unsplittable);
        }

        log::debug!("emitting flattened interval [{start}, {end}]");
        self.current.partition = self.subarray.interval(start, end)?;
        self.current.split_multi_range = false;
        self.state.start = end + 1;
        Ok(())
    }

    /// Re-splits the current partition and emits the left piece as the new
    /// current partition. Called by the reader when the partition's actual
    /// results overflowed despite the estimate.
    ///
    /// If no piece can be produced (single cell, or real-domain
    /// exhaustion), `unsplittable` is set and nothing changes. After
    /// `done()` this is a no-op that sets `unsplittable`.
    pub fn split_current(&mut self, unsplittable: &mut bool) -> LatticeResult<()> {
        *unsplittable = false;
        if self.done() {
            *unsplittable = true;
            return Ok(());
        }

        if self.current.partition.range_num() > 1 {
            if self.compute_splitting_point_multi(&self.current.partition).is_none() {
                *unsplittable = true;
                return Ok(());
            }
            if self.state.multi_range.is_empty() {
                self.state.start = self.current.start;
            }
            let partition = self.current.partition.clone();
            self.state.multi_range.push_front(partition);
            self.split_top_multi_range(unsplittable)?;
            return self.next_from_multi_range(unsplittable);
        }

        if self.compute_splitting_point_single(&self.current.partition)?.is_none() {
            *unsplittable = true;
            return Ok(());
        }
        if self.state.single_range.is_empty() {
            self.state.start = self.current.start;
        }
        let partition = self.current.partition.clone();
        self.state.single_range.push_front(partition);
        self.split_top_single_range(unsplittable)?;
        self.next_from_single_range(unsplittable)
    }

    fn lookup_field(&self, name: &str) -> LatticeResult<&Field> {
        self.subarray
            .schema()
            .field(name)
            .ok_or_else(|| lattice_err!(Budget: "unknown field {}", name))
    }

    /// Finds the largest interval end at `state.start` whose cumulative
    /// estimate fits every budget. `found == false` means the single
    /// flattened range at the start already overflows on its own.
    fn compute_current_start_end(&mut self) -> LatticeResult<(u64, bool)> {
        let names: Vec<String> = self.budget.names().cloned().collect();
        for name in &names {
            self.ensure_prefix(name)?;
        }
        let start = self.state.start;
        if !self.interval_fits(start, start, &names)? {
            return Ok((start, false));
        }
        let (mut lo, mut hi) = (start, self.state.end);
        while lo < hi {
            let mid = lo + (hi - lo + 1) / 2;
            if self.interval_fits(start, mid, &names)? {
                lo = mid;
            } else {
                hi = mid - 1;
            }
        }
        Ok((lo, true))
    }

    /// Builds the prefix sums of per-flat-range estimates for `field`,
    /// once per partitioner lifetime.
    fn ensure_prefix(&mut self, field_name: &str) -> LatticeResult<()> {
        if self.prefix_estimates.contains_key(field_name) {
            return Ok(());
        }
        let field = self.lookup_field(field_name)?.clone();
        let range_num = usize::try_from(self.subarray.range_num())
            .map_err(|_| lattice_err!(Estimation: "range count exceeds the addressable size"))?;
        let mut prefix = Vec::with_capacity(range_num + 1);
        prefix.push(SizeEstimate::default());
        for flat in 0..range_num as u64 {
            let single = self.subarray.flat_range(flat)?;
            let estimate = self.estimator.estimate(&single, &field)?;
            prefix.push(prefix[flat as usize] + estimate);
        }
        self.prefix_estimates.insert(field_name.to_string(), prefix);
        Ok(())
    }

    /// Whether the cumulative estimate of `[start, end]` fits every field
    /// budget and the memory budget pair.
    fn interval_fits(&self, start: u64, end: u64, names: &[String]) -> LatticeResult<bool> {
        let (memory_budget, memory_budget_var) = self.budget.memory_budget();
        let mut total = SizeEstimate::default();
        for name in names {
            let budget = self
                .budget
                .get(name)
                .ok_or_else(|| lattice_err!(Partitioner: "missing budget for field {}", name))?;
            let prefix = self
                .prefix_estimates
                .get(name)
                .ok_or_else(|| lattice_err!(Partitioner: "missing estimates for field {}", name))?;
            let estimate = prefix[(end + 1) as usize] - prefix[start as usize];
            if estimate.fixed_bytes > budget.size_fixed as f64
                || estimate.var_bytes > budget.size_var as f64
            {
                return Ok(false);
            }
            total += estimate;
        }
        Ok(total.fixed_bytes <= memory_budget as f64 && total.var_bytes <= memory_budget_var as f64)
    }

    /// Whether `partition`'s estimate exceeds any per-field budget or the
    /// memory budget pair.
    fn must_split(&self, partition: &Subarray<T>) -> LatticeResult<bool> {
        let (memory_budget, memory_budget_var) = self.budget.memory_budget();
        let mut total = SizeEstimate::default();
        for (name, budget) in self.budget.iter() {
            let field = self.lookup_field(name)?;
            let estimate = self.estimator.estimate(partition, field)?;
            if estimate.fixed_bytes > budget.size_fixed as f64
                || estimate.var_bytes > budget.size_var as f64
            {
                return Ok(true);
            }
            total += estimate;
        }
        Ok(total.fixed_bytes > memory_budget as f64 || total.var_bytes > memory_budget_var as f64)
    }

    /// Snaps the tentative interval end to a layout-legal boundary.
    ///
    /// RowMajor/ColMajor intervals must form whole slabs (full range lists
    /// on every dimension except the splitting one); an interval smaller
    /// than one slab takes the whole slab and reports `must_split_slab`.
    /// Unordered intervals shrink to the largest exactly-representable
    /// aligned block, which may be a partial row. GlobalOrder subarrays
    /// have a single flattened range and need no calibration.
    fn calibrate_current_start_end(&self, start: u64, end: u64) -> (u64, bool) {
        let layout = self.subarray.layout();
        if layout == Layout::GlobalOrder {
            return (end, false);
        }
        let order = self.subarray.traversal_dims();
        let dim_num = order.len();
        if dim_num == 1 {
            return (end, false);
        }

        // Range counts and start coordinates in traversal (major to minor)
        // order.
        let counts: Vec<u64> = order
            .iter()
            .map(|&d| self.subarray.dim_range_num(d))
            .collect();
        let coords = self.subarray.range_coords(start);
        let c: Vec<u64> = order.iter().map(|&d| coords[d]).collect();

        // Outermost level at which `start` begins a block: every minor
        // coordinate inside it is zero.
        let mut level = 0;
        for j in (1..dim_num).rev() {
            if c[j] != 0 {
                level = j;
                break;
            }
        }

        let len = end - start + 1;
        let mut block: u64 = counts[level + 1..].iter().product();
        for j in level..dim_num {
            let fitting = (len / block).min(counts[j] - c[j]);
            if fitting >= 1 {
                return (start + fitting * block - 1, false);
            }
            if j == 0 && layout != Layout::Unordered {
                // Less than one slab fits: take the whole slab and split
                // it along the splitting dimension.
                return (start + block - 1, true);
            }
            if j + 1 < dim_num {
                block /= counts[j + 1];
            }
        }
        // Unreachable: the innermost block size is 1 and always fits.
        (start, false)
    }

    fn next_from_single_range(&mut self, unsplittable: &mut bool) -> LatticeResult<()> {
        loop {
            let must = {
                let front = self.front_single()?;
                self.must_split(front)?
            };
            if !must {
                break;
            }
            self.split_top_single_range(unsplittable)?;
            if *unsplittable {
                log::debug!("emitting an unsplittable single-range partition");
                break;
            }
        }
        let partition = self
            .state
            .single_range
            .pop_front()
            .ok_or_else(|| lattice_err!(Partitioner: "single-range queue drained unexpectedly"))?;
        self.current.partition = partition;
        self.current.split_multi_range = false;
        if self.state.single_range.is_empty() {
            self.state.start = self.current.end + 1;
        }
        Ok(())
    }

    fn next_from_multi_range(&mut self, unsplittable: &mut bool) -> LatticeResult<()> {
        loop {
            let must = {
                let front = self.front_multi()?;
                self.must_split(front)?
            };
            if !must {
                break;
            }
            self.split_top_multi_range(unsplittable)?;
            if *unsplittable {
                log::debug!("emitting an unsplittable multi-range partition");
                break;
            }
        }
        let partition = self
            .state
            .multi_range
            .pop_front()
            .ok_or_else(|| lattice_err!(Partitioner: "multi-range queue drained unexpectedly"))?;
        self.current.partition = partition;
        self.current.split_multi_range = true;
        if self.state.multi_range.is_empty() {
            self.state.start = self.current.end + 1;
        }
        Ok(())
    }

    fn front_single(&self) -> LatticeResult<&Subarray<T>> {
        self.state
            .single_range
            .front()
            .ok_or_else(|| lattice_err!(Partitioner: "single-range queue drained unexpectedly"))
    }

    fn front_multi(&self) -> LatticeResult<&Subarray<T>> {
        self.state
            .multi_range
            .front()
            .ok_or_else(|| lattice_err!(Partitioner: "multi-range queue drained unexpectedly"))
    }

    /// Splits the front of the single-range queue in place, pushing the
    /// left piece first so flattening order is preserved, or raises
    /// `unsplittable`.
    fn split_top_single_range(&mut self, unsplittable: &mut bool) -> LatticeResult<()> {
        let split = self.compute_splitting_point_single(self.front_single()?)?;
        let Some((dim, point)) = split else {
            *unsplittable = true;
            return Ok(());
        };
        let front = self
            .state
            .single_range
            .pop_front()
            .ok_or_else(|| lattice_err!(Partitioner: "single-range queue drained unexpectedly"))?;
        let (left, right) = front.split(dim, point)?;
        self.state.single_range.push_front(right);
        self.state.single_range.push_front(left);
        Ok(())
    }

    /// Splits the front of the multi-range queue in place, or raises
    /// `unsplittable`.
    fn split_top_multi_range(&mut self, unsplittable: &mut bool) -> LatticeResult<()> {
        let split = self.compute_splitting_point_multi(self.front_multi()?);
        let Some(split) = split else {
            *unsplittable = true;
            return Ok(());
        };
        let front = self
            .state
            .multi_range
            .pop_front()
            .ok_or_else(|| lattice_err!(Partitioner: "multi-range queue drained unexpectedly"))?;
        let (left, right) = match split {
            MultiSplit::AtRangeIndex { dim, index } => front.split_at_range_index(dim, index)?,
            MultiSplit::AtPoint { dim, point } => front.split(dim, point)?,
        };
        self.state.multi_range.push_front(right);
        self.state.multi_range.push_front(left);
        Ok(())
    }

    /// Chooses the splitting dimension and point for a single-range
    /// subarray. Dimensions are considered innermost (fastest-varying)
    /// first and the first splittable one wins, so repeated splits peel a
    /// partition down to unary innermost ranges before touching outer
    /// dimensions. GlobalOrder subarrays split on space tiles instead.
    fn compute_splitting_point_single(
        &self,
        range: &Subarray<T>,
    ) -> LatticeResult<Option<(usize, T)>> {
        if self.subarray.layout() == Layout::GlobalOrder {
            return self.compute_splitting_point_on_tiles(range);
        }
        for &dim in self.subarray.traversal_dims().iter().rev() {
            let r = range.range(dim, 0);
            if !r.is_splittable() {
                continue;
            }
            let point = r.midpoint();
            // Float midpoints can round onto an endpoint; endpoints one
            // ULP apart admit no separating split.
            if point == r.hi() || (point == r.lo() && r.lo().next_point() == r.hi()) {
                return Ok(None);
            }
            return Ok(Some((dim, point)));
        }
        Ok(None)
    }

    /// GlobalOrder splitting: scans dimensions in tile order for one whose
    /// range spans more than one space tile, and splits at the tile
    /// boundary nearest the range's midpoint in tile-index space. A range
    /// inside a single space tile is unsplittable.
    fn compute_splitting_point_on_tiles(
        &self,
        range: &Subarray<T>,
    ) -> LatticeResult<Option<(usize, T)>> {
        let schema = self.subarray.schema();
        for &dim in &self.subarray.traversal_dims() {
            let dimension = schema.dimension(dim);
            let extent = dimension.tile_extent().ok_or_else(|| {
                lattice_err!(Domain: "dimension {} has no tile extent", dimension.name())
            })?;
            let r = range.range(dim, 0);
            let domain_lo = dimension.domain().lo();
            let tile_lo = T::tile_index(r.lo(), domain_lo, extent);
            let tile_hi = T::tile_index(r.hi(), domain_lo, extent);
            if tile_hi == tile_lo {
                continue;
            }
            let boundary = tile_lo + (tile_hi - tile_lo + 1) / 2;
            let point = T::tile_split_point(domain_lo, extent, boundary);
            return Ok(Some((dim, point)));
        }
        Ok(None)
    }

    /// Chooses the split for a multi-range partition: halve the splitting
    /// dimension's range list at its middle range, or value-split when the
    /// list holds a single range.
    fn compute_splitting_point_multi(&self, partition: &Subarray<T>) -> Option<MultiSplit<T>> {
        let dim = self.multi_splitting_dim(partition);
        let n = partition.dim_range_num(dim);
        if n > 1 {
            return Some(MultiSplit::AtRangeIndex {
                dim,
                index: (n - 1) / 2,
            });
        }
        let r = partition.range(dim, 0);
        if !r.is_splittable() {
            return None;
        }
        let point = r.midpoint();
        if point == r.hi() || (point == r.lo() && r.lo().next_point() == r.hi()) {
            return None;
        }
        Some(MultiSplit::AtPoint { dim, point })
    }

    /// The multi-range splitting dimension: the slowest-varying dimension
    /// for structured layouts; Unordered is free to pick any dimension and
    /// prefers the one with the most ranges.
    fn multi_splitting_dim(&self, partition: &Subarray<T>) -> usize {
        match self.subarray.layout() {
            Layout::Unordered => (0..partition.dim_num())
                .max_by_key(|&d| (partition.dim_range_num(d), std::cmp::Reverse(d)))
                .unwrap_or(0),
            _ => self.subarray.traversal_dims()[0],
        }
    }
}
