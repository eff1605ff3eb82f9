use std::num::NonZeroU32;

use itertools::Itertools;
use lattice_dtype::{NativeCellType, PType};
use lattice_error::{lattice_bail, LatticeResult};

use crate::range::Range;

/// Size in bytes of one var-sized cell offset.
pub const CELL_VAR_OFFSET_SIZE: u64 = 8;

/// Storage order of cells within a tile, and of tiles within the domain.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub enum CellOrder {
    /// Last dimension varies fastest.
    RowMajor,
    /// First dimension varies fastest.
    ColMajor,
}

/// Number of values stored per cell of a field.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CellValNum {
    /// Every cell holds exactly this many values.
    Fixed(NonZeroU32),
    /// Cells hold a variable number of values, addressed through offsets.
    Var,
}

impl CellValNum {
    /// One value per cell.
    pub fn single() -> Self {
        CellValNum::Fixed(NonZeroU32::MIN)
    }

    /// Whether cells are var-sized.
    pub fn is_var(&self) -> bool {
        matches!(self, CellValNum::Var)
    }
}

/// A named attribute whose values a read query can request.
#[derive(Debug, Clone, PartialEq)]
pub struct Field {
    name: String,
    ptype: PType,
    cell_val_num: CellValNum,
}

impl Field {
    /// Creates a field with an explicit cell value count.
    pub fn new(name: impl Into<String>, ptype: PType, cell_val_num: CellValNum) -> Self {
        Self {
            name: name.into(),
            ptype,
            cell_val_num,
        }
    }

    /// A fixed-size field holding one value per cell.
    pub fn fixed(name: impl Into<String>, ptype: PType) -> Self {
        Self::new(name, ptype, CellValNum::single())
    }

    /// A var-sized field.
    pub fn var(name: impl Into<String>, ptype: PType) -> Self {
        Self::new(name, ptype, CellValNum::Var)
    }

    /// The field name.
    pub fn name(&self) -> &str {
        &self.name
    }

    /// The value type.
    pub fn ptype(&self) -> PType {
        self.ptype
    }

    /// The per-cell value count.
    pub fn cell_val_num(&self) -> CellValNum {
        self.cell_val_num
    }

    /// Whether cells are var-sized.
    pub fn is_var(&self) -> bool {
        self.cell_val_num.is_var()
    }

    /// Bytes per cell in the fixed-size stream: the value bytes for fixed
    /// fields, the offset width for var-sized ones.
    pub fn fixed_cell_size(&self) -> u64 {
        match self.cell_val_num {
            CellValNum::Fixed(n) => self.ptype.byte_width() as u64 * n.get() as u64,
            CellValNum::Var => CELL_VAR_OFFSET_SIZE,
        }
    }
}

/// One dimension of an array: a name, a domain, and an optional space-tile
/// extent (required for global-order partitioning).
#[derive(Debug, Clone, PartialEq)]
pub struct Dimension<T> {
    name: String,
    domain: Range<T>,
    tile_extent: Option<T>,
}

impl<T: NativeCellType> Dimension<T> {
    /// Creates a dimension, validating the tile extent if present.
    pub fn new(
        name: impl Into<String>,
        domain: Range<T>,
        tile_extent: Option<T>,
    ) -> LatticeResult<Self> {
        let name = name.into();
        if let Some(extent) = tile_extent {
            if extent.is_nan() || !(extent > T::zero()) {
                lattice_bail!(Domain: "tile extent of dimension {} must be positive", name);
            }
        }
        Ok(Self {
            name,
            domain,
            tile_extent,
        })
    }

    /// The dimension name.
    pub fn name(&self) -> &str {
        &self.name
    }

    /// The coordinate domain.
    pub fn domain(&self) -> &Range<T> {
        &self.domain
    }

    /// The space-tile extent, if the array is tiled on this dimension.
    pub fn tile_extent(&self) -> Option<T> {
        self.tile_extent
    }
}

/// The shape of an array: its dimensions (all sharing one coordinate
/// type), its fields, and the storage cell and tile orders.
#[derive(Debug, Clone)]
pub struct ArraySchema<T> {
    dimensions: Vec<Dimension<T>>,
    fields: Vec<Field>,
    cell_order: CellOrder,
    tile_order: CellOrder,
}

impl<T: NativeCellType> ArraySchema<T> {
    /// Creates a schema, validating dimension and field names.
    pub fn new(
        dimensions: Vec<Dimension<T>>,
        fields: Vec<Field>,
        cell_order: CellOrder,
        tile_order: CellOrder,
    ) -> LatticeResult<Self> {
        if dimensions.is_empty() {
            lattice_bail!(Domain: "an array schema needs at least one dimension");
        }
        let mut names = dimensions
            .iter()
            .map(Dimension::name)
            .chain(fields.iter().map(Field::name));
        if !names.all_unique() {
            lattice_bail!(Domain: "dimension and field names must be unique");
        }
        Ok(Self {
            dimensions,
            fields,
            cell_order,
            tile_order,
        })
    }

    /// Number of dimensions.
    pub fn dim_num(&self) -> usize {
        self.dimensions.len()
    }

    /// The dimension at `dim`.
    pub fn dimension(&self, dim: usize) -> &Dimension<T> {
        &self.dimensions[dim]
    }

    /// All dimensions, in schema order.
    pub fn dimensions(&self) -> &[Dimension<T>] {
        &self.dimensions
    }

    /// Looks a field up by name.
    pub fn field(&self, name: &str) -> Option<&Field> {
        self.fields.iter().find(|f| f.name() == name)
    }

    /// All fields, in schema order.
    pub fn fields(&self) -> &[Field] {
        &self.fields
    }

    /// The storage cell order.
    pub fn cell_order(&self) -> CellOrder {
        self.cell_order
    }

    /// The storage tile order.
    pub fn tile_order(&self) -> CellOrder {
        self.tile_order
    }
}
