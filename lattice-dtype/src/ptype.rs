//! Physical type definitions and behavior.

use std::fmt::{Debug, Display, Formatter};

use lattice_error::{lattice_err, LatticeError, LatticeResult};
use num_traits::{FromPrimitive, Num, NumCast, ToPrimitive};

/// Physical type enum for array dimension domains and attribute values.
#[derive(Debug, Clone, Copy, PartialEq, PartialOrd, Eq, Hash)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
#[cfg_attr(feature = "serde", serde(rename_all = "lowercase"))]
pub enum PType {
    /// An 8-bit unsigned integer
    U8,
    /// A 16-bit unsigned integer
    U16,
    /// A 32-bit unsigned integer
    U32,
    /// A 64-bit unsigned integer
    U64,
    /// An 8-bit signed integer
    I8,
    /// A 16-bit signed integer
    I16,
    /// A 32-bit signed integer
    I32,
    /// A 64-bit signed integer
    I64,
    /// A 32-bit floating point number
    F32,
    /// A 64-bit floating point number
    F64,
}

/// A trait for native Rust types that correspond 1:1 to a [`PType`].
///
/// Beyond the usual numeric bounds this carries the coordinate-domain
/// operations the subarray partitioner dispatches on: splittability of a
/// closed interval, the splitting midpoint, point successors, span volume,
/// and space-tile arithmetic. Integer and floating-point domains implement
/// these differently; the partitioner stays generic.
pub trait NativeCellType:
    Send
    + Sync
    + Clone
    + Copy
    + Debug
    + Display
    + PartialEq
    + PartialOrd
    + Default
    + Num
    + NumCast
    + FromPrimitive
    + ToPrimitive
{
    /// The [`PType`] that corresponds to this native type.
    const PTYPE: PType;

    /// Whether this instance (`self`) is NaN.
    /// For integer types, this is always `false`.
    fn is_nan(self) -> bool;

    /// Whether the closed interval `[lo, hi]` can be split into two
    /// non-empty closed intervals.
    fn is_splittable(lo: Self, hi: Self) -> bool;

    /// The number of candidate splitting points inside `[lo, hi]`: the
    /// integer distance for integers, the ULP distance for floats.
    fn splittable_points(lo: Self, hi: Self) -> u128;

    /// The splitting midpoint of `[lo, hi]`. Integers use
    /// `lo + (hi - lo) / 2`; floats use `lo / 2 + hi / 2` so that large
    /// magnitudes cannot overflow.
    fn split_midpoint(lo: Self, hi: Self) -> Self;

    /// The smallest representable coordinate greater than `self`.
    fn next_point(self) -> Self;

    /// The coordinate span covered by `[lo, hi]`: the cell count for
    /// integers, the interval length for floats.
    fn span_volume(lo: Self, hi: Self) -> f64;

    /// The index of the space tile containing `v`, for tiles of `extent`
    /// anchored at `domain_lo`.
    fn tile_index(v: Self, domain_lo: Self, extent: Self) -> u64;

    /// The inclusive upper coordinate of tile `k - 1`, i.e. the largest
    /// coordinate strictly below the `k`-th tile boundary.
    fn tile_split_point(domain_lo: Self, extent: Self, k: u64) -> Self;
}

macro_rules! native_int_cell {
    ($T:ty, $ptype:tt) => {
        impl NativeCellType for $T {
            const PTYPE: PType = PType::$ptype;

            fn is_nan(self) -> bool {
                false
            }

            fn is_splittable(lo: Self, hi: Self) -> bool {
                hi > lo
            }

            fn splittable_points(lo: Self, hi: Self) -> u128 {
                (hi as i128).saturating_sub(lo as i128).max(0) as u128
            }

            fn split_midpoint(lo: Self, hi: Self) -> Self {
                ((lo as i128 + hi as i128) >> 1) as Self
            }

            fn next_point(self) -> Self {
                self.saturating_add(1)
            }

            fn span_volume(lo: Self, hi: Self) -> f64 {
                (hi as i128 - lo as i128) as f64 + 1.0
            }

            fn tile_index(v: Self, domain_lo: Self, extent: Self) -> u64 {
                ((v as i128 - domain_lo as i128) / extent as i128) as u64
            }

            fn tile_split_point(domain_lo: Self, extent: Self, k: u64) -> Self {
                (domain_lo as i128 + k as i128 * extent as i128 - 1) as Self
            }
        }
    };
}

macro_rules! native_float_cell {
    ($T:ty, $ptype:tt, $Bits:ty) => {
        impl NativeCellType for $T {
            const PTYPE: PType = PType::$ptype;

            fn is_nan(self) -> bool {
                <$T>::is_nan(self)
            }

            fn is_splittable(lo: Self, hi: Self) -> bool {
                hi > lo
            }

            fn splittable_points(lo: Self, hi: Self) -> u128 {
                if !(hi > lo) {
                    return 0;
                }
                const SIGN: $Bits = 1 << (<$Bits>::BITS - 1);
                // Monotone map from IEEE-754 bits to the unsigned line, so
                // the difference is the count of representable steps.
                let key = |x: $T| -> u128 {
                    let b = x.to_bits();
                    (if b & SIGN != 0 { !b } else { b | SIGN }) as u128
                };
                key(hi) - key(lo)
            }

            fn split_midpoint(lo: Self, hi: Self) -> Self {
                lo / 2.0 + hi / 2.0
            }

            fn next_point(self) -> Self {
                self.next_up()
            }

            fn span_volume(lo: Self, hi: Self) -> f64 {
                (hi - lo) as f64
            }

            fn tile_index(v: Self, domain_lo: Self, extent: Self) -> u64 {
                ((v - domain_lo) / extent).floor() as u64
            }

            fn tile_split_point(domain_lo: Self, extent: Self, k: u64) -> Self {
                (domain_lo + k as $T * extent).next_down()
            }
        }
    };
}

native_int_cell!(u8, U8);
native_int_cell!(u16, U16);
native_int_cell!(u32, U32);
native_int_cell!(u64, U64);
native_int_cell!(i8, I8);
native_int_cell!(i16, I16);
native_int_cell!(i32, I32);
native_int_cell!(i64, I64);
native_float_cell!(f32, F32, u32);
native_float_cell!(f64, F64, u64);

/// Macro to match over each PType, binding the corresponding native type
/// (from [`NativeCellType`]).
#[macro_export]
macro_rules! match_each_native_ptype {
    ($self:expr, | $_:tt $enc:ident | $($body:tt)*) => ({
        macro_rules! __with__ {( $_ $enc:ident ) => ( $($body)* )}
        use $crate::PType;
        match $self {
            PType::I8 => __with__! { i8 },
            PType::I16 => __with__! { i16 },
            PType::I32 => __with__! { i32 },
            PType::I64 => __with__! { i64 },
            PType::U8 => __with__! { u8 },
            PType::U16 => __with__! { u16 },
            PType::U32 => __with__! { u32 },
            PType::U64 => __with__! { u64 },
            PType::F32 => __with__! { f32 },
            PType::F64 => __with__! { f64 },
        }
    })
}

/// Macro to match over each integer PType, binding the corresponding native
/// type (from [`NativeCellType`]).
#[macro_export]
macro_rules! match_each_integer_ptype {
    ($self:expr, | $_:tt $enc:ident | $($body:tt)*) => ({
        macro_rules! __with__ {( $_ $enc:ident ) => ( $($body)* )}
        use $crate::PType;
        match $self {
            PType::I8 => __with__! { i8 },
            PType::I16 => __with__! { i16 },
            PType::I32 => __with__! { i32 },
            PType::I64 => __with__! { i64 },
            PType::U8 => __with__! { u8 },
            PType::U16 => __with__! { u16 },
            PType::U32 => __with__! { u32 },
            PType::U64 => __with__! { u64 },
            PType::F32 => panic!("Unsupported ptype f32"),
            PType::F64 => panic!("Unsupported ptype f64"),
        }
    })
}

/// Macro to match over each floating point PType, binding the corresponding
/// native type (from [`NativeCellType`]).
#[macro_export]
macro_rules! match_each_float_ptype {
    ($self:expr, | $_:tt $enc:ident | $($body:tt)*) => ({
        macro_rules! __with__ {( $_ $enc:ident ) => ( $($body)* )}
        use $crate::PType;
        match $self {
            PType::F32 => __with__! { f32 },
            PType::F64 => __with__! { f64 },
            _ => panic!("Unsupported ptype {}", $self),
        }
    })
}

impl PType {
    /// Returns `true` iff this PType is an unsigned integer type
    pub const fn is_unsigned_int(self) -> bool {
        matches!(self, Self::U8 | Self::U16 | Self::U32 | Self::U64)
    }

    /// Returns `true` iff this PType is a signed integer type
    pub const fn is_signed_int(self) -> bool {
        matches!(self, Self::I8 | Self::I16 | Self::I32 | Self::I64)
    }

    /// Returns `true` iff this PType is an integer type
    pub const fn is_int(self) -> bool {
        self.is_unsigned_int() || self.is_signed_int()
    }

    /// Returns `true` iff this PType is a floating point type
    pub const fn is_float(self) -> bool {
        matches!(self, Self::F32 | Self::F64)
    }

    /// Returns the number of bytes in this PType
    pub const fn byte_width(&self) -> usize {
        match_each_native_ptype!(self, |$T| std::mem::size_of::<$T>())
    }

    /// Returns the number of bits in this PType
    pub const fn bit_width(&self) -> usize {
        self.byte_width() * 8
    }
}

impl Display for PType {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::U8 => write!(f, "u8"),
            Self::U16 => write!(f, "u16"),
            Self::U32 => write!(f, "u32"),
            Self::U64 => write!(f, "u64"),
            Self::I8 => write!(f, "i8"),
            Self::I16 => write!(f, "i16"),
            Self::I32 => write!(f, "i32"),
            Self::I64 => write!(f, "i64"),
            Self::F32 => write!(f, "f32"),
            Self::F64 => write!(f, "f64"),
        }
    }
}

impl TryFrom<&str> for PType {
    type Error = LatticeError;

    fn try_from(value: &str) -> LatticeResult<Self> {
        match value {
            "u8" => Ok(Self::U8),
            "u16" => Ok(Self::U16),
            "u32" => Ok(Self::U32),
            "u64" => Ok(Self::U64),
            "i8" => Ok(Self::I8),
            "i16" => Ok(Self::I16),
            "i32" => Ok(Self::I32),
            "i64" => Ok(Self::I64),
            "f32" => Ok(Self::F32),
            "f64" => Ok(Self::F64),
            _ => Err(lattice_err!("Unknown ptype {}", value)),
        }
    }
}
