//! # MBR Key Algebra
//!
//! The key of every tree entry is a minimum bounding rectangle: an
//! axis-aligned hyper-rectangle in D-space stored as a flat coordinate
//! array `[lo_0, .., lo_{D-1}, hi_0, .., hi_{D-1}]`, lower corner first.
//!
//! MBRs are always read out of block memory by value and returned by
//! value: they are a handful of scalars and copying them is cheaper than
//! any scheme that hands out references into mapped storage.
//!
//! Dimension mismatches between two MBRs are programmer errors and abort
//! via `assert!`; the public index boundary validates dimensions before
//! any algebra runs.

use std::fmt;
use std::ops::{Mul, Sub};

use smallvec::SmallVec;

/// Numeric coordinate type for MBR corners, chosen at index
/// instantiation. Implemented for the common floating-point and integral
/// widths; the byte codec is little-endian to match the on-disk layout.
pub trait Coordinate:
    Copy
    + PartialOrd
    + PartialEq
    + Sub<Output = Self>
    + Mul<Output = Self>
    + fmt::Debug
    + fmt::Display
    + 'static
{
    /// Encoded width in bytes.
    const SIZE: usize;

    fn read_le(bytes: &[u8]) -> Self;
    fn write_le(self, bytes: &mut [u8]);
}

macro_rules! impl_coordinate {
    ($($t:ty),* $(,)?) => {$(
        impl Coordinate for $t {
            const SIZE: usize = std::mem::size_of::<$t>();

            fn read_le(bytes: &[u8]) -> Self {
                let mut buf = [0u8; std::mem::size_of::<$t>()];
                buf.copy_from_slice(&bytes[..std::mem::size_of::<$t>()]);
                <$t>::from_le_bytes(buf)
            }

            fn write_le(self, bytes: &mut [u8]) {
                bytes[..std::mem::size_of::<$t>()].copy_from_slice(&self.to_le_bytes());
            }
        }
    )*};
}

impl_coordinate!(f32, f64, i32, i64, u32, u64);

/// A minimum bounding rectangle over `D` axes. Up to four dimensions the
/// coordinates live inline without heap allocation.
#[derive(Debug, Clone, PartialEq)]
pub struct Mbr<C: Coordinate> {
    coords: SmallVec<[C; 8]>,
}

impl<C: Coordinate> Mbr<C> {
    /// Builds an MBR from a flat `[lo.., hi..]` coordinate array.
    pub fn new(coords: &[C]) -> Self {
        assert!(
            !coords.is_empty() && coords.len() % 2 == 0,
            "MBR needs a non-empty, even-length coordinate array, got {}",
            coords.len()
        );
        Self {
            coords: SmallVec::from_slice(coords),
        }
    }

    /// Number of spatial axes.
    pub fn dims(&self) -> usize {
        self.coords.len() / 2
    }

    pub fn lo(&self, axis: usize) -> C {
        assert!(axis < self.dims());
        self.coords[axis]
    }

    pub fn hi(&self, axis: usize) -> C {
        assert!(axis < self.dims());
        self.coords[self.dims() + axis]
    }

    pub fn coords(&self) -> &[C] {
        &self.coords
    }

    /// Hyper-volume of the rectangle. A zero-width axis makes it zero.
    pub fn area(&self) -> C {
        let d = self.dims();
        let mut area = self.hi(0) - self.lo(0);
        for axis in 1..d {
            area = area * (self.hi(axis) - self.lo(axis));
        }
        area
    }

    /// Axis-wise union with `other`, in place.
    pub fn enlarge(&mut self, other: &Mbr<C>) {
        assert_eq!(self.dims(), other.dims(), "MBR dimension mismatch");
        let d = self.dims();
        for axis in 0..d {
            if other.coords[axis] < self.coords[axis] {
                self.coords[axis] = other.coords[axis];
            }
            if other.coords[d + axis] > self.coords[d + axis] {
                self.coords[d + axis] = other.coords[d + axis];
            }
        }
    }

    /// Axis-wise union with `other`, as a new MBR.
    pub fn union(&self, other: &Mbr<C>) -> Mbr<C> {
        let mut out = self.clone();
        out.enlarge(other);
        out
    }

    /// How much `area(self)` grows when extended to cover `other`:
    /// `area(union(self, other)) - area(self)`.
    pub fn enlargement_cost(&self, other: &Mbr<C>) -> C {
        self.union(other).area() - self.area()
    }

    /// True when the two rectangles intersect (shared boundary counts).
    pub fn overlaps(&self, other: &Mbr<C>) -> bool {
        assert_eq!(self.dims(), other.dims(), "MBR dimension mismatch");
        let d = self.dims();
        for axis in 0..d {
            let a_lo = self.coords[axis];
            let a_hi = self.coords[d + axis];
            let b_lo = other.coords[axis];
            let b_hi = other.coords[d + axis];
            if !(a_lo <= b_hi && a_hi >= b_lo) {
                return false;
            }
        }
        true
    }

    /// True when `inner` lies fully inside `self` (boundaries may touch).
    pub fn contains(&self, inner: &Mbr<C>) -> bool {
        assert_eq!(self.dims(), inner.dims(), "MBR dimension mismatch");
        let d = self.dims();
        for axis in 0..d {
            if self.coords[axis] > inner.coords[axis] {
                return false;
            }
            if self.coords[d + axis] < inner.coords[d + axis] {
                return false;
            }
        }
        true
    }

    /// Encoded byte width of an MBR with `dimensions` axes.
    pub fn byte_len(dimensions: usize) -> usize {
        2 * dimensions * C::SIZE
    }

    /// Decodes an MBR from its packed little-endian slot representation.
    pub fn read_from(bytes: &[u8], dimensions: usize) -> Mbr<C> {
        let len = Self::byte_len(dimensions);
        assert!(
            bytes.len() >= len,
            "slot too small for MBR: {} < {}",
            bytes.len(),
            len
        );
        let mut coords: SmallVec<[C; 8]> = SmallVec::with_capacity(2 * dimensions);
        for i in 0..2 * dimensions {
            coords.push(C::read_le(&bytes[i * C::SIZE..]));
        }
        Mbr { coords }
    }

    /// Encodes the MBR into its packed little-endian slot representation.
    pub fn write_to(&self, bytes: &mut [u8]) {
        let len = Self::byte_len(self.dims());
        assert!(
            bytes.len() >= len,
            "slot too small for MBR: {} < {}",
            bytes.len(),
            len
        );
        for (i, &c) in self.coords.iter().enumerate() {
            c.write_le(&mut bytes[i * C::SIZE..]);
        }
    }
}

impl<C: Coordinate> fmt::Display for Mbr<C> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let d = self.dims();
        write!(f, "([")?;
        for axis in 0..d {
            if axis > 0 {
                write!(f, ", ")?;
            }
            write!(f, "{}", self.lo(axis))?;
        }
        write!(f, "], [")?;
        for axis in 0..d {
            if axis > 0 {
                write!(f, ", ")?;
            }
            write!(f, "{}", self.hi(axis))?;
        }
        write!(f, "])")
    }
}
