//! Layout descriptors and extent bookkeeping.
//!
//! The `Shape` markers fix a buffer's dimensionality at compile time,
//! which is what lets allocation and transfer signatures take exactly
//! the right number of extents. [`Extents`] is the uniform runtime
//! record behind all three shapes: linear buffers are stored as
//! `width x 1 x 1`, planes as `width x height x 1`.

mod sealed {
    pub trait Sealed {}
}

/// Dimensionality and padding shape of an allocation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum MemoryLayout {
    /// Contiguous run of elements, no pitch concept.
    Linear,
    /// Rows separated by a pitch chosen at allocation time.
    Pitched2D,
    /// Slabs of pitched rows.
    Pitched3D,
}

impl std::fmt::Display for MemoryLayout {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(match self {
            MemoryLayout::Linear => "linear",
            MemoryLayout::Pitched2D => "pitched-2d",
            MemoryLayout::Pitched3D => "pitched-3d",
        })
    }
}

/// Compile-time tag of a layout.
///
/// The set is closed: exactly [`Linear`], [`Pitched2D`] and
/// [`Pitched3D`] implement it.
pub trait Shape: sealed::Sealed + Copy + Default + Send + Sync + std::fmt::Debug + 'static {
    /// Runtime layout this tag denotes.
    const LAYOUT: MemoryLayout;
}

/// One-dimensional contiguous layout.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct Linear;

/// Two-dimensional layout with a per-row pitch.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct Pitched2D;

/// Three-dimensional layout with per-row pitch and row-grouped slabs.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct Pitched3D;

impl sealed::Sealed for Linear {}
impl sealed::Sealed for Pitched2D {}
impl sealed::Sealed for Pitched3D {}

impl Shape for Linear {
    const LAYOUT: MemoryLayout = MemoryLayout::Linear;
}

impl Shape for Pitched2D {
    const LAYOUT: MemoryLayout = MemoryLayout::Pitched2D;
}

impl Shape for Pitched3D {
    const LAYOUT: MemoryLayout = MemoryLayout::Pitched3D;
}

/// Shapes that carry a pitch.
pub trait Pitched: Shape {}

impl Pitched for Pitched2D {}
impl Pitched for Pitched3D {}

/// Logical size of an allocation, in elements per axis.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Extents {
    pub(crate) width: usize,
    pub(crate) height: usize,
    pub(crate) depth: usize,
}

impl Extents {
    pub(crate) const EMPTY: Extents = Extents {
        width: 0,
        height: 0,
        depth: 0,
    };

    pub(crate) const fn linear(len: usize) -> Extents {
        Extents {
            width: len,
            height: 1,
            depth: 1,
        }
    }

    pub(crate) const fn plane(width: usize, height: usize) -> Extents {
        Extents {
            width,
            height,
            depth: 1,
        }
    }

    pub(crate) const fn volume(width: usize, height: usize, depth: usize) -> Extents {
        Extents {
            width,
            height,
            depth,
        }
    }

    /// Elements per row.
    #[inline]
    pub const fn width(&self) -> usize {
        self.width
    }

    /// Rows per slab.
    #[inline]
    pub const fn height(&self) -> usize {
        self.height
    }

    /// Number of slabs.
    #[inline]
    pub const fn depth(&self) -> usize {
        self.depth
    }

    /// Total element count.
    #[inline]
    pub const fn len(&self) -> usize {
        self.width * self.height * self.depth
    }

    /// Returns `true` when any axis is zero.
    #[inline]
    pub const fn is_empty(&self) -> bool {
        self.width == 0 || self.height == 0 || self.depth == 0
    }

    /// Total element count, or `None` on overflow.
    pub(crate) fn checked_len(&self) -> Option<usize> {
        self.width
            .checked_mul(self.height)?
            .checked_mul(self.depth)
    }
}
