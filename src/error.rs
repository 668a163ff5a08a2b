//! Errors reported for caller-supplied input.
//!
//! Only input that crosses the crate boundary (regions and buffers) is reported as a
//! `WorldError`. Broken internal invariants panic instead.

use cgmath::{Point3, Vector3};

/// Errors returned by bulk world reads and writes.
#[derive(Clone, Debug, PartialEq, Eq, thiserror::Error)]
pub enum WorldError {
    /// A region whose end lies below its minimum on some axis.
    #[error("region end {end:?} is below region min {min:?}")]
    InvalidRegion {
        /// Requested minimum.
        min: Point3<i32>,
        /// Requested end.
        end: Point3<i32>,
    },

    /// A buffer whose size doesn't match the region it is used with.
    #[error("buffer holds {actual} blocks but the region has extent {expected:?}")]
    BufferSizeMismatch {
        /// Extent the buffer should have had.
        expected: Vector3<i32>,
        /// Number of blocks the buffer actually holds.
        actual: usize,
    },

    /// A region that can't fit inside the largest world the tree can represent.
    #[error("region {min:?}..{end:?} is outside the representable world")]
    RegionOutOfRange {
        /// Requested minimum.
        min: Point3<i32>,
        /// Requested end.
        end: Point3<i32>,
    },
}
