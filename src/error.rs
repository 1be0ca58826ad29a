//! Error types for buffer, store and cursor operations.
//!
//! The taxonomy is deliberately small: every fallible operation in the crate
//! reports one of the variants below, and bounds failures always carry the
//! offending offset together with the valid window so callers can log a
//! useful message without re-deriving state.

use thiserror::Error;

/// Crate-wide result alias.
pub type Result<T> = std::result::Result<T, BytesError>;

/// Errors raised by stores and cursors.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum BytesError {
    /// The store's reference count has dropped to zero; the backing memory
    /// is gone (or about to be) and no further access is permitted.
    #[error("store has been released")]
    Released,

    /// An access at `offset` over `advance` bytes falls outside the valid
    /// window `[low, high)`.
    #[error("offset {offset} + advance {advance} overflows range [{low}, {high})")]
    Overflow {
        /// Logical offset of the attempted access.
        offset: u64,
        /// Width of the attempted access in bytes.
        advance: u64,
        /// Inclusive lower bound of the valid window.
        low: u64,
        /// Exclusive upper bound of the valid window.
        high: u64,
    },

    /// A bulk operation index fell outside `[low, high)`.
    #[error("index {index} is out of range [{low}, {high})")]
    OutOfRange {
        /// The offending index.
        index: u64,
        /// Inclusive lower bound.
        low: u64,
        /// Exclusive upper bound.
        high: u64,
    },

    /// The operation is not supported by this store kind (for example a raw
    /// address query on a heap store, or any memory access on the null
    /// store).
    #[error("unsupported operation: {0}")]
    Unsupported(&'static str),

    /// A caller-supplied argument was invalid (negative length, mismatched
    /// region sizes, value out of the representable range).
    #[error("invalid argument: {0}")]
    InvalidArgument(String),

    /// The native allocator could not satisfy a request.
    #[error("native allocation of {size} bytes failed")]
    AllocationFailed {
        /// Requested allocation size in bytes.
        size: u64,
    },

    /// An elastic cursor could not grow to `requested` bytes because the
    /// request exceeds its fixed `capacity`. The original store is left
    /// untouched.
    #[error("requested size {requested} exceeds capacity {capacity}")]
    GrowthFailed {
        /// The size the write needed.
        requested: u64,
        /// The cursor's hard capacity limit.
        capacity: u64,
    },
}

impl BytesError {
    /// Bounds error for a single access of `advance` bytes at `offset`
    /// within `[low, high)`.
    #[must_use]
    pub fn overflow(offset: u64, advance: u64, low: u64, high: u64) -> Self {
        Self::Overflow {
            offset,
            advance,
            low,
            high,
        }
    }

    /// Range error for a bulk-operation index.
    #[must_use]
    pub fn out_of_range(index: u64, low: u64, high: u64) -> Self {
        Self::OutOfRange { index, low, high }
    }

    /// True if this error reports an out-of-bounds access (either form).
    #[must_use]
    pub fn is_bounds(&self) -> bool {
        matches!(self, Self::Overflow { .. } | Self::OutOfRange { .. })
    }
}
