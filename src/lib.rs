//! Zbuf: reference-counted byte stores and elastic cursors over heap and
//! native memory.
//!
//! # Overview
//!
//! Zbuf is a binary byte buffer engine for code that serializes wire
//! formats, builds zero-copy message frames, or coordinates through shared
//! memory. One contract spans both backings: a region may live on the heap
//! (an owned allocation, or a window over a host object's fields) or in
//! off-heap native memory addressed by raw pointer, and the same read,
//! write, atomic and bulk operations work against either.
//!
//! # Core pieces
//!
//! - [`HeapStore`] / [`NativeStore`]: fixed-extent, reference-counted
//!   stores with plain, volatile, ordered and compare-and-swap access at
//!   arbitrary offsets. [`NullStore`] is the zero-capacity sentinel.
//! - [`Bytes`]: a cursor that reserves a store and adds read/write
//!   positions, limits, lenient reads and elastic growth that preserves
//!   cursor identity while the backing store is swapped for a larger one.
//! - [`hash`]: a fast 64-bit content hash with variants specialized for
//!   native and heap backings; [`compare`]: content equality with a
//!   vectorized fast path and zero-extension semantics.
//! - [`FieldGroups`]: named contiguous sub-regions of a host type, the
//!   basis for zero-copy binary views over structured objects.
//!
//! # Guarantees
//!
//! - Checked by default: every access validates bounds and lifecycle, and
//!   failures carry the offending offset and valid window.
//!   (`ZBUF_BOUNDS_CHECK_DISABLE` trades the checks for speed.)
//! - Single-writer: a buffer has one mutating thread; concurrent readers
//!   must go through the volatile/ordered/CAS family.
//! - Deterministic release: the holder of the last reservation frees the
//!   region, exactly once; later access fails instead of corrupting.
//!
//! # Example
//!
//! ```
//! use zbuf::{Bytes, RandomAccess, StreamInput, StreamOutput};
//!
//! # fn main() -> zbuf::Result<()> {
//! let mut buf = Bytes::elastic_with(64, 1 << 20)?;
//! buf.put_i32(0x0ABC)?;
//! buf.put_f64(2.5)?;
//! assert_eq!(buf.write_position(), 12);
//!
//! assert_eq!(buf.get_i32()?, 0x0ABC);
//! assert_eq!(buf.get_f64()?, 2.5);
//! # Ok(())
//! # }
//! ```

#![deny(unsafe_op_in_unsafe_fn)]
#![warn(missing_docs)]
#![warn(clippy::pedantic)]
#![allow(clippy::missing_errors_doc)]
#![allow(clippy::missing_panics_doc)]
#![allow(clippy::module_name_repetitions)]
#![allow(clippy::cast_possible_truncation)]
#![allow(clippy::cast_possible_wrap)]
#![allow(clippy::cast_sign_loss)]

pub mod compare;
pub mod config;
mod cursor;
mod error;
pub mod fields;
pub mod hash;
pub mod mem;
mod refcount;
mod store;
pub mod test_utils;
mod traits;

pub use cursor::{Bytes, UncheckedInput};
pub use error::{BytesError, Result};
pub use fields::{FieldDescriptor, FieldGroups, FieldGroupsBuilder, GroupLayout};
pub use refcount::{OwnerToken, RefCount};
pub use store::{HeapStore, NativeStore, NullStore};
pub use traits::{
    byte_to_bool, pad_offset, ByteStore, RandomAccess, RandomInput, RandomOutput, StreamCommon,
    StreamInput, StreamOutput, LARGE_MEMORY_BLOCK, MAX_HEAP_CAPACITY, MAX_NATIVE_CAPACITY,
};
