//! The `Bytes` cursor: sequential access with elastic growth.
//!
//! A cursor reserves one reference on an underlying
//! [`ByteStore`](crate::traits::ByteStore) and layers the read/write
//! pointer discipline on top of it:
//!
//! ```text
//! start <= read_position <= write_position <= write_limit <= capacity
//! ```
//!
//! The readable window is derived: the read limit *is* the write position,
//! so writing advances what a reader may consume. Elastic cursors replace
//! their store with a larger one when a write crosses the store's safe
//! limit; the cursor's identity (and every pointer) survives the swap.
//!
//! Cursors are single-writer. A debug assertion trips when pointer
//! mutations arrive from two threads (disable with
//! `ZBUF_SINGLE_THREADED_CHECK_DISABLE`).

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use tracing::{debug, warn};

use crate::config;
use crate::error::{BytesError, Result};
use crate::mem;
use crate::refcount::OwnerToken;
use crate::store::{HeapStore, NativeStore};
use crate::traits::{
    ByteStore, RandomAccess, RandomInput, RandomOutput, StreamCommon, StreamInput, StreamOutput,
    COPY_CHUNK, LARGE_MEMORY_BLOCK, MAX_HEAP_CAPACITY, MAX_NATIVE_CAPACITY,
};

static NEXT_CURSOR_ID: AtomicU64 = AtomicU64::new(1);
static NEXT_THREAD_ID: AtomicU64 = AtomicU64::new(1);

thread_local! {
    static THREAD_ID: u64 = NEXT_THREAD_ID.fetch_add(1, Ordering::Relaxed);
}

fn current_thread_id() -> u64 {
    THREAD_ID.with(|id| *id)
}

/// How a cursor reacts when a write crosses its store's safe limit.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Growth {
    /// Fail with a bounds error.
    Fixed,
    /// Replace the store with a larger heap allocation, falling back to
    /// native memory past [`MAX_HEAP_CAPACITY`].
    ElasticHeap,
    /// Replace the store with a larger native allocation.
    ElasticNative,
}

/// Debug-build guard against concurrent pointer mutation.
#[derive(Debug, Default)]
struct WriterCheck {
    owner: AtomicU64,
}

impl WriterCheck {
    #[inline]
    fn assert_single_writer(&self) {
        if !cfg!(debug_assertions) || config::single_threaded_check_disabled() {
            return;
        }
        let me = current_thread_id();
        if let Err(cur) = self
            .owner
            .compare_exchange(0, me, Ordering::Relaxed, Ordering::Relaxed)
        {
            assert!(
                cur == me,
                "cursor mutated from two threads (first {cur}, now {me}); \
                 cursors are single-writer"
            );
        }
    }
}

/// A sequential cursor over a reserved byte store.
///
/// Create one with [`Bytes::wrap`] (fixed, on-heap),
/// [`Bytes::wrap_elastic`], [`Bytes::elastic`] /
/// [`Bytes::elastic_with`] (native, growing) or
/// [`Bytes::lazy_fixed`]. Dropping the cursor releases its reservation;
/// the terminal release frees the backing region.
pub struct Bytes {
    store: Arc<dyn ByteStore>,
    owner: OwnerToken,
    name: String,
    read_position: u64,
    write_position: u64,
    write_limit: u64,
    capacity: u64,
    lenient: bool,
    mode: Growth,
    writer_check: WriterCheck,
}

impl Bytes {
    fn new(store: Arc<dyn ByteStore>, mode: Growth, capacity: u64) -> Result<Self> {
        let owner = OwnerToken::new("cursor");
        store.reserve_transfer(&OwnerToken::INIT, &owner)?;
        let write_limit = capacity;
        Ok(Self {
            store,
            owner,
            name: format!("bytes-{}", NEXT_CURSOR_ID.fetch_add(1, Ordering::Relaxed)),
            read_position: 0,
            write_position: 0,
            write_limit,
            capacity,
            lenient: false,
            mode,
            writer_check: WriterCheck::default(),
        })
    }

    /// A fixed cursor over an owned byte vector (on-heap store).
    pub fn wrap(data: Vec<u8>) -> Result<Self> {
        let store = Arc::new(HeapStore::wrap(data));
        let capacity = store.capacity();
        Self::new(store, Growth::Fixed, capacity)
    }

    /// An elastic cursor seeded with an owned byte vector. Growth beyond
    /// [`MAX_HEAP_CAPACITY`] falls back to native memory.
    pub fn wrap_elastic(data: Vec<u8>) -> Result<Self> {
        let store = Arc::new(HeapStore::wrap(data));
        Self::new(store, Growth::ElasticHeap, MAX_NATIVE_CAPACITY)
    }

    /// An elastic native cursor with default sizing.
    pub fn elastic() -> Result<Self> {
        Self::elastic_with(256, MAX_NATIVE_CAPACITY)
    }

    /// An elastic native cursor with `init_size` allocated bytes and a hard
    /// `capacity` limit. Capacities past [`MAX_NATIVE_CAPACITY`] are capped
    /// with a warning.
    pub fn elastic_with(init_size: u64, capacity: u64) -> Result<Self> {
        let capacity = if capacity > MAX_NATIVE_CAPACITY {
            warn!(
                requested = capacity,
                capped = MAX_NATIVE_CAPACITY,
                "capacity over the supported maximum, capping"
            );
            MAX_NATIVE_CAPACITY
        } else {
            capacity
        };
        let store = Arc::new(NativeStore::elastic(init_size)?);
        Self::new(store, Growth::ElasticNative, capacity)
    }

    /// A fixed cursor over lazily zeroed native memory.
    pub fn lazy_fixed(capacity: u64) -> Result<Self> {
        let store = Arc::new(NativeStore::lazy_fixed_capacity(capacity)?);
        Self::new(store, Growth::Fixed, capacity)
    }

    /// A fixed cursor over an existing store whose initial reservation the
    /// caller hands over.
    pub fn from_store(store: Arc<dyn ByteStore>) -> Result<Self> {
        let capacity = store.capacity();
        Self::new(store, Growth::Fixed, capacity)
    }

    /// The cursor's generated debug name (`bytes-N`).
    #[must_use]
    pub fn name(&self) -> &str {
        &self.name
    }

    /// The store this cursor currently reserves.
    #[must_use]
    pub fn store(&self) -> &Arc<dyn ByteStore> {
        &self.store
    }

    /// True if a write past the safe limit grows the store instead of
    /// failing.
    #[must_use]
    pub fn is_elastic(&self) -> bool {
        self.mode != Growth::Fixed
    }

    /// An unchecked plain-read view over the current store, or `None` when
    /// the backing exposes no stable pointer.
    #[must_use]
    pub fn unchecked_input(&self) -> Option<UncheckedInput<'_>> {
        self.store.read_view_ptr(0).map(|base| UncheckedInput {
            base,
            _cursor: std::marker::PhantomData,
        })
    }

    /// Atomically adds `diff` to the 32-bit slot at `offset`, returning the
    /// post-value.
    pub fn add_and_get_i32(&self, offset: u64, diff: i32) -> Result<i32> {
        self.write_check_offset(offset, 4)?;
        self.store.add_and_get_i32(offset, diff)
    }

    /// Atomically adds `diff` to the 64-bit slot at `offset`.
    pub fn add_and_get_i64(&self, offset: u64, diff: i64) -> Result<i64> {
        self.write_check_offset(offset, 8)?;
        self.store.add_and_get_i64(offset, diff)
    }

    /// Atomically adds `diff` to the 32-bit float slot at `offset`.
    pub fn add_and_get_f32(&self, offset: u64, diff: f32) -> Result<f32> {
        self.write_check_offset(offset, 4)?;
        self.store.add_and_get_f32(offset, diff)
    }

    /// Atomically adds `diff` to the 64-bit float slot at `offset`.
    pub fn add_and_get_f64(&self, offset: u64, diff: f64) -> Result<f64> {
        self.write_check_offset(offset, 8)?;
        self.store.add_and_get_f64(offset, diff)
    }

    /// Bulk write at an explicit offset, growing an elastic cursor first
    /// when the range ends past the store's safe limit.
    pub fn write_from_at(&mut self, offset: u64, src: &[u8]) -> Result<()> {
        let len = src.len() as u64;
        self.ensure_capacity(offset + len)?;
        self.write_check_offset(offset, len)?;
        let mut begin = 0usize;
        while begin < src.len() {
            let copy = (src.len() - begin).min(COPY_CHUNK);
            self.store
                .write_from(offset + begin as u64, &src[begin..begin + copy])?;
            begin += copy;
        }
        Ok(())
    }

    /// Overlap-safe move that grows an elastic cursor when `to + len` ends
    /// past the store's safe limit.
    pub fn move_range_grow(&mut self, from: u64, to: u64, len: u64) -> Result<()> {
        if len == 0 {
            return Ok(());
        }
        self.writer_check.assert_single_writer();
        self.ensure_capacity(to + len)?;
        self.store.move_range(from, to, len)
    }

    /// Bounds check for an offset write of `advance` bytes.
    fn write_check_offset(&self, offset: u64, advance: u64) -> Result<()> {
        if config::cursor_bounds_check_disabled() {
            return Ok(());
        }
        let inside = offset >= self.start()
            && offset
                .checked_add(advance)
                .is_some_and(|end| end <= self.write_limit);
        if !inside {
            return Err(BytesError::overflow(
                offset,
                advance,
                self.start(),
                self.write_limit,
            ));
        }
        Ok(())
    }

    /// Bounds check for an offset read of `advance` bytes against the
    /// given window (`write_limit` for random access, the derived read
    /// limit for sequential access).
    fn read_check_offset(&self, offset: u64, advance: u64, limit: u64) -> Result<()> {
        if config::cursor_bounds_check_disabled() {
            return Ok(());
        }
        let inside = offset >= self.start()
            && offset.checked_add(advance).is_some_and(|end| end <= limit);
        if !inside {
            return Err(BytesError::overflow(offset, advance, self.start(), limit));
        }
        Ok(())
    }

    /// Claims `advance` writable bytes: checks the limit, grows an elastic
    /// store past its safe limit, advances the write position and returns
    /// the old one.
    fn write_advance_offset(&mut self, advance: u64) -> Result<u64> {
        self.writer_check.assert_single_writer();
        let old = self.write_position;
        let hi = old + advance;
        if !config::cursor_bounds_check_disabled() && hi > self.write_limit {
            return Err(BytesError::overflow(old, advance, self.start(), self.write_limit));
        }
        if hi > self.store.safe_limit() {
            match self.mode {
                Growth::Fixed => {
                    return Err(BytesError::overflow(old, advance, self.start(), self.store.size()))
                }
                Growth::ElasticHeap | Growth::ElasticNative => self.resize(hi)?,
            }
        }
        self.write_position = hi;
        Ok(old)
    }

    /// Claims `advance` readable bytes, or signals a lenient zero-fill by
    /// returning `None`.
    fn read_advance_offset(&mut self, advance: u64) -> Result<Option<u64>> {
        self.writer_check.assert_single_writer();
        let old = self.read_position;
        let limit = self.read_limit();
        if !config::cursor_bounds_check_disabled() && old + advance > limit {
            if self.lenient {
                self.read_position = limit;
                return Ok(None);
            }
            return Err(BytesError::overflow(old, advance, self.start(), limit));
        }
        self.read_position = old + advance;
        Ok(Some(old))
    }

    /// Replaces the store with one of at least `requested` bytes.
    fn resize(&mut self, requested: u64) -> Result<()> {
        self.store.ensure_not_released()?;
        if requested > self.capacity {
            return Err(BytesError::GrowthFailed {
                requested,
                capacity: self.capacity,
            });
        }
        let size = self.store.size();
        let immutable_empty = self.store.capacity() == 0;
        if requested <= size && !immutable_empty {
            return Ok(());
        }

        let mut grow = (requested + 7).max(size.saturating_mul(3) / 2 + 32);
        if self.store.is_native() || grow > MAX_HEAP_CAPACITY {
            grow = mem::page_align(grow, mem::page_size());
        } else {
            grow &= !0x7;
        }
        let new_size = grow.min(self.capacity);

        if new_size >= LARGE_MEMORY_BLOCK && size > 0 {
            warn!(
                cursor = %self.name,
                size_kib = size >> 10,
                need_kib = (new_size - size) >> 10,
                new_size_kib = new_size >> 10,
                "resizing buffer"
            );
        }

        let new_store: Arc<dyn ByteStore> =
            if self.mode == Growth::ElasticNative || new_size > MAX_HEAP_CAPACITY {
                Arc::new(NativeStore::elastic(new_size)?)
            } else {
                Arc::new(HeapStore::with_capacity(new_size as usize))
            };
        new_store.reserve_transfer(&OwnerToken::INIT, &self.owner)?;
        self.store.copy_to(&*new_store)?;

        let old = std::mem::replace(&mut self.store, new_store);
        if let Err(e) = old.release(&self.owner) {
            debug!(cursor = %self.name, error = %e, "old store release after growth");
        }
        Ok(())
    }
}

impl Drop for Bytes {
    fn drop(&mut self) {
        if let Err(e) = self.store.release(&self.owner) {
            warn!(cursor = %self.name, error = %e, "release on drop failed");
        }
    }
}

impl std::fmt::Debug for Bytes {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Bytes")
            .field("name", &self.name)
            .field("read_position", &self.read_position)
            .field("write_position", &self.write_position)
            .field("write_limit", &self.write_limit)
            .field("capacity", &self.capacity)
            .field("elastic", &self.is_elastic())
            .finish_non_exhaustive()
    }
}

impl RandomAccess for Bytes {
    fn capacity(&self) -> u64 {
        self.capacity
    }

    fn size(&self) -> u64 {
        self.store.size()
    }

    fn safe_limit(&self) -> u64 {
        self.store.safe_limit()
    }

    fn read_position(&self) -> u64 {
        self.read_position
    }

    fn write_position(&self) -> u64 {
        self.write_position
    }

    fn read_limit(&self) -> u64 {
        // The reader may not pass the writer.
        self.write_position
    }

    fn write_limit(&self) -> u64 {
        self.write_limit
    }

    fn is_heap(&self) -> bool {
        self.store.is_heap()
    }

    fn is_native(&self) -> bool {
        self.store.is_native()
    }

    fn address_for_read(&self, offset: u64) -> Result<*const u8> {
        self.read_check_offset(offset, 0, self.write_limit)?;
        self.store.address_for_read(offset)
    }

    fn address_for_write(&self, offset: u64) -> Result<*mut u8> {
        self.write_check_offset(offset, 0)?;
        self.store.address_for_write(offset)
    }

    fn ensure_not_released(&self) -> Result<()> {
        self.store.ensure_not_released()
    }
}

impl RandomInput for Bytes {
    fn read_u8(&self, offset: u64) -> Result<u8> {
        self.read_check_offset(offset, 1, self.write_limit)?;
        self.store.read_u8(offset)
    }

    fn read_i16(&self, offset: u64) -> Result<i16> {
        self.read_check_offset(offset, 2, self.write_limit)?;
        self.store.read_i16(offset)
    }

    fn read_i32(&self, offset: u64) -> Result<i32> {
        self.read_check_offset(offset, 4, self.write_limit)?;
        self.store.read_i32(offset)
    }

    fn read_i64(&self, offset: u64) -> Result<i64> {
        self.read_check_offset(offset, 8, self.write_limit)?;
        self.store.read_i64(offset)
    }

    fn read_f32(&self, offset: u64) -> Result<f32> {
        self.read_check_offset(offset, 4, self.write_limit)?;
        self.store.read_f32(offset)
    }

    fn read_f64(&self, offset: u64) -> Result<f64> {
        self.read_check_offset(offset, 8, self.write_limit)?;
        self.store.read_f64(offset)
    }

    fn read_u8_volatile(&self, offset: u64) -> Result<u8> {
        self.read_check_offset(offset, 1, self.write_limit)?;
        self.store.read_u8_volatile(offset)
    }

    fn read_i16_volatile(&self, offset: u64) -> Result<i16> {
        self.read_check_offset(offset, 2, self.write_limit)?;
        self.store.read_i16_volatile(offset)
    }

    fn read_i32_volatile(&self, offset: u64) -> Result<i32> {
        self.read_check_offset(offset, 4, self.write_limit)?;
        self.store.read_i32_volatile(offset)
    }

    fn read_i64_volatile(&self, offset: u64) -> Result<i64> {
        self.read_check_offset(offset, 8, self.write_limit)?;
        self.store.read_i64_volatile(offset)
    }

    fn read_into(&self, offset: u64, dst: &mut [u8]) -> Result<Option<usize>> {
        let left = self.read_limit().saturating_sub(offset).min(dst.len() as u64) as usize;
        if left == 0 {
            return Ok(None);
        }
        self.store.read_into(offset, &mut dst[..left])
    }

    unsafe fn native_read(&self, offset: u64, address: *mut u8, len: u64) -> Result<()> {
        self.read_check_offset(offset, len, self.write_limit)?;
        // SAFETY: forwarded caller contract.
        unsafe { self.store.native_read(offset, address, len) }
    }

    fn read_view_ptr(&self, offset: u64) -> Option<*const u8> {
        self.store.read_view_ptr(offset)
    }
}

impl RandomOutput for Bytes {
    fn write_u8(&self, offset: u64, v: u8) -> Result<()> {
        self.write_check_offset(offset, 1)?;
        self.store.write_u8(offset, v)
    }

    fn write_i16(&self, offset: u64, v: i16) -> Result<()> {
        self.write_check_offset(offset, 2)?;
        self.store.write_i16(offset, v)
    }

    fn write_i32(&self, offset: u64, v: i32) -> Result<()> {
        self.write_check_offset(offset, 4)?;
        self.store.write_i32(offset, v)
    }

    fn write_i64(&self, offset: u64, v: i64) -> Result<()> {
        self.write_check_offset(offset, 8)?;
        self.store.write_i64(offset, v)
    }

    fn write_f32(&self, offset: u64, v: f32) -> Result<()> {
        self.write_check_offset(offset, 4)?;
        self.store.write_f32(offset, v)
    }

    fn write_f64(&self, offset: u64, v: f64) -> Result<()> {
        self.write_check_offset(offset, 8)?;
        self.store.write_f64(offset, v)
    }

    fn write_i32_ordered(&self, offset: u64, v: i32) -> Result<()> {
        self.write_check_offset(offset, 4)?;
        self.store.write_i32_ordered(offset, v)
    }

    fn write_i64_ordered(&self, offset: u64, v: i64) -> Result<()> {
        self.write_check_offset(offset, 8)?;
        self.store.write_i64_ordered(offset, v)
    }

    fn write_i32_volatile(&self, offset: u64, v: i32) -> Result<()> {
        self.write_check_offset(offset, 4)?;
        self.store.write_i32_volatile(offset, v)
    }

    fn write_i64_volatile(&self, offset: u64, v: i64) -> Result<()> {
        self.write_check_offset(offset, 8)?;
        self.store.write_i64_volatile(offset, v)
    }

    fn write_from(&self, offset: u64, src: &[u8]) -> Result<()> {
        self.write_check_offset(offset, src.len() as u64)?;
        self.store.write_from(offset, src)
    }

    fn compare_and_swap_i32(&self, offset: u64, expected: i32, value: i32) -> Result<bool> {
        self.write_check_offset(offset, 4)?;
        self.store.compare_and_swap_i32(offset, expected, value)
    }

    fn compare_and_swap_i64(&self, offset: u64, expected: i64, value: i64) -> Result<bool> {
        self.write_check_offset(offset, 8)?;
        self.store.compare_and_swap_i64(offset, expected, value)
    }

    fn test_and_set_i32(&self, offset: u64, expected: i32, value: i32) -> Result<()> {
        self.write_check_offset(offset, 4)?;
        self.store.test_and_set_i32(offset, expected, value)
    }

    fn test_and_set_i64(&self, offset: u64, expected: i64, value: i64) -> Result<()> {
        self.write_check_offset(offset, 8)?;
        self.store.test_and_set_i64(offset, expected, value)
    }

    fn zero_out(&self, begin: u64, end: u64) -> Result<()> {
        self.store.zero_out(begin, end)
    }

    unsafe fn native_write(&self, address: *const u8, offset: u64, len: u64) -> Result<()> {
        self.write_check_offset(offset, len)?;
        // SAFETY: forwarded caller contract.
        unsafe { self.store.native_write(address, offset, len) }
    }

    fn move_range(&self, from: u64, to: u64, len: u64) -> Result<()> {
        self.store.move_range(from, to, len)
    }
}

impl StreamCommon for Bytes {
    fn clear(&mut self) -> Result<()> {
        let start = self.start();
        if self.read_position == start
            && self.write_position == start
            && self.write_limit == self.capacity
        {
            return Ok(());
        }
        self.writer_check.assert_single_writer();
        self.read_position = start;
        self.write_position = start;
        self.write_limit = self.capacity;
        Ok(())
    }
}

impl StreamInput for Bytes {
    fn set_lenient(&mut self, lenient: bool) {
        self.lenient = lenient;
    }

    fn is_lenient(&self) -> bool {
        self.lenient
    }

    fn set_read_position(&mut self, pos: u64) -> Result<()> {
        if self.read_position == pos {
            return Ok(());
        }
        self.writer_check.assert_single_writer();
        if pos < self.start() || pos > self.read_limit() {
            return Err(BytesError::out_of_range(pos, self.start(), self.read_limit()));
        }
        self.read_position = pos;
        Ok(())
    }

    fn set_read_limit(&mut self, limit: u64) -> Result<()> {
        if self.write_position == limit {
            return Ok(());
        }
        self.writer_check.assert_single_writer();
        if limit > self.write_limit {
            return Err(BytesError::out_of_range(limit, self.start(), self.write_limit));
        }
        // Narrowing below the reader drags the reader back with it so the
        // pointer invariant holds.
        self.read_position = self.read_position.min(limit);
        self.write_position = limit;
        Ok(())
    }

    fn read_advance(&mut self, n: u64) {
        self.read_position += n;
        if self.lenient {
            self.read_position = self.read_position.min(self.read_limit());
        }
    }

    fn unchecked_read_skip_one(&mut self) {
        self.read_position += 1;
    }

    fn unchecked_read_back_one(&mut self) {
        self.read_position -= 1;
    }

    fn get_u8(&mut self) -> Result<u8> {
        match self.read_advance_offset(1)? {
            None => Ok(0),
            Some(offset) => lenient_or(self.lenient, self.store.read_u8(offset), 0),
        }
    }

    fn get_i16(&mut self) -> Result<i16> {
        match self.read_advance_offset(2)? {
            None => Ok(0),
            Some(offset) => lenient_or(self.lenient, self.store.read_i16(offset), 0),
        }
    }

    fn get_i32(&mut self) -> Result<i32> {
        match self.read_advance_offset(4)? {
            None => Ok(0),
            Some(offset) => lenient_or(self.lenient, self.store.read_i32(offset), 0),
        }
    }

    fn get_i64(&mut self) -> Result<i64> {
        match self.read_advance_offset(8)? {
            None => Ok(0),
            Some(offset) => lenient_or(self.lenient, self.store.read_i64(offset), 0),
        }
    }

    fn get_f32(&mut self) -> Result<f32> {
        match self.read_advance_offset(4)? {
            None => Ok(0.0),
            Some(offset) => lenient_or(self.lenient, self.store.read_f32(offset), 0.0),
        }
    }

    fn get_f64(&mut self) -> Result<f64> {
        match self.read_advance_offset(8)? {
            None => Ok(0.0),
            Some(offset) => lenient_or(self.lenient, self.store.read_f64(offset), 0.0),
        }
    }

    fn get_u8_volatile(&mut self) -> Result<u8> {
        match self.read_advance_offset(1)? {
            None => Ok(0),
            Some(offset) => lenient_or(self.lenient, self.store.read_u8_volatile(offset), 0),
        }
    }

    fn get_i16_volatile(&mut self) -> Result<i16> {
        match self.read_advance_offset(2)? {
            None => Ok(0),
            Some(offset) => lenient_or(self.lenient, self.store.read_i16_volatile(offset), 0),
        }
    }

    fn get_i32_volatile(&mut self) -> Result<i32> {
        match self.read_advance_offset(4)? {
            None => Ok(0),
            Some(offset) => lenient_or(self.lenient, self.store.read_i32_volatile(offset), 0),
        }
    }

    fn get_i64_volatile(&mut self) -> Result<i64> {
        match self.read_advance_offset(8)? {
            None => Ok(0),
            Some(offset) => lenient_or(self.lenient, self.store.read_i64_volatile(offset), 0),
        }
    }

    fn get_slice(&mut self, dst: &mut [u8]) -> Result<Option<usize>> {
        let total = (self.read_remaining().min(dst.len() as u64)) as usize;
        if total == 0 {
            return Ok(None);
        }
        let mut done = 0usize;
        while done < total {
            let copy = (total - done).min(COPY_CHUNK);
            let Some(offset) = self.read_advance_offset(copy as u64)? else {
                break;
            };
            self.store.read_into(offset, &mut dst[done..done + copy])?;
            done += copy;
        }
        Ok(Some(done))
    }

    unsafe fn get_native(&mut self, address: *mut u8, len: u64) -> Result<()> {
        let Some(offset) = self.read_advance_offset(len)? else {
            return Ok(());
        };
        // SAFETY: forwarded caller contract.
        unsafe { self.store.native_read(offset, address, len) }
    }
}

impl StreamOutput for Bytes {
    fn ensure_capacity(&mut self, requested: u64) -> Result<()> {
        match self.mode {
            Growth::Fixed => {
                if requested > self.capacity {
                    return Err(BytesError::GrowthFailed {
                        requested,
                        capacity: self.capacity,
                    });
                }
                Ok(())
            }
            Growth::ElasticHeap | Growth::ElasticNative => {
                if requested > self.store.safe_limit() {
                    self.resize(requested)?;
                }
                Ok(())
            }
        }
    }

    fn set_write_position(&mut self, pos: u64) -> Result<()> {
        if self.write_position == pos {
            return Ok(());
        }
        self.writer_check.assert_single_writer();
        if pos < self.start() || pos > self.write_limit {
            return Err(BytesError::out_of_range(pos, self.start(), self.write_limit));
        }
        if pos < self.read_position {
            return Err(BytesError::out_of_range(pos, self.read_position, self.write_limit));
        }
        self.write_position = pos;
        Ok(())
    }

    fn set_write_limit(&mut self, limit: u64) -> Result<()> {
        if self.write_limit == limit {
            return Ok(());
        }
        self.writer_check.assert_single_writer();
        if limit < self.start() || limit > self.capacity {
            return Err(BytesError::out_of_range(limit, self.start(), self.capacity));
        }
        if limit < self.write_position {
            return Err(BytesError::out_of_range(limit, self.write_position, self.capacity));
        }
        self.write_limit = limit;
        Ok(())
    }

    fn write_advance(&mut self, n: u64) {
        self.write_position += n;
    }

    fn put_u8(&mut self, v: u8) -> Result<()> {
        let offset = self.write_advance_offset(1)?;
        self.store.write_u8(offset, v)
    }

    fn put_i16(&mut self, v: i16) -> Result<()> {
        let offset = self.write_advance_offset(2)?;
        self.store.write_i16(offset, v)
    }

    fn put_i32(&mut self, v: i32) -> Result<()> {
        let offset = self.write_advance_offset(4)?;
        self.store.write_i32(offset, v)
    }

    fn put_i64(&mut self, v: i64) -> Result<()> {
        let offset = self.write_advance_offset(8)?;
        self.store.write_i64(offset, v)
    }

    fn put_f32(&mut self, v: f32) -> Result<()> {
        let offset = self.write_advance_offset(4)?;
        self.store.write_f32(offset, v)
    }

    fn put_f64(&mut self, v: f64) -> Result<()> {
        let offset = self.write_advance_offset(8)?;
        self.store.write_f64(offset, v)
    }

    fn put_i32_ordered(&mut self, v: i32) -> Result<()> {
        let offset = self.write_advance_offset(4)?;
        self.store.write_i32_ordered(offset, v)
    }

    fn put_i64_ordered(&mut self, v: i64) -> Result<()> {
        let offset = self.write_advance_offset(8)?;
        self.store.write_i64_ordered(offset, v)
    }

    fn put_slice(&mut self, src: &[u8]) -> Result<()> {
        let len = src.len() as u64;
        if len > self.write_remaining() {
            return Err(BytesError::overflow(
                self.write_position,
                len,
                self.start(),
                self.write_limit,
            ));
        }
        self.ensure_capacity(self.write_position + len)?;
        let mut begin = 0usize;
        while begin < src.len() {
            let copy = (src.len() - begin).min(COPY_CHUNK);
            let offset = self.write_advance_offset(copy as u64)?;
            self.store.write_from(offset, &src[begin..begin + copy])?;
            begin += copy;
        }
        Ok(())
    }

    unsafe fn put_native(&mut self, address: *const u8, len: u64) -> Result<()> {
        let offset = self.write_advance_offset(len)?;
        // SAFETY: forwarded caller contract.
        unsafe { self.store.native_write(address, offset, len) }
    }
}

/// Plain-primitive reads that bypass bounds and release checks.
///
/// Acquired with [`Bytes::unchecked_input`]; used by hot inner loops that
/// have already validated their ranges.
pub struct UncheckedInput<'a> {
    base: *const u8,
    _cursor: std::marker::PhantomData<&'a Bytes>,
}

impl UncheckedInput<'_> {
    /// Reads the byte at `offset`.
    ///
    /// # Safety
    ///
    /// `offset` must lie inside the cursor's readable range.
    #[inline]
    #[must_use]
    pub unsafe fn read_u8(&self, offset: u64) -> u8 {
        // SAFETY: caller guarantees the range.
        unsafe { mem::read_u8(self.base.add(offset as usize)) }
    }

    /// Reads a 16-bit integer at `offset`.
    ///
    /// # Safety
    ///
    /// `offset + 2` must lie inside the cursor's readable range.
    #[inline]
    #[must_use]
    pub unsafe fn read_i16(&self, offset: u64) -> i16 {
        // SAFETY: caller guarantees the range.
        unsafe { mem::read_i16(self.base.add(offset as usize)) }
    }

    /// Reads a 32-bit integer at `offset`.
    ///
    /// # Safety
    ///
    /// `offset + 4` must lie inside the cursor's readable range.
    #[inline]
    #[must_use]
    pub unsafe fn read_i32(&self, offset: u64) -> i32 {
        // SAFETY: caller guarantees the range.
        unsafe { mem::read_i32(self.base.add(offset as usize)) }
    }

    /// Reads a 64-bit integer at `offset`.
    ///
    /// # Safety
    ///
    /// `offset + 8` must lie inside the cursor's readable range.
    #[inline]
    #[must_use]
    pub unsafe fn read_i64(&self, offset: u64) -> i64 {
        // SAFETY: caller guarantees the range.
        unsafe { mem::read_i64(self.base.add(offset as usize)) }
    }

    /// Reads a 32-bit float at `offset`.
    ///
    /// # Safety
    ///
    /// `offset + 4` must lie inside the cursor's readable range.
    #[inline]
    #[must_use]
    pub unsafe fn read_f32(&self, offset: u64) -> f32 {
        f32::from_bits(unsafe { self.read_i32(offset) } as u32)
    }

    /// Reads a 64-bit float at `offset`.
    ///
    /// # Safety
    ///
    /// `offset + 8` must lie inside the cursor's readable range.
    #[inline]
    #[must_use]
    pub unsafe fn read_f64(&self, offset: u64) -> f64 {
        f64::from_bits(unsafe { self.read_i64(offset) } as u64)
    }
}

#[inline]
fn lenient_or<T>(lenient: bool, result: Result<T>, zero: T) -> Result<T> {
    match result {
        Err(ref e) if e.is_bounds() && lenient => Ok(zero),
        other => other,
    }
}
