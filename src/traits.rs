//! Capability traits for random and sequential byte access.
//!
//! The type graph is flat on purpose: [`RandomAccess`] carries geometry,
//! [`RandomInput`] / [`RandomOutput`] add offset-addressed reads and writes,
//! [`StreamInput`] / [`StreamOutput`] add the cursor discipline, and
//! [`ByteStore`] is the object-safe composition implemented by the concrete
//! stores. Concrete types compose capabilities; there is no deep hierarchy.
//!
//! Naming follows the cursor convention used elsewhere in this codebase:
//! offset-addressed operations are `read_*` / `write_*` and take an explicit
//! offset; sequential operations are `get_*` / `put_*` and advance the
//! cursor. Offsets are always *store-local logical coordinates*: `0` is
//! [`RandomAccess::start`], regardless of where the backing memory lives.

use std::io::Write;

use crate::error::{BytesError, Result};
use crate::mem;
use crate::refcount::OwnerToken;

/// Largest capacity a native store may report: `i64::MAX` rounded down to a
/// 16-byte multiple. Also the default capacity of elastic native cursors.
pub const MAX_NATIVE_CAPACITY: u64 = (i64::MAX as u64) & !0xF;

/// Largest capacity an on-heap store may report: `i32::MAX` rounded down to
/// a 16-byte multiple (word-alignment slack below the array limit).
pub const MAX_HEAP_CAPACITY: u64 = (i32::MAX as u64) & !0xF;

/// Block size above which allocations are assumed to come from an
/// individual memory mapping: growth past it is logged, and lazily created
/// native blocks of at least this size skip the explicit zero fill.
pub const LARGE_MEMORY_BLOCK: u64 = 128 << 10;

/// Chunk size for bulk copies routed through an intermediate buffer.
pub(crate) const COPY_CHUNK: usize = 64 << 10;

/// Interprets a byte as a boolean: `1`, `b'Y'` and `b'y'` are true.
#[inline]
#[must_use]
pub fn byte_to_bool(b: u8) -> bool {
    b == 1 || b == b'Y' || b == b'y'
}

/// Bytes needed to advance `from` to the next 64-byte boundary.
#[inline]
#[must_use]
pub fn pad_offset(from: u64) -> u64 {
    from.wrapping_neg() & 0x3F
}

/// Geometry and lifecycle of a byte region with read/write windows.
pub trait RandomAccess {
    /// The smallest valid position. Always 0 for the stores in this crate.
    fn start(&self) -> u64 {
        0
    }

    /// Maximum permitted logical extent.
    fn capacity(&self) -> u64;

    /// Currently allocated extent; `size() <= capacity()`, with the gap
    /// occupied on demand by elastic growth.
    fn size(&self) -> u64 {
        self.capacity()
    }

    /// Highest offset guaranteed present without triggering a resize.
    fn safe_limit(&self) -> u64 {
        self.size()
    }

    /// Next byte to read.
    fn read_position(&self) -> u64 {
        self.start()
    }

    /// Next byte to write.
    fn write_position(&self) -> u64 {
        self.start()
    }

    /// Upper bound for the read position.
    fn read_limit(&self) -> u64 {
        self.size()
    }

    /// Upper bound for the write position.
    fn write_limit(&self) -> u64 {
        self.size()
    }

    /// Bytes that can be read without violating the read limit.
    fn read_remaining(&self) -> u64 {
        self.read_limit().saturating_sub(self.read_position())
    }

    /// Bytes that can be written without violating the write limit.
    fn write_remaining(&self) -> u64 {
        self.write_limit().saturating_sub(self.write_position())
    }

    /// Bytes readable without resizing: bounded by the allocated size.
    fn read_available(&self) -> u64 {
        self.size()
            .min(self.read_limit())
            .saturating_sub(self.read_position())
    }

    /// Bytes writable without resizing: bounded by the allocated size.
    fn write_available(&self) -> u64 {
        self.size()
            .min(self.write_limit())
            .saturating_sub(self.write_position())
    }

    /// True if backed by heap memory. Mutually exclusive with
    /// [`is_native`](RandomAccess::is_native) and constant for a lifetime.
    fn is_heap(&self) -> bool;

    /// True if backed by native (off-heap) memory.
    fn is_native(&self) -> bool;

    /// True if an access of `width` bytes at `offset` stays inside the
    /// allocated region.
    fn is_inside(&self, offset: u64, width: u64) -> bool {
        offset >= self.start()
            && offset
                .checked_add(width)
                .is_some_and(|end| end <= self.size())
    }

    /// True if `n` bytes can be read straight from native memory.
    fn can_read_direct(&self, n: u64) -> bool {
        self.is_native() && self.read_remaining() >= n
    }

    /// True if `n` bytes can be written straight to native memory.
    fn can_write_direct(&self, n: u64) -> bool {
        self.is_native() && self.write_available() >= n
    }

    /// Raw address of the byte at `offset` for reading. Native backings
    /// only; heap backings fail with `Unsupported`.
    fn address_for_read(&self, offset: u64) -> Result<*const u8>;

    /// Raw address of the byte at `offset` for writing. Native only.
    fn address_for_write(&self, offset: u64) -> Result<*mut u8>;

    /// Fails with [`BytesError::Released`] once the backing region has been
    /// released.
    fn ensure_not_released(&self) -> Result<()>;
}

/// Offset-addressed reads.
///
/// Multi-byte values use host byte order. `*_volatile` reads carry acquire
/// semantics and synchronize with matching volatile writes.
pub trait RandomInput: RandomAccess {
    /// Reads the byte at `offset`.
    fn read_u8(&self, offset: u64) -> Result<u8>;

    /// Reads the byte at `offset` as signed.
    fn read_i8(&self, offset: u64) -> Result<i8> {
        Ok(self.read_u8(offset)? as i8)
    }

    /// Reads a boolean (see [`byte_to_bool`]).
    fn read_bool(&self, offset: u64) -> Result<bool> {
        Ok(byte_to_bool(self.read_u8(offset)?))
    }

    /// Reads a 16-bit integer at `offset`.
    fn read_i16(&self, offset: u64) -> Result<i16>;

    /// Reads an unsigned 16-bit integer at `offset`.
    fn read_u16(&self, offset: u64) -> Result<u16> {
        Ok(self.read_i16(offset)? as u16)
    }

    /// Reads a 24-bit integer assembled in host order. The result is in
    /// `0..=0xFF_FFFF`.
    fn read_i24(&self, offset: u64) -> Result<i32> {
        let lo = i32::from(self.read_u16(offset)?);
        let hi = i32::from(self.read_u8(offset + 2)?);
        Ok(if mem::IS_LITTLE_ENDIAN {
            lo | (hi << 16)
        } else {
            (lo << 8) | hi
        })
    }

    /// Reads an unsigned 24-bit integer at `offset`.
    fn read_u24(&self, offset: u64) -> Result<u32> {
        Ok((self.read_i24(offset)? as u32) & 0x00FF_FFFF)
    }

    /// Reads a 32-bit integer at `offset`.
    fn read_i32(&self, offset: u64) -> Result<i32>;

    /// Reads an unsigned 32-bit integer at `offset`.
    fn read_u32(&self, offset: u64) -> Result<u32> {
        Ok(self.read_i32(offset)? as u32)
    }

    /// Reads a 64-bit integer at `offset`.
    fn read_i64(&self, offset: u64) -> Result<i64>;

    /// Reads a 32-bit float at `offset`.
    fn read_f32(&self, offset: u64) -> Result<f32>;

    /// Reads a 64-bit float at `offset`.
    fn read_f64(&self, offset: u64) -> Result<f64>;

    /// Reads a 64-bit value even when fewer than eight bytes remain before
    /// the read limit: eight or more bytes read normally, exactly four read
    /// as an unsigned 32-bit value, anything else assembles the remaining
    /// bytes little-endian, zero-extended to 64 bits.
    fn read_long_incomplete(&self, offset: u64) -> Result<i64> {
        let left = self.read_limit().saturating_sub(offset);
        if left >= 8 {
            return self.read_i64(offset);
        }
        if left == 4 {
            return Ok(i64::from(self.read_u32(offset)?));
        }
        let mut v: u64 = 0;
        for i in 0..left {
            v |= u64::from(self.read_u8(offset + i)?) << (i * 8);
        }
        Ok(v as i64)
    }

    /// Volatile byte read.
    fn read_u8_volatile(&self, offset: u64) -> Result<u8>;

    /// Volatile 16-bit read.
    fn read_i16_volatile(&self, offset: u64) -> Result<i16>;

    /// Volatile 32-bit read.
    fn read_i32_volatile(&self, offset: u64) -> Result<i32>;

    /// Volatile 64-bit read.
    fn read_i64_volatile(&self, offset: u64) -> Result<i64>;

    /// Volatile 32-bit float read, derived from the integer load.
    fn read_f32_volatile(&self, offset: u64) -> Result<f32> {
        Ok(f32::from_bits(self.read_i32_volatile(offset)? as u32))
    }

    /// Volatile 64-bit float read, derived from the integer load.
    fn read_f64_volatile(&self, offset: u64) -> Result<f64> {
        Ok(f64::from_bits(self.read_i64_volatile(offset)? as u64))
    }

    /// Copies from `offset` into `dst`, capped by `read_limit() - offset`.
    /// Returns the number of bytes transferred, or `None` when the source
    /// range is empty.
    fn read_into(&self, offset: u64, dst: &mut [u8]) -> Result<Option<usize>>;

    /// Copies `len` bytes from `offset` into raw memory at `address`.
    ///
    /// # Safety
    ///
    /// `address` must be valid for `len` writes.
    unsafe fn native_read(&self, offset: u64, address: *mut u8, len: u64) -> Result<()>;

    /// First position at or after `offset` holding `stop_byte`, scanning up
    /// to `read_remaining()`.
    fn find(&self, offset: u64, stop_byte: u8) -> Result<Option<u64>> {
        self.ensure_not_released()?;
        let hi = self.read_remaining();
        for i in offset..hi {
            if self.read_u8(i)? == stop_byte {
                return Ok(Some(i));
            }
        }
        Ok(None)
    }

    /// Raw pointer to the byte at logical `offset`, with no bounds or
    /// release checks. `None` when the backing exposes no stable pointer
    /// (the null store). Fast paths only; callers must have validated the
    /// range and must keep the backing reserved for the duration of use.
    fn read_view_ptr(&self, offset: u64) -> Option<*const u8> {
        let _ = offset;
        None
    }

    /// Fast 32-bit fold over `len` bytes starting at `offset`. Not the
    /// content hash; a cheap fingerprint for hot paths.
    fn fmix(&self, offset: u64, len: u64) -> Result<i32> {
        let mut h: i64 = 0;
        let mut i: u64 = 0;
        if len >= 4 {
            h = i64::from(self.read_i32(offset)?);
            i = 4;
        }
        while i + 4 <= len {
            h = h.wrapping_mul(0x6d0f_27bd);
            h = h.wrapping_add(i64::from(self.read_i32(offset + i)?));
            i += 4;
        }
        while i < len {
            h = h.wrapping_mul(0x6d0f_27bd);
            h = h.wrapping_add(i64::from(self.read_i8(offset + i)?));
            i += 1;
        }
        h = h.wrapping_mul(0x855d_d4db);
        Ok((h ^ (h >> 32)) as i32)
    }
}

/// Offset-addressed writes and the atomic family.
///
/// Ordered writes are release-only; volatile writes are globally observable
/// before any subsequent memory operation of the writing thread;
/// compare-and-swap is a full fence on both sides.
pub trait RandomOutput: RandomAccess {
    /// Writes a byte at `offset`.
    fn write_u8(&self, offset: u64, v: u8) -> Result<()>;

    /// Writes a signed byte at `offset`.
    fn write_i8(&self, offset: u64, v: i8) -> Result<()> {
        self.write_u8(offset, v as u8)
    }

    /// Writes a boolean as `1` / `0`.
    fn write_bool(&self, offset: u64, v: bool) -> Result<()> {
        self.write_u8(offset, u8::from(v))
    }

    /// Writes a 16-bit integer at `offset`.
    fn write_i16(&self, offset: u64, v: i16) -> Result<()>;

    /// Writes an unsigned 16-bit integer at `offset`.
    fn write_u16(&self, offset: u64, v: u16) -> Result<()> {
        self.write_i16(offset, v as i16)
    }

    /// Writes the low 24 bits of `v` in host order.
    fn write_i24(&self, offset: u64, v: i32) -> Result<()> {
        if mem::IS_LITTLE_ENDIAN {
            self.write_i16(offset, v as i16)?;
            self.write_u8(offset + 2, (v >> 16) as u8)
        } else {
            self.write_i16(offset, (v >> 8) as i16)?;
            self.write_u8(offset + 2, v as u8)
        }
    }

    /// Writes an unsigned 24-bit integer; fails if `v` needs more bits.
    fn write_u24(&self, offset: u64, v: u32) -> Result<()> {
        if v > 0x00FF_FFFF {
            return Err(BytesError::InvalidArgument(format!(
                "{v} does not fit in 24 bits"
            )));
        }
        self.write_i24(offset, v as i32)
    }

    /// Writes a 32-bit integer at `offset`.
    fn write_i32(&self, offset: u64, v: i32) -> Result<()>;

    /// Writes an unsigned 32-bit integer at `offset`.
    fn write_u32(&self, offset: u64, v: u32) -> Result<()> {
        self.write_i32(offset, v as i32)
    }

    /// Writes a 64-bit integer at `offset`.
    fn write_i64(&self, offset: u64, v: i64) -> Result<()>;

    /// Writes a 32-bit float at `offset`.
    fn write_f32(&self, offset: u64, v: f32) -> Result<()>;

    /// Writes a 64-bit float at `offset`.
    fn write_f64(&self, offset: u64, v: f64) -> Result<()>;

    /// Release-ordered 32-bit write: non-blocking, prior stores visible
    /// before this value becomes visible.
    fn write_i32_ordered(&self, offset: u64, v: i32) -> Result<()>;

    /// Release-ordered 64-bit write.
    fn write_i64_ordered(&self, offset: u64, v: i64) -> Result<()>;

    /// Release-ordered 32-bit float write (bit-reinterpreted).
    fn write_f32_ordered(&self, offset: u64, v: f32) -> Result<()> {
        self.write_i32_ordered(offset, v.to_bits() as i32)
    }

    /// Release-ordered 64-bit float write (bit-reinterpreted).
    fn write_f64_ordered(&self, offset: u64, v: f64) -> Result<()> {
        self.write_i64_ordered(offset, v.to_bits() as i64)
    }

    /// Volatile 32-bit write.
    fn write_i32_volatile(&self, offset: u64, v: i32) -> Result<()>;

    /// Volatile 64-bit write.
    fn write_i64_volatile(&self, offset: u64, v: i64) -> Result<()>;

    /// Volatile 32-bit float write (bit-reinterpreted).
    fn write_f32_volatile(&self, offset: u64, v: f32) -> Result<()> {
        self.write_i32_volatile(offset, v.to_bits() as i32)
    }

    /// Volatile 64-bit float write (bit-reinterpreted).
    fn write_f64_volatile(&self, offset: u64, v: f64) -> Result<()> {
        self.write_i64_volatile(offset, v.to_bits() as i64)
    }

    /// Copies `src` into the region starting at `offset`.
    fn write_from(&self, offset: u64, src: &[u8]) -> Result<()>;

    /// 32-bit compare-and-swap; true if the slot held `expected` and now
    /// holds `value`.
    fn compare_and_swap_i32(&self, offset: u64, expected: i32, value: i32) -> Result<bool>;

    /// 64-bit compare-and-swap.
    fn compare_and_swap_i64(&self, offset: u64, expected: i64, value: i64) -> Result<bool>;

    /// 32-bit float compare-and-swap over bit patterns.
    fn compare_and_swap_f32(&self, offset: u64, expected: f32, value: f32) -> Result<bool> {
        self.compare_and_swap_i32(offset, expected.to_bits() as i32, value.to_bits() as i32)
    }

    /// 64-bit float compare-and-swap over bit patterns.
    fn compare_and_swap_f64(&self, offset: u64, expected: f64, value: f64) -> Result<bool> {
        self.compare_and_swap_i64(offset, expected.to_bits() as i64, value.to_bits() as i64)
    }

    /// 32-bit swap-if-equal with no result; a fencing write.
    fn test_and_set_i32(&self, offset: u64, expected: i32, value: i32) -> Result<()>;

    /// 64-bit swap-if-equal with no result.
    fn test_and_set_i64(&self, offset: u64, expected: i64, value: i64) -> Result<()>;

    /// Fills `[begin, end)` with zeros, clamped to the allocated region.
    fn zero_out(&self, begin: u64, end: u64) -> Result<()>;

    /// Copies `len` bytes from raw memory at `address` to `offset`.
    ///
    /// # Safety
    ///
    /// `address` must be valid for `len` reads.
    unsafe fn native_write(&self, address: *const u8, offset: u64, len: u64) -> Result<()>;

    /// Overlap-safe move of `len` bytes from `from` to `to` inside the
    /// region.
    fn move_range(&self, from: u64, to: u64, len: u64) -> Result<()>;
}

/// The object-safe store composition: offset-addressed access plus the
/// reference-counted lifecycle. Implemented by the concrete stores and by
/// the cursor (which forwards to the store it reserves).
pub trait ByteStore: RandomInput + RandomOutput + Send + Sync {
    /// Current reference count.
    fn ref_count(&self) -> i32;

    /// Adds a reservation for `owner`; fails once the count is zero.
    fn reserve(&self, owner: &OwnerToken) -> Result<()>;

    /// Adds a reservation, reporting failure instead of erroring.
    fn try_reserve(&self, owner: &OwnerToken) -> bool;

    /// Drops `owner`'s reservation; the terminal release runs the store's
    /// release action (freeing native memory, dropping the heap backing).
    fn release(&self, owner: &OwnerToken) -> Result<()>;

    /// Releases asserting this is the terminal reservation.
    fn release_last(&self, owner: &OwnerToken) -> Result<()>;

    /// Hands the reservation held by `from` to `to` without changing the
    /// count.
    fn reserve_transfer(&self, from: &OwnerToken, to: &OwnerToken) -> Result<()>;

    /// Atomically adds `diff` to the 32-bit slot at `offset` and returns
    /// the post-value. Spins on CAS; callers must keep contention bounded.
    fn add_and_get_i32(&self, offset: u64, diff: i32) -> Result<i32> {
        loop {
            let cur = self.read_i32_volatile(offset)?;
            let next = cur.wrapping_add(diff);
            if self.compare_and_swap_i32(offset, cur, next)? {
                return Ok(next);
            }
        }
    }

    /// Atomically adds `diff` to the 64-bit slot at `offset`.
    fn add_and_get_i64(&self, offset: u64, diff: i64) -> Result<i64> {
        loop {
            let cur = self.read_i64_volatile(offset)?;
            let next = cur.wrapping_add(diff);
            if self.compare_and_swap_i64(offset, cur, next)? {
                return Ok(next);
            }
        }
    }

    /// Atomically adds `diff` to the 32-bit float slot at `offset`,
    /// comparing bit patterns.
    fn add_and_get_f32(&self, offset: u64, diff: f32) -> Result<f32> {
        loop {
            let cur = self.read_f32_volatile(offset)?;
            let next = cur + diff;
            if self.compare_and_swap_f32(offset, cur, next)? {
                return Ok(next);
            }
        }
    }

    /// Atomically adds `diff` to the 64-bit float slot at `offset`.
    fn add_and_get_f64(&self, offset: u64, diff: f64) -> Result<f64> {
        loop {
            let cur = self.read_f64_volatile(offset)?;
            let next = cur + diff;
            if self.compare_and_swap_f64(offset, cur, next)? {
                return Ok(next);
            }
        }
    }

    /// Copies this store's readable content into `dst` at the same
    /// offsets, bounded by `dst.size()`. Returns the bytes copied.
    fn copy_to(&self, dst: &dyn ByteStore) -> Result<u64> {
        self.ensure_not_released()?;
        dst.ensure_not_released()?;
        let total = self.read_limit().min(dst.size());
        let mut buf = vec![0u8; COPY_CHUNK.min(total as usize).max(1)];
        let mut at = self.start();
        while at < total {
            let n = buf.len().min((total - at) as usize);
            let Some(got) = self.read_into(at, &mut buf[..n])? else {
                break;
            };
            dst.write_from(at, &buf[..got])?;
            at += got as u64;
        }
        Ok(total)
    }

    /// Streams this store's readable content into `out`.
    fn copy_to_writer(&self, out: &mut dyn Write) -> Result<u64> {
        self.ensure_not_released()?;
        let total = self.read_limit();
        let mut buf = vec![0u8; COPY_CHUNK.min(total as usize).max(1)];
        let mut at = self.start();
        while at < total {
            let n = buf.len().min((total - at) as usize);
            let Some(got) = self.read_into(at, &mut buf[..n])? else {
                break;
            };
            out.write_all(&buf[..got])
                .map_err(|e| BytesError::InvalidArgument(e.to_string()))?;
            at += got as u64;
        }
        Ok(at)
    }
}

/// Shared surface of the sequential layers.
pub trait StreamCommon: RandomAccess {
    /// Resets both cursors to [`start`](RandomAccess::start) and restores
    /// the write limit to the full capacity. Idempotent.
    fn clear(&mut self) -> Result<()>;
}

/// Sequential reads: each successful `get_*` advances the read position by
/// the width consumed.
pub trait StreamInput: StreamCommon {
    /// Switches lenient mode: sequential reads past the limit yield zero
    /// instead of failing. Random access is unaffected.
    fn set_lenient(&mut self, lenient: bool);

    /// True if lenient mode is active.
    fn is_lenient(&self) -> bool;

    /// Moves the read position; `start() <= pos <= read_limit()`.
    fn set_read_position(&mut self, pos: u64) -> Result<()>;

    /// Sets the readable window bound. The read limit is the write
    /// position, so this moves the write position after validating
    /// `limit <= write_limit()`.
    fn set_read_limit(&mut self, limit: u64) -> Result<()>;

    /// Widens the readable window to the full capacity.
    fn read_limit_to_capacity(&mut self) -> Result<()> {
        let cap = self.capacity();
        self.set_read_limit(cap)
    }

    /// Positions the reader at `pos` with `n` readable bytes.
    fn read_position_remaining(&mut self, pos: u64, n: u64) -> Result<()> {
        self.set_read_limit(pos + n)?;
        self.set_read_position(pos)
    }

    /// Positions the reader at `pos` with the window widened to capacity.
    fn read_position_unlimit(&mut self, pos: u64) -> Result<()> {
        self.read_limit_to_capacity()?;
        self.set_read_position(pos)
    }

    /// Unchecked advance of the read position by `n` bytes. In lenient mode
    /// the position clamps at the read limit.
    fn read_advance(&mut self, n: u64);

    /// Current read position, optionally first skipping ahead to the next
    /// 64-byte boundary (header padding).
    fn read_position_for_header(&mut self, skip_padding: bool) -> u64 {
        let pos = self.read_position();
        if skip_padding {
            self.read_advance(pad_offset(pos));
            return self.read_position();
        }
        pos
    }

    /// `read_advance(1)` without any checks.
    fn unchecked_read_skip_one(&mut self);

    /// Steps the read position back one byte without any checks.
    fn unchecked_read_back_one(&mut self);

    /// Reads the next byte.
    fn get_u8(&mut self) -> Result<u8>;

    /// Reads the next byte as signed.
    fn get_i8(&mut self) -> Result<i8> {
        Ok(self.get_u8()? as i8)
    }

    /// Reads the next byte as a boolean (see [`byte_to_bool`]).
    fn get_bool(&mut self) -> Result<bool> {
        Ok(byte_to_bool(self.get_u8()?))
    }

    /// Reads the next 16-bit integer.
    fn get_i16(&mut self) -> Result<i16>;

    /// Reads the next unsigned 16-bit integer.
    fn get_u16(&mut self) -> Result<u16> {
        Ok(self.get_i16()? as u16)
    }

    /// Reads the next 24-bit integer in host order.
    fn get_i24(&mut self) -> Result<i32> {
        let lo = i32::from(self.get_u16()?);
        let hi = i32::from(self.get_u8()?);
        Ok(if mem::IS_LITTLE_ENDIAN {
            lo | (hi << 16)
        } else {
            (lo << 8) | hi
        })
    }

    /// Reads the next unsigned 24-bit integer.
    fn get_u24(&mut self) -> Result<u32> {
        Ok((self.get_i24()? as u32) & 0x00FF_FFFF)
    }

    /// Reads the next 32-bit integer.
    fn get_i32(&mut self) -> Result<i32>;

    /// Reads the next unsigned 32-bit integer.
    fn get_u32(&mut self) -> Result<u32> {
        Ok(self.get_i32()? as u32)
    }

    /// Reads the next 64-bit integer.
    fn get_i64(&mut self) -> Result<i64>;

    /// Reads the next 32-bit float.
    fn get_f32(&mut self) -> Result<f32>;

    /// Reads the next 64-bit float.
    fn get_f64(&mut self) -> Result<f64>;

    /// Reads up to eight remaining bytes as a zero-extended 64-bit value
    /// (see [`RandomInput::read_long_incomplete`]).
    fn get_long_incomplete(&mut self) -> Result<i64> {
        let left = self.read_remaining();
        if left >= 8 {
            return self.get_i64();
        }
        if left == 4 {
            return Ok(i64::from(self.get_u32()?));
        }
        let mut v: u64 = 0;
        for i in 0..left {
            v |= u64::from(self.get_u8()?) << (i * 8);
        }
        Ok(v as i64)
    }

    /// Volatile sequential byte read.
    fn get_u8_volatile(&mut self) -> Result<u8>;

    /// Volatile sequential 16-bit read.
    fn get_i16_volatile(&mut self) -> Result<i16>;

    /// Volatile sequential 32-bit read.
    fn get_i32_volatile(&mut self) -> Result<i32>;

    /// Volatile sequential 64-bit read.
    fn get_i64_volatile(&mut self) -> Result<i64>;

    /// Volatile sequential 32-bit float read.
    fn get_f32_volatile(&mut self) -> Result<f32> {
        Ok(f32::from_bits(self.get_i32_volatile()? as u32))
    }

    /// Volatile sequential 64-bit float read.
    fn get_f64_volatile(&mut self) -> Result<f64> {
        Ok(f64::from_bits(self.get_i64_volatile()? as u64))
    }

    /// Fills `dst` from the stream, capped by `read_remaining()`. Returns
    /// the bytes read, or `None` when nothing is readable.
    fn get_slice(&mut self, dst: &mut [u8]) -> Result<Option<usize>>;

    /// Copies `len` bytes from the stream into raw memory.
    ///
    /// # Safety
    ///
    /// `address` must be valid for `len` writes.
    unsafe fn get_native(&mut self, address: *mut u8, len: u64) -> Result<()>;
}

/// Sequential writes: each successful `put_*` advances the write position
/// by the width produced, growing the backing store first when elastic.
pub trait StreamOutput: StreamCommon {
    /// Ensures the buffer can hold `requested` bytes, growing an elastic
    /// buffer on demand. Non-elastic buffers fail when `requested` exceeds
    /// their capacity.
    fn ensure_capacity(&mut self, requested: u64) -> Result<()>;

    /// Moves the write position; `start() <= pos <= write_limit()`. The
    /// readable window follows the write position.
    fn set_write_position(&mut self, pos: u64) -> Result<()>;

    /// Sets the write bound; `start() <= limit <= capacity()`.
    fn set_write_limit(&mut self, limit: u64) -> Result<()>;

    /// Unchecked advance of the write position by `n` bytes.
    fn write_advance(&mut self, n: u64);

    /// Positions the writer at `pos` with `n` writable bytes.
    fn write_position_remaining(&mut self, pos: u64, n: u64) -> Result<()> {
        self.set_write_limit(pos + n)?;
        self.set_write_position(pos)
    }

    /// Current write position, optionally first skipping ahead to the next
    /// 64-byte boundary.
    fn write_position_for_header(&mut self, skip_padding: bool) -> u64 {
        let pos = self.write_position();
        if skip_padding {
            self.write_advance(pad_offset(pos));
            return self.write_position();
        }
        pos
    }

    /// Writes one byte.
    fn put_u8(&mut self, v: u8) -> Result<()>;

    /// Writes one signed byte.
    fn put_i8(&mut self, v: i8) -> Result<()> {
        self.put_u8(v as u8)
    }

    /// Writes a boolean as `1` / `0`.
    fn put_bool(&mut self, v: bool) -> Result<()> {
        self.put_u8(u8::from(v))
    }

    /// Writes a 16-bit integer.
    fn put_i16(&mut self, v: i16) -> Result<()>;

    /// Writes an unsigned 16-bit integer.
    fn put_u16(&mut self, v: u16) -> Result<()> {
        self.put_i16(v as i16)
    }

    /// Writes the low 24 bits of `v` in host order.
    fn put_i24(&mut self, v: i32) -> Result<()> {
        if mem::IS_LITTLE_ENDIAN {
            self.put_i16(v as i16)?;
            self.put_u8((v >> 16) as u8)
        } else {
            self.put_i16((v >> 8) as i16)?;
            self.put_u8(v as u8)
        }
    }

    /// Writes an unsigned 24-bit integer; fails if `v` needs more bits.
    fn put_u24(&mut self, v: u32) -> Result<()> {
        if v > 0x00FF_FFFF {
            return Err(BytesError::InvalidArgument(format!(
                "{v} does not fit in 24 bits"
            )));
        }
        self.put_i24(v as i32)
    }

    /// Writes a 32-bit integer.
    fn put_i32(&mut self, v: i32) -> Result<()>;

    /// Writes an unsigned 32-bit integer.
    fn put_u32(&mut self, v: u32) -> Result<()> {
        self.put_i32(v as i32)
    }

    /// Writes a 64-bit integer.
    fn put_i64(&mut self, v: i64) -> Result<()>;

    /// Writes a 32-bit float.
    fn put_f32(&mut self, v: f32) -> Result<()>;

    /// Writes a 64-bit float.
    fn put_f64(&mut self, v: f64) -> Result<()>;

    /// Release-ordered sequential 32-bit write.
    fn put_i32_ordered(&mut self, v: i32) -> Result<()>;

    /// Release-ordered sequential 64-bit write.
    fn put_i64_ordered(&mut self, v: i64) -> Result<()>;

    /// Release-ordered sequential 32-bit float write.
    fn put_f32_ordered(&mut self, v: f32) -> Result<()> {
        self.put_i32_ordered(v.to_bits() as i32)
    }

    /// Release-ordered sequential 64-bit float write.
    fn put_f64_ordered(&mut self, v: f64) -> Result<()> {
        self.put_i64_ordered(v.to_bits() as i64)
    }

    /// Appends `src` to the stream.
    fn put_slice(&mut self, src: &[u8]) -> Result<()>;

    /// Appends everything `reader` yields until end of stream.
    fn put_reader(&mut self, reader: &mut dyn std::io::Read) -> Result<u64> {
        let mut chunk = [0u8; 4096];
        let mut total = 0u64;
        loop {
            let n = reader
                .read(&mut chunk)
                .map_err(|e| BytesError::InvalidArgument(e.to_string()))?;
            if n == 0 {
                return Ok(total);
            }
            self.put_slice(&chunk[..n])?;
            total += n as u64;
        }
    }

    /// Copies `len` bytes from raw memory into the stream.
    ///
    /// # Safety
    ///
    /// `address` must be valid for `len` reads.
    unsafe fn put_native(&mut self, address: *const u8, len: u64) -> Result<()>;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn byte_to_bool_accepts_only_marked_values() {
        assert!(byte_to_bool(1));
        assert!(byte_to_bool(b'Y'));
        assert!(byte_to_bool(b'y'));
        assert!(!byte_to_bool(0));
        assert!(!byte_to_bool(b'N'));
        assert!(!byte_to_bool(2));
    }

    #[test]
    fn pad_offset_reaches_cache_line() {
        assert_eq!(pad_offset(0), 0);
        assert_eq!(pad_offset(1), 63);
        assert_eq!(pad_offset(64), 0);
        assert_eq!(pad_offset(65), 63);
        for p in 0..512u64 {
            assert_eq!((p + pad_offset(p)) % 64, 0);
        }
    }

    #[test]
    fn capacity_limits_are_aligned() {
        assert_eq!(MAX_NATIVE_CAPACITY % 16, 0);
        assert_eq!(MAX_HEAP_CAPACITY % 16, 0);
        assert!(MAX_HEAP_CAPACITY < i32::MAX as u64);
    }
}
