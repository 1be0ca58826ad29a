//! Raw memory primitives.
//!
//! This module is the only place that touches memory through raw pointers.
//! Everything above it (stores, cursors) funnels loads, stores, atomics and
//! bulk moves through these functions after performing its own bounds and
//! lifecycle checks.
//!
//! Three memory-order classes are offered, mirroring the contract the rest
//! of the crate documents:
//!
//! - *plain* operations compile to ordinary loads and stores with no
//!   ordering guarantee; they tolerate unaligned addresses,
//! - *volatile* operations are sequentially-consistent atomic accesses,
//! - *ordered* stores are release-only writes,
//! - compare-and-swap is acquire-release on success.
//!
//! Atomic operations require the address to be naturally aligned for the
//! access width; this is debug-asserted. Multi-byte values use host byte
//! order throughout.

use std::alloc::{self, Layout};
use std::ptr::NonNull;
use std::sync::atomic::{fence, AtomicI32, AtomicI64, AtomicU16, AtomicU8, Ordering};
use std::sync::OnceLock;

use crate::error::{BytesError, Result};

/// True when the host is little-endian.
pub const IS_LITTLE_ENDIAN: bool = cfg!(target_endian = "little");

/// Byte offset selecting the top four bytes of an eight-byte load on the
/// host's byte order. Used by the content hash.
pub const HI_BYTES: u64 = if IS_LITTLE_ENDIAN { 4 } else { 0 };

/// Alignment of every native allocation made through this module.
pub const ALLOC_ALIGN: usize = 16;

macro_rules! plain_rw {
    ($read:ident, $write:ident, $ty:ty) => {
        /// Plain unordered load, unaligned-tolerant.
        ///
        /// # Safety
        ///
        /// `addr` must be valid for reads of `size_of::<Self>()` bytes.
        #[inline]
        pub unsafe fn $read(addr: *const u8) -> $ty {
            unsafe { addr.cast::<$ty>().read_unaligned() }
        }

        /// Plain unordered store, unaligned-tolerant.
        ///
        /// # Safety
        ///
        /// `addr` must be valid for writes of `size_of::<Self>()` bytes.
        #[inline]
        pub unsafe fn $write(addr: *mut u8, v: $ty) {
            unsafe { addr.cast::<$ty>().write_unaligned(v) }
        }
    };
}

plain_rw!(read_u8, write_u8, u8);
plain_rw!(read_i8, write_i8, i8);
plain_rw!(read_i16, write_i16, i16);
plain_rw!(read_i32, write_i32, i32);
plain_rw!(read_i64, write_i64, i64);

/// Plain `f32` load (bit pattern via the integer load).
///
/// # Safety
///
/// `addr` must be valid for 4-byte reads.
#[inline]
pub unsafe fn read_f32(addr: *const u8) -> f32 {
    f32::from_bits(unsafe { read_i32(addr) } as u32)
}

/// Plain `f32` store.
///
/// # Safety
///
/// `addr` must be valid for 4-byte writes.
#[inline]
pub unsafe fn write_f32(addr: *mut u8, v: f32) {
    unsafe { write_i32(addr, v.to_bits() as i32) }
}

/// Plain `f64` load (bit pattern via the integer load).
///
/// # Safety
///
/// `addr` must be valid for 8-byte reads.
#[inline]
pub unsafe fn read_f64(addr: *const u8) -> f64 {
    f64::from_bits(unsafe { read_i64(addr) } as u64)
}

/// Plain `f64` store.
///
/// # Safety
///
/// `addr` must be valid for 8-byte writes.
#[inline]
pub unsafe fn write_f64(addr: *mut u8, v: f64) {
    unsafe { write_i64(addr, v.to_bits() as i64) }
}

#[inline]
fn assert_aligned(addr: *const u8, width: usize) {
    debug_assert!(
        (addr as usize) % width == 0,
        "atomic access at {addr:p} requires {width}-byte alignment"
    );
}

/// Volatile (sequentially consistent) byte load.
///
/// # Safety
///
/// `addr` must be valid for 1-byte atomic access for the duration of the
/// call and no non-atomic writes may race with it.
#[inline]
pub unsafe fn read_u8_volatile(addr: *const u8) -> u8 {
    unsafe { AtomicU8::from_ptr(addr.cast_mut()) }.load(Ordering::SeqCst)
}

/// Volatile byte store.
///
/// # Safety
///
/// As [`read_u8_volatile`], for writes.
#[inline]
pub unsafe fn write_u8_volatile(addr: *mut u8, v: u8) {
    unsafe { AtomicU8::from_ptr(addr) }.store(v, Ordering::SeqCst);
}

/// Volatile 16-bit load.
///
/// # Safety
///
/// `addr` must be 2-byte aligned and valid for atomic access.
#[inline]
pub unsafe fn read_i16_volatile(addr: *const u8) -> i16 {
    assert_aligned(addr, 2);
    unsafe { AtomicU16::from_ptr(addr.cast_mut().cast()) }.load(Ordering::SeqCst) as i16
}

/// Volatile 16-bit store.
///
/// # Safety
///
/// `addr` must be 2-byte aligned and valid for atomic access.
#[inline]
pub unsafe fn write_i16_volatile(addr: *mut u8, v: i16) {
    assert_aligned(addr, 2);
    unsafe { AtomicU16::from_ptr(addr.cast()) }.store(v as u16, Ordering::SeqCst);
}

/// Volatile 32-bit load.
///
/// # Safety
///
/// `addr` must be 4-byte aligned and valid for atomic access.
#[inline]
pub unsafe fn read_i32_volatile(addr: *const u8) -> i32 {
    assert_aligned(addr, 4);
    unsafe { AtomicI32::from_ptr(addr.cast_mut().cast()) }.load(Ordering::SeqCst)
}

/// Volatile 32-bit store.
///
/// # Safety
///
/// `addr` must be 4-byte aligned and valid for atomic access.
#[inline]
pub unsafe fn write_i32_volatile(addr: *mut u8, v: i32) {
    assert_aligned(addr, 4);
    unsafe { AtomicI32::from_ptr(addr.cast()) }.store(v, Ordering::SeqCst);
}

/// Volatile 64-bit load.
///
/// # Safety
///
/// `addr` must be 8-byte aligned and valid for atomic access.
#[inline]
pub unsafe fn read_i64_volatile(addr: *const u8) -> i64 {
    assert_aligned(addr, 8);
    unsafe { AtomicI64::from_ptr(addr.cast_mut().cast()) }.load(Ordering::SeqCst)
}

/// Volatile 64-bit store.
///
/// # Safety
///
/// `addr` must be 8-byte aligned and valid for atomic access.
#[inline]
pub unsafe fn write_i64_volatile(addr: *mut u8, v: i64) {
    assert_aligned(addr, 8);
    unsafe { AtomicI64::from_ptr(addr.cast()) }.store(v, Ordering::SeqCst);
}

/// Release-only ("ordered") 32-bit store: prior stores by this thread are
/// visible to any thread that observes this value.
///
/// # Safety
///
/// `addr` must be 4-byte aligned and valid for atomic access.
#[inline]
pub unsafe fn write_i32_ordered(addr: *mut u8, v: i32) {
    assert_aligned(addr, 4);
    unsafe { AtomicI32::from_ptr(addr.cast()) }.store(v, Ordering::Release);
}

/// Release-only 64-bit store.
///
/// # Safety
///
/// `addr` must be 8-byte aligned and valid for atomic access.
#[inline]
pub unsafe fn write_i64_ordered(addr: *mut u8, v: i64) {
    assert_aligned(addr, 8);
    unsafe { AtomicI64::from_ptr(addr.cast()) }.store(v, Ordering::Release);
}

/// 32-bit compare-and-swap. Returns true if `expected` was replaced by
/// `value`. Full fence on success.
///
/// # Safety
///
/// `addr` must be 4-byte aligned and valid for atomic access.
#[inline]
pub unsafe fn compare_and_swap_i32(addr: *mut u8, expected: i32, value: i32) -> bool {
    assert_aligned(addr, 4);
    unsafe { AtomicI32::from_ptr(addr.cast()) }
        .compare_exchange(expected, value, Ordering::SeqCst, Ordering::SeqCst)
        .is_ok()
}

/// 64-bit compare-and-swap.
///
/// # Safety
///
/// `addr` must be 8-byte aligned and valid for atomic access.
#[inline]
pub unsafe fn compare_and_swap_i64(addr: *mut u8, expected: i64, value: i64) -> bool {
    assert_aligned(addr, 8);
    unsafe { AtomicI64::from_ptr(addr.cast()) }
        .compare_exchange(expected, value, Ordering::SeqCst, Ordering::SeqCst)
        .is_ok()
}

/// 32-bit swap-if-equal with the outcome discarded; used as a fencing
/// write.
///
/// # Safety
///
/// `addr` must be 4-byte aligned and valid for atomic access.
#[inline]
pub unsafe fn test_and_set_i32(addr: *mut u8, expected: i32, value: i32) {
    let _ = unsafe { compare_and_swap_i32(addr, expected, value) };
}

/// 64-bit swap-if-equal with the outcome discarded.
///
/// # Safety
///
/// `addr` must be 8-byte aligned and valid for atomic access.
#[inline]
pub unsafe fn test_and_set_i64(addr: *mut u8, expected: i64, value: i64) {
    let _ = unsafe { compare_and_swap_i64(addr, expected, value) };
}

/// Non-overlapping bulk copy.
///
/// # Safety
///
/// `src` must be valid for `len` reads, `dst` for `len` writes, and the
/// ranges must not overlap.
#[inline]
pub unsafe fn copy(src: *const u8, dst: *mut u8, len: usize) {
    unsafe { std::ptr::copy_nonoverlapping(src, dst, len) }
}

/// Overlap-safe bulk move (memmove semantics).
///
/// # Safety
///
/// `src` must be valid for `len` reads and `dst` for `len` writes.
#[inline]
pub unsafe fn copy_within(src: *const u8, dst: *mut u8, len: usize) {
    unsafe { std::ptr::copy(src, dst, len) }
}

/// Fill `len` bytes at `addr` with `byte`.
///
/// # Safety
///
/// `addr` must be valid for `len` writes.
#[inline]
pub unsafe fn fill(addr: *mut u8, len: usize, byte: u8) {
    unsafe { std::ptr::write_bytes(addr, byte, len) }
}

/// Release fence: all prior stores become visible before any store issued
/// after the fence.
#[inline]
pub fn store_fence() {
    fence(Ordering::Release);
}

/// Allocate `size` bytes of native memory, 16-byte aligned, uninitialized.
///
/// Zero-size requests round up to one byte so the returned pointer is
/// always dereferenceable.
pub fn allocate(size: u64) -> Result<NonNull<u8>> {
    let layout = layout_for(size)?;
    // SAFETY: layout has non-zero size by construction.
    let ptr = unsafe { alloc::alloc(layout) };
    NonNull::new(ptr).ok_or(BytesError::AllocationFailed { size })
}

/// Allocate `size` bytes of zero-filled native memory.
pub fn allocate_zeroed(size: u64) -> Result<NonNull<u8>> {
    let layout = layout_for(size)?;
    // SAFETY: layout has non-zero size by construction.
    let ptr = unsafe { alloc::alloc_zeroed(layout) };
    NonNull::new(ptr).ok_or(BytesError::AllocationFailed { size })
}

/// Return memory obtained from [`allocate`] / [`allocate_zeroed`].
///
/// # Safety
///
/// `ptr` must have been returned by one of the allocation functions above
/// with this exact `size`, and must not be used afterwards.
pub unsafe fn free(ptr: NonNull<u8>, size: u64) {
    if let Ok(layout) = layout_for(size) {
        unsafe { alloc::dealloc(ptr.as_ptr(), layout) }
    }
}

fn layout_for(size: u64) -> Result<Layout> {
    let size = usize::try_from(size)
        .map_err(|_| BytesError::InvalidArgument(format!("allocation size {size} too large")))?;
    Layout::from_size_align(size.max(1), ALLOC_ALIGN)
        .map_err(|e| BytesError::InvalidArgument(e.to_string()))
}

/// The operating system page size, queried once.
pub fn page_size() -> u64 {
    static PAGE: OnceLock<u64> = OnceLock::new();
    *PAGE.get_or_init(|| {
        // SAFETY: sysconf is always safe to call.
        let sz = unsafe { libc::sysconf(libc::_SC_PAGESIZE) };
        if sz > 0 {
            sz as u64
        } else {
            4096
        }
    })
}

/// Round `size` up to a multiple of `page` (a power of two).
#[inline]
#[must_use]
pub fn page_align(size: u64, page: u64) -> u64 {
    debug_assert!(page.is_power_of_two());
    (size + page - 1) & !(page - 1)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn plain_roundtrip_all_widths() {
        let mut buf = [0u8; 16];
        let p = buf.as_mut_ptr();
        // SAFETY: all accesses stay inside `buf`.
        unsafe {
            write_u8(p, 0xAB);
            assert_eq!(read_u8(p), 0xAB);
            write_i16(p.add(1), -1234);
            assert_eq!(read_i16(p.add(1)), -1234);
            write_i32(p.add(3), 0x0ABC_DEF0);
            assert_eq!(read_i32(p.add(3)), 0x0ABC_DEF0);
            write_i64(p.add(7), -0x0123_4567_89AB_CDEF);
            assert_eq!(read_i64(p.add(7)), -0x0123_4567_89AB_CDEF);
        }
    }

    #[test]
    fn float_bits_roundtrip() {
        let mut buf = [0u8; 8];
        let p = buf.as_mut_ptr();
        // SAFETY: accesses stay inside `buf`.
        unsafe {
            write_f32(p, 255.0);
            assert_eq!(read_f32(p), 255.0);
            write_f64(p, 16_777_215.0);
            assert_eq!(read_f64(p), 16_777_215.0);
        }
    }

    #[test]
    fn cas_swaps_only_on_match() {
        let mut slot: i64 = 7;
        let p = std::ptr::from_mut(&mut slot).cast::<u8>();
        // SAFETY: `slot` is 8-byte aligned and lives across the calls.
        unsafe {
            assert!(!compare_and_swap_i64(p, 0, 9));
            assert_eq!(read_i64_volatile(p), 7);
            assert!(compare_and_swap_i64(p, 7, 9));
            assert_eq!(read_i64_volatile(p), 9);
        }
    }

    #[test]
    fn allocate_zeroed_is_zero() {
        let ptr = allocate_zeroed(64).unwrap();
        // SAFETY: freshly allocated 64-byte block.
        unsafe {
            for i in 0..64 {
                assert_eq!(read_u8(ptr.as_ptr().add(i)), 0);
            }
            free(ptr, 64);
        }
    }

    #[test]
    fn page_align_rounds_up() {
        assert_eq!(page_align(1, 4096), 4096);
        assert_eq!(page_align(4096, 4096), 4096);
        assert_eq!(page_align(4097, 4096), 8192);
    }

    #[test]
    fn hi_bytes_matches_endianness() {
        if IS_LITTLE_ENDIAN {
            assert_eq!(HI_BYTES, 4);
        } else {
            assert_eq!(HI_BYTES, 0);
        }
    }
}
