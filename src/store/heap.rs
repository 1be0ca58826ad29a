//! Byte store backed by heap memory.

use std::fmt;
use std::sync::atomic::{AtomicPtr, Ordering};

use crate::compare;
use crate::config;
use crate::error::{BytesError, Result};
use crate::fields::FieldGroups;
use crate::hash;
use crate::mem;
use crate::refcount::{OwnerToken, RefCount};
use crate::traits::{ByteStore, RandomAccess, RandomInput, RandomOutput};

/// A reference-counted store over heap memory.
///
/// The backing is either an allocation this store owns (created from a
/// `Vec<u8>` or copied from a slice) or a borrowed window over somebody
/// else's memory (a field group of a host object). Bounds are immutable;
/// the terminal release drops the owned backing, after which every access
/// fails with [`BytesError::Released`].
///
/// Raw addresses are not exposed: [`address_for_read`] and
/// [`address_for_write`] fail with `Unsupported`.
///
/// [`address_for_read`]: RandomAccess::address_for_read
/// [`address_for_write`]: RandomAccess::address_for_write
pub struct HeapStore {
    /// Base of the backing allocation; null once released.
    base: AtomicPtr<u8>,
    /// Offset of the first usable byte within the backing.
    data_offset: u64,
    /// Usable extent in bytes.
    capacity: u64,
    /// Full length of the owned allocation, 0 for borrowed views.
    owned_len: usize,
    refs: RefCount,
}

// SAFETY: the raw base pointer is only dereferenced through the checked
// accessors below; plain access requires external synchronization per the
// single-writer contract, and the atomic family is safe for concurrent use.
unsafe impl Send for HeapStore {}
// SAFETY: as above.
unsafe impl Sync for HeapStore {}

impl HeapStore {
    /// Wraps an owned byte vector. The store takes ownership and drops the
    /// allocation on terminal release.
    #[must_use]
    pub fn wrap(data: Vec<u8>) -> Self {
        let boxed: Box<[u8]> = data.into_boxed_slice();
        let len = boxed.len();
        let base = Box::into_raw(boxed).cast::<u8>();
        Self {
            base: AtomicPtr::new(base),
            data_offset: 0,
            capacity: len as u64,
            owned_len: len,
            refs: RefCount::new(),
        }
    }

    /// A zero-filled store of `capacity` bytes.
    #[must_use]
    pub fn with_capacity(capacity: usize) -> Self {
        Self::wrap(vec![0u8; capacity])
    }

    /// Copies `data` into a fresh store.
    #[must_use]
    pub fn copy_of(data: &[u8]) -> Self {
        Self::wrap(data.to_vec())
    }

    /// A zero-copy view over a named field group of a host object, shifted
    /// by `padding` bytes.
    ///
    /// # Safety
    ///
    /// `base` must point at the host object and remain valid, unmoved and
    /// live for the whole lifetime of the returned store; the group's span
    /// must lie inside the host object.
    pub unsafe fn over_group(
        base: *mut u8,
        groups: &FieldGroups,
        group: &str,
        padding: u64,
    ) -> Result<Self> {
        let start = groups.start_of(group)?;
        let length = groups.length_of(group)?;
        if padding > length {
            return Err(BytesError::InvalidArgument(format!(
                "padding {padding} exceeds group length {length}"
            )));
        }
        Ok(Self {
            base: AtomicPtr::new(base),
            data_offset: start + padding,
            capacity: length - padding,
            owned_len: 0,
            refs: RefCount::new(),
        })
    }

    /// Offset of the first usable byte within the backing allocation.
    #[must_use]
    pub fn data_offset(&self) -> u64 {
        self.data_offset
    }

    #[inline]
    fn base(&self) -> Result<*mut u8> {
        let base = self.base.load(Ordering::Acquire);
        if base.is_null() {
            return Err(BytesError::Released);
        }
        Ok(base)
    }

    /// Address of logical `offset`, after release and bounds checks.
    #[inline]
    fn checked(&self, offset: u64, width: u64) -> Result<*mut u8> {
        let base = self.base()?;
        self.refs.ensure_not_released()?;
        if !config::bounds_check_disabled() && !self.is_inside(offset, width) {
            return Err(BytesError::overflow(offset, width, 0, self.capacity));
        }
        // SAFETY: offset + width <= capacity, inside the allocation.
        Ok(unsafe { base.add((self.data_offset + offset) as usize) })
    }

    fn free_backing(&self) {
        let base = self.base.swap(std::ptr::null_mut(), Ordering::AcqRel);
        if !base.is_null() && self.owned_len > 0 {
            // SAFETY: `base` came from Box::into_raw with this length and
            // is dropped exactly once (the swap above is the gate).
            drop(unsafe { Box::from_raw(std::ptr::slice_from_raw_parts_mut(base, self.owned_len)) });
        }
    }
}

impl Drop for HeapStore {
    fn drop(&mut self) {
        self.free_backing();
    }
}

impl RandomAccess for HeapStore {
    fn capacity(&self) -> u64 {
        self.capacity
    }

    fn is_heap(&self) -> bool {
        true
    }

    fn is_native(&self) -> bool {
        false
    }

    fn address_for_read(&self, _offset: u64) -> Result<*const u8> {
        Err(BytesError::Unsupported("raw address of a heap store"))
    }

    fn address_for_write(&self, _offset: u64) -> Result<*mut u8> {
        Err(BytesError::Unsupported("raw address of a heap store"))
    }

    fn ensure_not_released(&self) -> Result<()> {
        self.base()?;
        self.refs.ensure_not_released()
    }
}

impl RandomInput for HeapStore {
    fn read_u8(&self, offset: u64) -> Result<u8> {
        // SAFETY: `checked` bounds the access.
        Ok(unsafe { mem::read_u8(self.checked(offset, 1)?) })
    }

    fn read_i16(&self, offset: u64) -> Result<i16> {
        // SAFETY: as above.
        Ok(unsafe { mem::read_i16(self.checked(offset, 2)?) })
    }

    fn read_i32(&self, offset: u64) -> Result<i32> {
        // SAFETY: as above.
        Ok(unsafe { mem::read_i32(self.checked(offset, 4)?) })
    }

    fn read_i64(&self, offset: u64) -> Result<i64> {
        // SAFETY: as above.
        Ok(unsafe { mem::read_i64(self.checked(offset, 8)?) })
    }

    fn read_f32(&self, offset: u64) -> Result<f32> {
        // SAFETY: as above.
        Ok(unsafe { mem::read_f32(self.checked(offset, 4)?) })
    }

    fn read_f64(&self, offset: u64) -> Result<f64> {
        // SAFETY: as above.
        Ok(unsafe { mem::read_f64(self.checked(offset, 8)?) })
    }

    fn read_u8_volatile(&self, offset: u64) -> Result<u8> {
        // SAFETY: as above.
        Ok(unsafe { mem::read_u8_volatile(self.checked(offset, 1)?) })
    }

    fn read_i16_volatile(&self, offset: u64) -> Result<i16> {
        // SAFETY: as above.
        Ok(unsafe { mem::read_i16_volatile(self.checked(offset, 2)?) })
    }

    fn read_i32_volatile(&self, offset: u64) -> Result<i32> {
        // SAFETY: as above.
        Ok(unsafe { mem::read_i32_volatile(self.checked(offset, 4)?) })
    }

    fn read_i64_volatile(&self, offset: u64) -> Result<i64> {
        // SAFETY: as above.
        Ok(unsafe { mem::read_i64_volatile(self.checked(offset, 8)?) })
    }

    fn read_into(&self, offset: u64, dst: &mut [u8]) -> Result<Option<usize>> {
        self.ensure_not_released()?;
        let left = self.read_limit().saturating_sub(offset).min(dst.len() as u64) as usize;
        if left == 0 {
            return Ok(None);
        }
        let src = self.checked(offset, left as u64)?;
        // SAFETY: `src` covers `left` readable bytes; `dst` is a distinct
        // slice.
        unsafe { mem::copy(src, dst.as_mut_ptr(), left) };
        Ok(Some(left))
    }

    unsafe fn native_read(&self, offset: u64, address: *mut u8, len: u64) -> Result<()> {
        let src = self.checked(offset, len)?;
        // SAFETY: bounds checked above; caller vouches for `address`.
        unsafe { mem::copy(src, address, len as usize) };
        Ok(())
    }

    fn read_view_ptr(&self, offset: u64) -> Option<*const u8> {
        let base = self.base.load(Ordering::Acquire);
        if base.is_null() {
            return None;
        }
        // SAFETY: base is live; the caller owns range validation.
        Some(unsafe { base.add((self.data_offset + offset) as usize) }.cast_const())
    }
}

impl RandomOutput for HeapStore {
    fn write_u8(&self, offset: u64, v: u8) -> Result<()> {
        // SAFETY: `checked` bounds the access.
        unsafe { mem::write_u8(self.checked(offset, 1)?, v) };
        Ok(())
    }

    fn write_i16(&self, offset: u64, v: i16) -> Result<()> {
        // SAFETY: as above.
        unsafe { mem::write_i16(self.checked(offset, 2)?, v) };
        Ok(())
    }

    fn write_i32(&self, offset: u64, v: i32) -> Result<()> {
        // SAFETY: as above.
        unsafe { mem::write_i32(self.checked(offset, 4)?, v) };
        Ok(())
    }

    fn write_i64(&self, offset: u64, v: i64) -> Result<()> {
        // SAFETY: as above.
        unsafe { mem::write_i64(self.checked(offset, 8)?, v) };
        Ok(())
    }

    fn write_f32(&self, offset: u64, v: f32) -> Result<()> {
        // SAFETY: as above.
        unsafe { mem::write_f32(self.checked(offset, 4)?, v) };
        Ok(())
    }

    fn write_f64(&self, offset: u64, v: f64) -> Result<()> {
        // SAFETY: as above.
        unsafe { mem::write_f64(self.checked(offset, 8)?, v) };
        Ok(())
    }

    fn write_i32_ordered(&self, offset: u64, v: i32) -> Result<()> {
        // SAFETY: as above.
        unsafe { mem::write_i32_ordered(self.checked(offset, 4)?, v) };
        Ok(())
    }

    fn write_i64_ordered(&self, offset: u64, v: i64) -> Result<()> {
        // SAFETY: as above.
        unsafe { mem::write_i64_ordered(self.checked(offset, 8)?, v) };
        Ok(())
    }

    fn write_i32_volatile(&self, offset: u64, v: i32) -> Result<()> {
        // SAFETY: as above.
        unsafe { mem::write_i32_volatile(self.checked(offset, 4)?, v) };
        Ok(())
    }

    fn write_i64_volatile(&self, offset: u64, v: i64) -> Result<()> {
        // SAFETY: as above.
        unsafe { mem::write_i64_volatile(self.checked(offset, 8)?, v) };
        Ok(())
    }

    fn write_from(&self, offset: u64, src: &[u8]) -> Result<()> {
        let dst = self.checked(offset, src.len() as u64)?;
        // SAFETY: bounds checked; `src` is a distinct slice.
        unsafe { mem::copy(src.as_ptr(), dst, src.len()) };
        Ok(())
    }

    fn compare_and_swap_i32(&self, offset: u64, expected: i32, value: i32) -> Result<bool> {
        // SAFETY: `checked` bounds the access; 4-byte alignment is the
        // caller's contract for the atomic family.
        Ok(unsafe { mem::compare_and_swap_i32(self.checked(offset, 4)?, expected, value) })
    }

    fn compare_and_swap_i64(&self, offset: u64, expected: i64, value: i64) -> Result<bool> {
        // SAFETY: as above, 8-byte alignment.
        Ok(unsafe { mem::compare_and_swap_i64(self.checked(offset, 8)?, expected, value) })
    }

    fn test_and_set_i32(&self, offset: u64, expected: i32, value: i32) -> Result<()> {
        // SAFETY: as above.
        unsafe { mem::test_and_set_i32(self.checked(offset, 4)?, expected, value) };
        Ok(())
    }

    fn test_and_set_i64(&self, offset: u64, expected: i64, value: i64) -> Result<()> {
        // SAFETY: as above.
        unsafe { mem::test_and_set_i64(self.checked(offset, 8)?, expected, value) };
        Ok(())
    }

    fn zero_out(&self, begin: u64, end: u64) -> Result<()> {
        let begin = begin.max(self.start());
        let end = end.min(self.capacity());
        if end <= begin {
            return Ok(());
        }
        let addr = self.checked(begin, end - begin)?;
        // SAFETY: the clamped range is inside the allocation.
        unsafe { super::zero_fill_range(addr, end - begin) };
        Ok(())
    }

    unsafe fn native_write(&self, address: *const u8, offset: u64, len: u64) -> Result<()> {
        let dst = self.checked(offset, len)?;
        // SAFETY: bounds checked above; caller vouches for `address`.
        unsafe { mem::copy(address, dst, len as usize) };
        Ok(())
    }

    fn move_range(&self, from: u64, to: u64, len: u64) -> Result<()> {
        if len == 0 {
            return Ok(());
        }
        let src = self.checked(from, len)?;
        let dst = self.checked(to, len)?;
        // SAFETY: both ranges bounds-checked; copy_within handles overlap.
        unsafe { mem::copy_within(src, dst, len as usize) };
        Ok(())
    }
}

impl ByteStore for HeapStore {
    fn ref_count(&self) -> i32 {
        self.refs.ref_count()
    }

    fn reserve(&self, owner: &OwnerToken) -> Result<()> {
        self.refs.reserve(owner)
    }

    fn try_reserve(&self, owner: &OwnerToken) -> bool {
        self.refs.try_reserve(owner)
    }

    fn release(&self, owner: &OwnerToken) -> Result<()> {
        if self.refs.release(owner)? {
            self.free_backing();
        }
        Ok(())
    }

    fn release_last(&self, owner: &OwnerToken) -> Result<()> {
        if self.refs.release_last(owner)? {
            self.free_backing();
        }
        Ok(())
    }

    fn reserve_transfer(&self, from: &OwnerToken, to: &OwnerToken) -> Result<()> {
        self.refs.reserve_transfer(from, to)
    }
}

impl PartialEq for HeapStore {
    fn eq(&self, other: &Self) -> bool {
        compare::content_equals(self, other).unwrap_or(false)
    }
}

impl std::hash::Hash for HeapStore {
    fn hash<H: std::hash::Hasher>(&self, state: &mut H) {
        state.write_i32(hash::hash32(self).unwrap_or(0));
    }
}

impl fmt::Debug for HeapStore {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("HeapStore")
            .field("capacity", &self.capacity)
            .field("data_offset", &self.data_offset)
            .field("refs", &self.refs.ref_count())
            .field("hash32", &hash::hash32(self).unwrap_or(0))
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::refcount::OwnerToken;

    #[test]
    fn primitive_roundtrip_at_offsets() {
        let store = HeapStore::with_capacity(1024);
        store.write_u8(1, 0x0A).unwrap();
        store.write_i16(2, 0xAA).unwrap();
        store.write_i32(4, 0xABCD).unwrap();
        store.write_i64(8, 0x00FF_ABCD).unwrap();
        store.write_f32(16, 255.0).unwrap();
        store.write_f64(20, 16_777_215.0).unwrap();

        assert_eq!(store.read_u8(1).unwrap(), 0x0A);
        assert_eq!(store.read_i16(2).unwrap(), 0xAA);
        assert_eq!(store.read_i32(4).unwrap(), 0xABCD);
        assert_eq!(store.read_i64(8).unwrap(), 0x00FF_ABCD);
        assert_eq!(store.read_f32(16).unwrap(), 255.0);
        assert_eq!(store.read_f64(20).unwrap(), 16_777_215.0);
    }

    #[test]
    fn out_of_bounds_reports_window() {
        let store = HeapStore::with_capacity(16);
        let err = store.read_i64(9).unwrap_err();
        assert_eq!(err, BytesError::overflow(9, 8, 0, 16));
        let err = store.write_i32(13, 1).unwrap_err();
        assert_eq!(err, BytesError::overflow(13, 4, 0, 16));
    }

    #[test]
    fn bulk_roundtrip_and_capped_read() {
        let store = HeapStore::with_capacity(64);
        let data: Vec<u8> = (0u8..48).collect();
        store.write_from(8, &data).unwrap();

        let mut out = vec![0u8; 48];
        assert_eq!(store.read_into(8, &mut out).unwrap(), Some(48));
        assert_eq!(out, data);

        // Read beyond the limit is capped.
        let mut tail = [0u8; 32];
        assert_eq!(store.read_into(48, &mut tail).unwrap(), Some(16));
        // Nothing readable at the end.
        assert_eq!(store.read_into(64, &mut tail).unwrap(), None);
    }

    #[test]
    fn move_range_is_overlap_safe() {
        let store = HeapStore::with_capacity(32);
        store.write_from(0, &[1, 2, 3, 4, 5, 6, 7, 8]).unwrap();
        store.move_range(0, 4, 8).unwrap();
        let mut out = [0u8; 8];
        store.read_into(4, &mut out).unwrap();
        assert_eq!(out, [1, 2, 3, 4, 5, 6, 7, 8]);
    }

    #[test]
    fn zero_out_clears_range() {
        let store = HeapStore::wrap(vec![0xFF; 64]);
        store.zero_out(5, 41).unwrap();
        for i in 0..64u64 {
            let expect = if (5..41).contains(&i) { 0 } else { 0xFF };
            assert_eq!(store.read_u8(i).unwrap(), expect, "byte {i}");
        }
    }

    #[test]
    fn release_blocks_access() {
        let store = HeapStore::with_capacity(8);
        store.write_i64(0, 42).unwrap();
        store.release(&OwnerToken::INIT).unwrap();
        assert_eq!(store.read_i64(0).unwrap_err(), BytesError::Released);
        assert_eq!(store.write_u8(0, 1).unwrap_err(), BytesError::Released);
    }

    #[test]
    fn addresses_are_unsupported() {
        let store = HeapStore::with_capacity(8);
        assert!(matches!(
            store.address_for_read(0),
            Err(BytesError::Unsupported(_))
        ));
    }

    #[test]
    fn find_scans_the_readable_window() {
        let store = HeapStore::copy_of(&[5, 6, 7, 8, 7, 0]);
        assert_eq!(store.find(0, 7).unwrap(), Some(2));
        assert_eq!(store.find(3, 7).unwrap(), Some(4));
        assert_eq!(store.find(0, 9).unwrap(), None);
    }

    #[test]
    fn fmix_folds_deterministically() {
        let store = HeapStore::copy_of(&(0u8..32).collect::<Vec<_>>());
        let a = store.fmix(0, 13).unwrap();
        assert_eq!(a, store.fmix(0, 13).unwrap());
        assert_ne!(a, store.fmix(0, 14).unwrap());
        assert_ne!(a, store.fmix(1, 13).unwrap());
    }

    #[test]
    fn add_and_get_accumulates() {
        let store = HeapStore::with_capacity(16);
        for _ in 0..1000 {
            store.add_and_get_i32(0, 1).unwrap();
        }
        assert_eq!(store.read_i32_volatile(0).unwrap(), 1000);
        assert_eq!(store.add_and_get_i32(0, 0).unwrap(), 1000);

        assert_eq!(store.add_and_get_i64(8, -5).unwrap(), -5);
        assert_eq!(store.read_i64_volatile(8).unwrap(), -5);
    }
}
