//! Content equality between byte stores.
//!
//! Two stores are content-equal when their readable windows hold the same
//! bytes, where a longer window may extend past a shorter one only with
//! zero bytes (zero-extension equality). Comparison never allocates.
//!
//! When both stores expose contiguous memory and their windows line up, a
//! single slice comparison (the platform memcmp, vectorized by the
//! compiler) settles it; otherwise a word-then-byte scalar loop runs, using
//! raw views when both sides provide them and the checked offset API when
//! not.

use crate::config;
use crate::error::Result;
use crate::mem;
use crate::traits::RandomInput;

/// Compares the readable content of two stores.
///
/// Fails with `Released` when either store has already been released.
pub fn content_equals(a: &dyn RandomInput, b: &dyn RandomInput) -> Result<bool> {
    a.ensure_not_released()?;
    b.ensure_not_released()?;

    let alen = a.read_available();
    let blen = b.read_available();

    if !config::vectorized_equals_disabled()
        && alen == blen
        && alen == a.read_remaining()
        && blen == b.read_remaining()
        && alen > 7
        && alen <= i32::MAX as u64
    {
        if let (Some(pa), Some(pb)) = (
            a.read_view_ptr(a.read_position()),
            b.read_view_ptr(b.read_position()),
        ) {
            // SAFETY: both windows are live, reserved and `alen` bytes
            // long; the slices exist only for the comparison.
            let (sa, sb) = unsafe {
                (
                    std::slice::from_raw_parts(pa, alen as usize),
                    std::slice::from_raw_parts(pb, alen as usize),
                )
            };
            return Ok(sa == sb);
        }
    }

    if alen < blen {
        equal_loop(b, a, blen, alen)
    } else {
        equal_loop(a, b, alen, blen)
    }
}

/// Scalar comparison: `long` has at least as many readable bytes as
/// `short`; the surplus must be zero.
fn equal_loop(long: &dyn RandomInput, short: &dyn RandomInput, llen: u64, slen: u64) -> Result<bool> {
    let lpos = long.read_position();
    let spos = short.read_position();

    if let (Some(lp), Some(sp)) = (long.read_view_ptr(lpos), short.read_view_ptr(spos)) {
        // SAFETY: both views were validated readable for their windows by
        // the caller; every access below stays inside them.
        return Ok(unsafe { equal_loop_unchecked(lp, sp, llen, slen) });
    }

    let mut i = 0u64;
    while i + 8 <= slen {
        if long.read_i64(lpos + i)? != short.read_i64(spos + i)? {
            return Ok(false);
        }
        i += 8;
    }
    while i < slen {
        if long.read_u8(lpos + i)? != short.read_u8(spos + i)? {
            return Ok(false);
        }
        i += 1;
    }
    while i + 8 <= llen {
        if long.read_i64(lpos + i)? != 0 {
            return Ok(false);
        }
        i += 8;
    }
    while i < llen {
        if long.read_u8(lpos + i)? != 0 {
            return Ok(false);
        }
        i += 1;
    }
    Ok(true)
}

/// # Safety
///
/// `lp` must be readable for `llen` bytes and `sp` for `slen`, with
/// `llen >= slen`.
unsafe fn equal_loop_unchecked(lp: *const u8, sp: *const u8, llen: u64, slen: u64) -> bool {
    debug_assert!(llen >= slen);
    let mut i = 0u64;
    // SAFETY: all offsets below stay under the caller-guaranteed lengths.
    unsafe {
        while i + 8 <= slen {
            if mem::read_i64(lp.add(i as usize)) != mem::read_i64(sp.add(i as usize)) {
                return false;
            }
            i += 8;
        }
        while i < slen {
            if mem::read_u8(lp.add(i as usize)) != mem::read_u8(sp.add(i as usize)) {
                return false;
            }
            i += 1;
        }
        while i + 8 <= llen {
            if mem::read_i64(lp.add(i as usize)) != 0 {
                return false;
            }
            i += 8;
        }
        while i < llen {
            if mem::read_u8(lp.add(i as usize)) != 0 {
                return false;
            }
            i += 1;
        }
    }
    true
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::refcount::OwnerToken;
    use crate::store::{HeapStore, NativeStore};
    use crate::traits::ByteStore;

    #[test]
    fn equal_content_compares_equal() {
        let a = HeapStore::copy_of(&[1, 2, 3, 4, 5, 6, 7, 8, 9]);
        let b = NativeStore::copy_of(&[1, 2, 3, 4, 5, 6, 7, 8, 9]).unwrap();
        assert!(content_equals(&a, &b).unwrap());
        assert!(content_equals(&b, &a).unwrap());
        assert!(content_equals(&a, &a).unwrap());
    }

    #[test]
    fn first_difference_breaks_equality() {
        let a = HeapStore::copy_of(&[1, 2, 3, 4, 5, 6, 7, 8, 9]);
        let b = HeapStore::copy_of(&[1, 2, 3, 4, 5, 6, 7, 8, 10]);
        assert!(!content_equals(&a, &b).unwrap());
    }

    #[test]
    fn zero_extension_rule() {
        let a = HeapStore::copy_of(&[1, 2, 3, 4, 5]);
        let b = HeapStore::copy_of(&[1, 2, 3, 4, 5, 0, 0, 0]);
        assert!(content_equals(&a, &b).unwrap());
        assert!(content_equals(&b, &a).unwrap());

        let c = HeapStore::copy_of(&[1, 2, 3, 4, 5, 0, 9, 0]);
        assert!(!content_equals(&a, &c).unwrap());
    }

    #[test]
    fn long_windows_hit_the_word_loop() {
        let data: Vec<u8> = (0..100u8).collect();
        let a = HeapStore::copy_of(&data);
        let b = NativeStore::copy_of(&data).unwrap();
        assert!(content_equals(&a, &b).unwrap());

        let mut tweaked = data;
        tweaked[83] ^= 1;
        let c = HeapStore::copy_of(&tweaked);
        assert!(!content_equals(&a, &c).unwrap());
    }

    #[test]
    fn released_store_is_rejected() {
        let a = HeapStore::copy_of(&[1]);
        let b = HeapStore::copy_of(&[1]);
        b.release(&OwnerToken::INIT).unwrap();
        assert!(content_equals(&a, &b).is_err());
    }

    #[test]
    fn empty_windows_are_equal() {
        let a = HeapStore::wrap(Vec::new());
        let b = HeapStore::wrap(Vec::new());
        assert!(content_equals(&a, &b).unwrap());
    }
}
