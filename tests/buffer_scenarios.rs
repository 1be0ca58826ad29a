//! End-to-end buffer scenarios.
//!
//! Coverage:
//! - random-access round trip over an on-heap cursor
//! - sequential cursor discipline (positions advance by width)
//! - elastic growth under bulk writes with content preservation
//! - content equality under the zero-extension rule
//! - single-writer atomic counter via add-and-get
//! - content hash stability and sensitivity

use zbuf::test_utils::{init_test_logging, TestRng, DEFAULT_TEST_SEED};
use zbuf::{
    compare, hash, ByteStore, Bytes, HeapStore, NativeStore, RandomAccess, RandomInput,
    RandomOutput, StreamInput, StreamOutput,
};
use zbuf::{assert_with_log, test_complete, test_phase};

fn init_test(test_name: &str) {
    init_test_logging();
    test_phase!(test_name);
}

#[test]
fn heap_roundtrip_at_offsets() {
    init_test("heap_roundtrip_at_offsets");

    let bytes = Bytes::wrap(vec![0u8; 1024]).expect("wrap");

    bytes.write_u8(1, 0x0A).expect("u8");
    bytes.write_i16(2, 0xAA).expect("i16");
    bytes.write_i32(4, 0xABCD).expect("i32");
    bytes.write_i64(8, 0x00FF_ABCD).expect("i64");
    bytes.write_f32(16, 255.0).expect("f32");
    bytes.write_f64(20, 16_777_215.0).expect("f64");

    let b = bytes.read_u8(1).expect("read u8");
    assert_with_log!(b == 0x0A, "u8 at 1", 0x0Au8, b);
    let s = bytes.read_i16(2).expect("read i16");
    assert_with_log!(s == 0xAA, "i16 at 2", 0xAAi16, s);
    let i = bytes.read_i32(4).expect("read i32");
    assert_with_log!(i == 0xABCD, "i32 at 4", 0xABCDi32, i);
    let l = bytes.read_i64(8).expect("read i64");
    assert_with_log!(l == 0x00FF_ABCD, "i64 at 8", 0x00FF_ABCDi64, l);
    let f = bytes.read_f32(16).expect("read f32");
    assert_with_log!(f == 255.0, "f32 at 16", 255.0f32, f);
    let d = bytes.read_f64(20).expect("read f64");
    assert_with_log!(d == 16_777_215.0, "f64 at 20", 16_777_215.0f64, d);

    let limit = bytes.write_limit();
    assert_with_log!(limit == 1024, "write limit unchanged", 1024u64, limit);

    test_complete!("heap_roundtrip_at_offsets");
}

#[test]
fn sequential_cursor_discipline() {
    init_test("sequential_cursor_discipline");

    let mut bytes = Bytes::wrap(vec![0u8; 64]).expect("wrap");
    bytes.put_u8(0x0A).expect("u8");
    bytes.put_i16(0xAA).expect("i16");
    bytes.put_i32(0xABCD).expect("i32");
    bytes.put_i64(0x00FF_ABCD).expect("i64");
    bytes.put_f32(255.0).expect("f32");
    bytes.put_f64(16_777_215.0).expect("f64");

    let wp = bytes.write_position();
    assert_with_log!(wp == 27, "write position", 27u64, wp);
    let rp = bytes.read_position();
    assert_with_log!(rp == 0, "read position", 0u64, rp);

    assert_eq!(bytes.get_u8().expect("u8"), 0x0A);
    assert_eq!(bytes.get_i16().expect("i16"), 0xAA);
    assert_eq!(bytes.get_i32().expect("i32"), 0xABCD);
    assert_eq!(bytes.get_i64().expect("i64"), 0x00FF_ABCD);
    assert_eq!(bytes.get_f32().expect("f32"), 255.0);
    assert_eq!(bytes.get_f64().expect("f64"), 16_777_215.0);

    let rp = bytes.read_position();
    assert_with_log!(rp == 27, "read caught up", 27u64, rp);

    test_complete!("sequential_cursor_discipline");
}

#[test]
fn elastic_growth_bulk_roundtrip() {
    init_test("elastic_growth_bulk_roundtrip");

    let mut bytes = Bytes::elastic_with(1024, 65536).expect("elastic");
    let mut rng = TestRng::new(DEFAULT_TEST_SEED);
    let data = rng.bytes(5000);

    bytes.put_slice(&data).expect("bulk write");
    let wp = bytes.write_position();
    assert_with_log!(wp == 5000, "write position", 5000u64, wp);
    assert_with_log!(bytes.size() >= 5000, "backing grew", 5000u64, bytes.size());

    let mut out = vec![0u8; 5000];
    let read = bytes.get_slice(&mut out).expect("bulk read");
    assert_with_log!(read == Some(5000), "bytes read", Some(5000usize), read);
    assert_with_log!(out == data, "content preserved", data.len(), out.len());

    test_complete!("elastic_growth_bulk_roundtrip");
}

#[test]
fn content_equality_with_trailing_zeros() {
    init_test("content_equality_with_trailing_zeros");

    let a = HeapStore::copy_of(&[1, 2, 3, 4, 5]);
    let b = HeapStore::copy_of(&[1, 2, 3, 4, 5, 0, 0, 0]);
    let eq = compare::content_equals(&a, &b).expect("compare");
    assert_with_log!(eq, "zero-extended tails are equal", true, eq);

    let c = HeapStore::copy_of(&[1, 2, 3, 4, 5, 0, 0, 1]);
    let eq = compare::content_equals(&a, &c).expect("compare");
    assert_with_log!(!eq, "non-zero tail differs", false, eq);

    // Symmetry and agreement across backings.
    let d = NativeStore::copy_of(&[1, 2, 3, 4, 5]).expect("native");
    assert!(compare::content_equals(&d, &b).expect("compare"));
    assert!(compare::content_equals(&b, &d).expect("compare"));

    test_complete!("content_equality_with_trailing_zeros");
}

#[test]
fn single_writer_counter_accumulates() {
    init_test("single_writer_counter_accumulates");

    let store = NativeStore::fixed_capacity(64).expect("alloc");
    for _ in 0..1_000_000 {
        store.add_and_get_i32(0, 1).expect("add");
    }
    let total = store.read_i32_volatile(0).expect("volatile read");
    assert_with_log!(total == 1_000_000, "counter total", 1_000_000i32, total);

    // A no-op add observes without mutating.
    let same = store.add_and_get_i32(0, 0).expect("add zero");
    assert_with_log!(same == 1_000_000, "add zero", 1_000_000i32, same);

    test_complete!("single_writer_counter_accumulates");
}

#[test]
fn hash_stability_and_sensitivity() {
    init_test("hash_stability_and_sensitivity");

    let data: Vec<u8> = (0u8..32).collect();
    let store = HeapStore::copy_of(&data);
    let h1 = hash::hash(&store).expect("hash");
    let h1_again = hash::hash(&store).expect("hash");
    assert_with_log!(h1 == h1_again, "hash is stable", h1, h1_again);

    // The same bytes behind a native store hash identically.
    let native = NativeStore::copy_of(&data).expect("native");
    let hn = hash::hash(&native).expect("hash");
    assert_with_log!(hn == h1, "backing-independent", h1, hn);

    for i in 0..32 {
        let mut mutated = data.clone();
        mutated[i] ^= 1;
        let hm = hash::hash(&HeapStore::copy_of(&mutated)).expect("hash");
        assert!(hm != h1, "mutating byte {i} must change the hash");
    }

    let folded = hash::hash32(&store).expect("hash32");
    assert_with_log!(
        folded == (h1 ^ (h1 >> 32)) as i32,
        "32-bit fold",
        (h1 ^ (h1 >> 32)) as i32,
        folded
    );

    test_complete!("hash_stability_and_sensitivity");
}

#[test]
fn boundary_writes_and_lenient_reads() {
    init_test("boundary_writes_and_lenient_reads");

    // A write one byte past what fits fails on a fixed cursor.
    let mut fixed = Bytes::wrap(vec![0u8; 16]).expect("wrap");
    fixed.put_i64(1).expect("first");
    fixed.put_i64(2).expect("second");
    assert!(fixed.put_u8(3).is_err(), "full fixed cursor rejects writes");

    // The same write succeeds on an elastic cursor within capacity.
    let mut elastic = Bytes::elastic_with(16, 64).expect("elastic");
    elastic.put_i64(1).expect("first");
    elastic.put_i64(2).expect("second");
    elastic.put_u8(3).expect("elastic grows instead");

    // Lenient reads yield zero past the limit; strict reads fail.
    let mut reader = Bytes::wrap(vec![0u8; 8]).expect("wrap");
    reader.put_i32(0x55).expect("write");
    reader.set_lenient(true);
    assert_eq!(reader.get_i32().expect("in range"), 0x55);
    assert_eq!(reader.get_i64().expect("lenient"), 0);
    reader.set_lenient(false);
    assert!(reader.get_u8().is_err());

    test_complete!("boundary_writes_and_lenient_reads");
}

#[test]
fn move_and_zero_out_roundtrip() {
    init_test("move_and_zero_out_roundtrip");

    let store = HeapStore::with_capacity(64);
    let mut rng = TestRng::new(7);
    let data = rng.bytes(24);
    store.write_from(0, &data).expect("write");

    store.move_range(0, 32, 24).expect("move");
    let mut out = vec![0u8; 24];
    store.read_into(32, &mut out).expect("read back");
    assert_with_log!(out == data, "moved content", data.len(), out.len());

    store.zero_out(0, 24).expect("zero");
    for i in 0..24 {
        assert_eq!(store.read_u8(i).expect("read"), 0, "byte {i} zeroed");
    }

    test_complete!("move_and_zero_out_roundtrip");
}
