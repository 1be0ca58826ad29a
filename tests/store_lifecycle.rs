//! Store lifecycle and ownership scenarios.
//!
//! Coverage:
//! - reserve/release pairing and double-release detection
//! - terminal release freeing the region and blocking later access
//! - reservation transfer during elastic growth
//! - the null store sentinel
//! - zero-copy field-group views over a host object

use std::sync::Arc;

use zbuf::test_utils::init_test_logging;
use zbuf::{
    ByteStore, Bytes, FieldGroups, FieldGroupsBuilder, GroupLayout, HeapStore, NativeStore,
    NullStore, OwnerToken, RandomAccess, RandomInput, RandomOutput, StreamOutput,
};
use zbuf::{test_complete, test_phase};

fn init_test(test_name: &str) {
    init_test_logging();
    test_phase!(test_name);
}

#[test]
fn reserve_release_restores_state() {
    init_test("reserve_release_restores_state");

    let store = NativeStore::fixed_capacity(128).expect("alloc");
    assert_eq!(store.ref_count(), 1);

    let owner = OwnerToken::new("reader");
    store.reserve(&owner).expect("reserve");
    assert_eq!(store.ref_count(), 2);
    store.release(&owner).expect("release");
    assert_eq!(store.ref_count(), 1);

    // The same owner cannot release twice (diagnosed while owner tracking
    // is active).
    #[cfg(debug_assertions)]
    {
        assert!(store.release(&owner).is_err());
        assert_eq!(store.ref_count(), 1);
    }

    store.release_last(&OwnerToken::INIT).expect("terminal");
    assert_eq!(store.ref_count(), 0);

    test_complete!("reserve_release_restores_state");
}

#[test]
fn terminal_release_blocks_every_operation() {
    init_test("terminal_release_blocks_every_operation");

    let store = HeapStore::copy_of(&[1, 2, 3, 4]);
    store.release(&OwnerToken::INIT).expect("terminal");

    assert!(store.read_u8(0).is_err());
    assert!(store.write_u8(0, 9).is_err());
    assert!(store.read_into(0, &mut [0u8; 4]).is_err());
    assert!(store.ensure_not_released().is_err());
    assert!(!store.try_reserve(&OwnerToken::new("late")));

    test_complete!("terminal_release_blocks_every_operation");
}

#[test]
fn growth_transfers_the_cursor_reservation() {
    init_test("growth_transfers_the_cursor_reservation");

    let mut bytes = Bytes::elastic_with(16, 1 << 16).expect("elastic");
    let first_store = Arc::clone(bytes.store());
    assert_eq!(first_store.ref_count(), 1);

    // Force growth past the first store's allocation.
    bytes.put_slice(&[0xAB; 64]).expect("grow");

    let second_store = Arc::clone(bytes.store());
    assert!(!Arc::ptr_eq(&first_store, &second_store), "store swapped");
    assert_eq!(second_store.ref_count(), 1, "cursor holds the new store");
    assert_eq!(first_store.ref_count(), 0, "old store fully released");
    assert!(first_store.read_u8(0).is_err(), "old store is gone");

    drop(bytes);
    assert_eq!(second_store.ref_count(), 0);

    test_complete!("growth_transfers_the_cursor_reservation");
}

#[test]
fn null_store_is_inert() {
    init_test("null_store_is_inert");

    let null = NullStore::instance();
    assert_eq!(null.capacity(), 0);
    assert!(!null.is_heap());
    assert!(!null.is_native());
    assert_eq!(null.ref_count(), 0);
    assert!(null.read_u8(0).is_err());
    assert!(null.write_u8(0, 1).is_err());
    assert!(null.address_for_read(0).is_err());

    // Lifecycle calls neither fail nor count.
    let owner = OwnerToken::new("anyone");
    null.reserve(&owner).expect("no-op");
    null.release(&owner).expect("no-op");
    assert_eq!(null.ref_count(), 0);

    test_complete!("null_store_is_inert");
}

#[repr(C)]
struct Ticker {
    sequence: u64,
    bid: i64,
    ask: i64,
    flags: u32,
}

impl GroupLayout for Ticker {
    fn field_groups() -> FieldGroups {
        FieldGroupsBuilder::new()
            .field("sequence", std::mem::offset_of!(Ticker, sequence) as u64, 8)
            .grouped("bid", "quote", std::mem::offset_of!(Ticker, bid) as u64, 8)
            .grouped("ask", "quote", std::mem::offset_of!(Ticker, ask) as u64, 8)
            .grouped("flags", "state", std::mem::offset_of!(Ticker, flags) as u64, 4)
            .build()
            .expect("valid layout")
    }
}

#[test]
fn field_group_store_is_zero_copy() {
    init_test("field_group_store_is_zero_copy");

    let groups = FieldGroups::lookup::<Ticker>();
    assert_eq!(groups.length_of("quote").expect("span"), 16);

    let mut ticker = Ticker {
        sequence: 1,
        bid: 0,
        ask: 0,
        flags: 0,
    };
    let base = std::ptr::from_mut(&mut ticker).cast::<u8>();
    // SAFETY: `ticker` outlives the store and is not moved while the view
    // is alive.
    let store = unsafe { HeapStore::over_group(base, &groups, "quote", 0) }.expect("view");
    store.write_i64(0, 101).expect("bid");
    store.write_i64(8, 102).expect("ask");
    store.release(&OwnerToken::INIT).expect("drop view");

    assert_eq!(ticker.bid, 101, "write went straight into the host object");
    assert_eq!(ticker.ask, 102);
    assert_eq!(ticker.sequence, 1, "fields outside the group untouched");

    test_complete!("field_group_store_is_zero_copy");
}

#[test]
fn lazy_native_cursor_reads_what_it_wrote() {
    init_test("lazy_native_cursor_reads_what_it_wrote");

    let mut bytes = Bytes::lazy_fixed(4096).expect("lazy");
    assert!(bytes.is_native());
    bytes.put_i64(42).expect("write");
    assert_eq!(bytes.read_i64(0).expect("read"), 42);

    test_complete!("lazy_native_cursor_reads_what_it_wrote");
}
