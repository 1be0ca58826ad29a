//! Reference counting with owner tokens.
//!
//! Stores are shared by every cursor (or user handle) that has reserved a
//! reference on them. The count starts at one, held by [`OwnerToken::INIT`]
//! on behalf of whoever constructed the store. When the count reaches zero
//! the owning store runs its release action exactly once and the backing
//! memory goes away; any later access fails with
//! [`BytesError::Released`](crate::error::BytesError::Released).
//!
//! Owner tokens are opaque: the count itself never depends on *which* token
//! reserved, but in debug builds (or with `ZBUF_RESOURCE_TRACING` set) the
//! registry of outstanding owner ids is kept so double releases and leaked
//! reservations are reported with the offending owner's label.

use std::fmt;
use std::sync::atomic::{AtomicBool, AtomicI32, AtomicU64, Ordering};

use parking_lot::Mutex;
use smallvec::SmallVec;

use crate::config;
use crate::error::{BytesError, Result};

static NEXT_OWNER_ID: AtomicU64 = AtomicU64::new(1);
static NEXT_LISTENER_ID: AtomicU64 = AtomicU64::new(1);

/// Opaque identity of a reference holder.
///
/// Two tokens are never equal unless one was copied from the other; a token
/// carries a label purely for diagnostics.
#[derive(Clone, PartialEq, Eq, Hash)]
pub struct OwnerToken {
    id: u64,
    label: &'static str,
}

impl OwnerToken {
    /// The implicit owner of a freshly constructed resource.
    pub const INIT: Self = Self {
        id: 0,
        label: "init",
    };

    /// Creates a distinct owner token with a diagnostic label.
    #[must_use]
    pub fn new(label: &'static str) -> Self {
        Self {
            id: NEXT_OWNER_ID.fetch_add(1, Ordering::Relaxed),
            label,
        }
    }

    /// The token's unique id (0 for [`OwnerToken::INIT`]).
    #[must_use]
    pub fn id(&self) -> u64 {
        self.id
    }
}

impl fmt::Debug for OwnerToken {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "OwnerToken({}:{})", self.label, self.id)
    }
}

type ListenerFn = Box<dyn Fn(i32) + Send + Sync>;

/// A thread-safe reference count with owner bookkeeping.
///
/// The embedding type decides what "reaching zero" means: [`release`]
/// reports `true` exactly once, and the embedder performs its cleanup then.
///
/// [`release`]: RefCount::release
pub struct RefCount {
    count: AtomicI32,
    zero_observed: AtomicBool,
    owners: Option<Mutex<SmallVec<[u64; 4]>>>,
    listeners: Mutex<Vec<(u64, ListenerFn)>>,
}

impl RefCount {
    /// A count of one, held by [`OwnerToken::INIT`].
    #[must_use]
    pub fn new() -> Self {
        let tracked = cfg!(debug_assertions) || config::resource_tracing();
        let owners = tracked.then(|| {
            let mut set = SmallVec::new();
            set.push(OwnerToken::INIT.id);
            Mutex::new(set)
        });
        Self {
            count: AtomicI32::new(1),
            zero_observed: AtomicBool::new(false),
            owners,
            listeners: Mutex::new(Vec::new()),
        }
    }

    /// Current reference count.
    #[must_use]
    pub fn ref_count(&self) -> i32 {
        self.count.load(Ordering::Acquire)
    }

    /// True once the count has hit zero.
    #[must_use]
    pub fn is_released(&self) -> bool {
        self.ref_count() <= 0
    }

    /// Fails with [`BytesError::Released`] if the count has hit zero.
    pub fn ensure_not_released(&self) -> Result<()> {
        if self.is_released() {
            return Err(BytesError::Released);
        }
        Ok(())
    }

    /// Increments the count on behalf of `owner`.
    ///
    /// Fails if the count has already reached zero.
    pub fn reserve(&self, owner: &OwnerToken) -> Result<()> {
        let mut cur = self.count.load(Ordering::Acquire);
        loop {
            if cur <= 0 {
                return Err(BytesError::Released);
            }
            match self.count.compare_exchange_weak(
                cur,
                cur + 1,
                Ordering::AcqRel,
                Ordering::Acquire,
            ) {
                Ok(_) => break,
                Err(actual) => cur = actual,
            }
        }
        self.record(owner);
        self.notify(cur + 1);
        Ok(())
    }

    /// Like [`reserve`](RefCount::reserve) but reports failure instead of
    /// erroring. Used on paths where a closed resource is an expected state.
    pub fn try_reserve(&self, owner: &OwnerToken) -> bool {
        self.reserve(owner).is_ok()
    }

    /// Decrements the count on behalf of `owner`.
    ///
    /// Returns `true` for exactly one caller: the one that took the count to
    /// zero. The embedder runs its release action on that signal. Releasing
    /// an already-zero count fails, as does releasing with a token that
    /// holds no reservation while owner tracking is active.
    pub fn release(&self, owner: &OwnerToken) -> Result<bool> {
        self.forget(owner)?;
        let mut cur = self.count.load(Ordering::Acquire);
        loop {
            if cur <= 0 {
                return Err(BytesError::Released);
            }
            match self.count.compare_exchange_weak(
                cur,
                cur - 1,
                Ordering::AcqRel,
                Ordering::Acquire,
            ) {
                Ok(_) => break,
                Err(actual) => cur = actual,
            }
        }
        let now = cur - 1;
        self.notify(now);
        if now == 0 {
            // Exactly one release observes the transition.
            return Ok(!self.zero_observed.swap(true, Ordering::AcqRel));
        }
        Ok(false)
    }

    /// Releases asserting that `owner` holds the terminal reference.
    ///
    /// Fails without decrementing when other reservations are outstanding.
    pub fn release_last(&self, owner: &OwnerToken) -> Result<bool> {
        let cur = self.ref_count();
        if cur > 1 {
            return Err(BytesError::InvalidArgument(format!(
                "release_last by {owner:?} with {} outstanding references",
                cur - 1
            )));
        }
        self.release(owner)
    }

    /// Atomically hands the reservation held by `from` over to `to` without
    /// changing the count. Used when an elastic cursor adopts a freshly
    /// allocated store.
    pub fn reserve_transfer(&self, from: &OwnerToken, to: &OwnerToken) -> Result<()> {
        self.ensure_not_released()?;
        if let Some(owners) = &self.owners {
            let mut set = owners.lock();
            match set.iter().position(|id| *id == from.id) {
                Some(at) => set[at] = to.id,
                None => {
                    return Err(BytesError::InvalidArgument(format!(
                        "transfer from {from:?} which holds no reservation"
                    )))
                }
            }
        }
        Ok(())
    }

    /// Registers a listener invoked with the count after every transition.
    /// Returns an id for [`remove_listener`](RefCount::remove_listener).
    pub fn add_listener(&self, f: impl Fn(i32) + Send + Sync + 'static) -> u64 {
        let id = NEXT_LISTENER_ID.fetch_add(1, Ordering::Relaxed);
        self.listeners.lock().push((id, Box::new(f)));
        id
    }

    /// Removes a previously registered listener.
    pub fn remove_listener(&self, id: u64) {
        self.listeners.lock().retain(|(lid, _)| *lid != id);
    }

    /// Outstanding owner ids, if tracking is active. Diagnostic only.
    #[must_use]
    pub fn tracked_owners(&self) -> Option<Vec<u64>> {
        self.owners.as_ref().map(|o| o.lock().to_vec())
    }

    fn record(&self, owner: &OwnerToken) {
        if let Some(owners) = &self.owners {
            owners.lock().push(owner.id);
        }
    }

    fn forget(&self, owner: &OwnerToken) -> Result<()> {
        if let Some(owners) = &self.owners {
            let mut set = owners.lock();
            match set.iter().position(|id| *id == owner.id) {
                Some(at) => {
                    set.swap_remove(at);
                }
                None => {
                    return Err(BytesError::InvalidArgument(format!(
                        "release by {owner:?} which holds no reservation"
                    )))
                }
            }
        }
        Ok(())
    }

    fn notify(&self, count: i32) {
        for (_, f) in self.listeners.lock().iter() {
            f(count);
        }
    }
}

impl Default for RefCount {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Debug for RefCount {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("RefCount")
            .field("count", &self.ref_count())
            .finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn reserve_release_roundtrip() {
        let rc = RefCount::new();
        assert_eq!(rc.ref_count(), 1);

        let owner = OwnerToken::new("cursor");
        rc.reserve(&owner).unwrap();
        assert_eq!(rc.ref_count(), 2);

        assert!(!rc.release(&owner).unwrap());
        assert_eq!(rc.ref_count(), 1);
        assert!(rc.release(&OwnerToken::INIT).unwrap());
        assert!(rc.is_released());
    }

    #[test]
    fn release_at_zero_fails() {
        let rc = RefCount::new();
        assert!(rc.release(&OwnerToken::INIT).unwrap());
        assert!(rc.release(&OwnerToken::INIT).is_err());
    }

    // Owner tracking is active in debug builds (and under resource
    // tracing), which is where the double-release diagnostics live.
    #[cfg(debug_assertions)]
    #[test]
    fn double_release_of_same_owner_is_detected() {
        let rc = RefCount::new();
        let owner = OwnerToken::new("a");
        rc.reserve(&owner).unwrap();
        rc.release(&owner).unwrap();
        // Second release by the same token: the registry no longer has it.
        assert!(rc.release(&owner).is_err());
        assert_eq!(rc.ref_count(), 1);
    }

    #[test]
    fn reserve_after_zero_fails() {
        let rc = RefCount::new();
        rc.release(&OwnerToken::INIT).unwrap();
        let owner = OwnerToken::new("late");
        assert_eq!(rc.reserve(&owner).unwrap_err(), BytesError::Released);
        assert!(!rc.try_reserve(&owner));
    }

    #[test]
    fn release_last_rejects_outstanding_references() {
        let rc = RefCount::new();
        let owner = OwnerToken::new("b");
        rc.reserve(&owner).unwrap();
        assert!(rc.release_last(&owner).is_err());
        rc.release(&OwnerToken::INIT).unwrap();
        assert!(rc.release_last(&owner).unwrap());
    }

    #[cfg(debug_assertions)]
    #[test]
    fn transfer_moves_ownership_without_count_change() {
        let rc = RefCount::new();
        let cursor = OwnerToken::new("cursor");
        rc.reserve_transfer(&OwnerToken::INIT, &cursor).unwrap();
        assert_eq!(rc.ref_count(), 1);
        // INIT no longer holds a reservation.
        assert!(rc.release(&OwnerToken::INIT).is_err());
        assert!(rc.release(&cursor).unwrap());
    }

    #[test]
    fn listeners_observe_transitions() {
        use std::sync::atomic::AtomicI32 as Cell;
        use std::sync::Arc;

        let rc = RefCount::new();
        let last = Arc::new(Cell::new(-1));
        let seen = Arc::clone(&last);
        let id = rc.add_listener(move |count| seen.store(count, Ordering::SeqCst));

        let owner = OwnerToken::new("listener-test");
        rc.reserve(&owner).unwrap();
        assert_eq!(last.load(Ordering::SeqCst), 2);
        rc.release(&owner).unwrap();
        assert_eq!(last.load(Ordering::SeqCst), 1);

        rc.remove_listener(id);
        rc.release(&OwnerToken::INIT).unwrap();
        assert_eq!(last.load(Ordering::SeqCst), 1);
    }
}
