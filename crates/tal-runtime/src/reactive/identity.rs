#![forbid(unsafe_code)]

//! Target → wrapper identity table.
//!
//! Keys are the addresses of shared raw targets; values are weak handles to
//! the wrappers. The table never keeps a target or a wrapper alive. A key
//! cannot be reused while its wrapper lives, because the wrapper owns the
//! target; dead entries are pruned lazily.

use std::cell::RefCell;
use std::rc::Weak;

use ahash::AHashMap;

use super::observable::{Observable, ObservableInner};

/// Registrations between prune passes.
const PRUNE_INTERVAL: usize = 256;

#[derive(Default)]
struct IdentityTable {
    entries: AHashMap<usize, Weak<ObservableInner>>,
    since_prune: usize,
}

thread_local! {
    static TABLE: RefCell<IdentityTable> = RefCell::new(IdentityTable::default());
}

pub(crate) fn lookup(addr: usize) -> Option<Observable> {
    TABLE.with_borrow(|table| {
        table
            .entries
            .get(&addr)
            .and_then(Weak::upgrade)
            .map(|inner| Observable { inner })
    })
}

pub(crate) fn register(addr: usize, observable: &Observable) {
    TABLE.with_borrow_mut(|table| {
        table.entries.insert(addr, observable.downgrade_inner());
        table.since_prune += 1;
        if table.since_prune >= PRUNE_INTERVAL {
            table.since_prune = 0;
            table.entries.retain(|_, weak| weak.strong_count() > 0);
        }
    });
}

/// Number of wrappers in the table that are still alive.
#[must_use]
pub fn live_wrappers() -> usize {
    TABLE.with_borrow(|table| {
        table
            .entries
            .values()
            .filter(|weak| weak.strong_count() > 0)
            .count()
    })
}
