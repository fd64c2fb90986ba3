#![forbid(unsafe_code)]

//! Dependency detection windows.
//!
//! While a window is open, every tracked property read appends a
//! [`Dependency`] and every write is suppressed, so a getter can be run
//! "dry" to discover what it reads.
//!
//! The window is thread-local state guarded by the RAII [`Detection`] type.
//! Windows do not nest: opening a second one while one is open fails with
//! [`TalError::NestedDetection`] instead of corrupting the first.

use std::cell::RefCell;

use crate::error::{Result, TalError};
use crate::reactive::Observable;

thread_local! {
    static WINDOW: RefCell<Option<Vec<Dependency>>> = const { RefCell::new(None) };
}

/// One `(observable, property)` pair read during a detection window.
#[derive(Clone, Debug)]
pub struct Dependency {
    pub observable: Observable,
    pub property: String,
}

impl Dependency {
    fn same(&self, other: &Self) -> bool {
        self.observable.ptr_eq(&other.observable) && self.property == other.property
    }
}

/// Guard for an open detection window.
///
/// Dropping it without [`finish`](Detection::finish) closes the window and
/// discards what was recorded.
#[must_use = "dropping the guard discards the detected dependencies"]
pub struct Detection {
    open: bool,
}

/// Open a detection window.
pub fn detect() -> Result<Detection> {
    WINDOW.with_borrow_mut(|window| {
        if window.is_some() {
            return Err(TalError::NestedDetection);
        }
        *window = Some(Vec::new());
        Ok(Detection { open: true })
    })
}

/// Run `f` inside a detection window and return its result with the reads
/// it performed.
pub fn detect_with<T>(f: impl FnOnce() -> T) -> Result<(T, Vec<Dependency>)> {
    let window = detect()?;
    let result = f();
    Ok((result, window.finish()))
}

/// Whether a detection window is currently open.
#[must_use]
pub fn is_detecting() -> bool {
    WINDOW.with_borrow(Option::is_some)
}

pub(crate) fn record(observable: &Observable, property: &str) {
    WINDOW.with_borrow_mut(|window| {
        if let Some(list) = window {
            list.push(Dependency {
                observable: observable.clone(),
                property: property.to_owned(),
            });
        }
    });
}

impl Detection {
    /// Close the window and return the distinct dependencies in first-read order.
    pub fn finish(mut self) -> Vec<Dependency> {
        self.open = false;
        let recorded = WINDOW.with_borrow_mut(Option::take).unwrap_or_default();
        let mut distinct: Vec<Dependency> = Vec::with_capacity(recorded.len());
        for dep in recorded {
            if !distinct.iter().any(|seen| seen.same(&dep)) {
                distinct.push(dep);
            }
        }
        distinct
    }
}

impl Drop for Detection {
    fn drop(&mut self) {
        if self.open {
            let discarded = WINDOW.with_borrow_mut(Option::take);
            drop(discarded);
        }
    }
}

impl std::fmt::Debug for Detection {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Detection").field("open", &self.open).finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::reactive::wrap_object;
    use crate::value::{Object, Value};

    #[test]
    fn records_distinct_reads_in_order() {
        let ctx = wrap_object(&Value::from(Object::new().with("a", 1).with("b", 2)), None).unwrap();
        let (_, deps) = detect_with(|| {
            let _ = ctx.get("b");
            let _ = ctx.get("a");
            let _ = ctx.get("b");
        })
        .unwrap();
        let props: Vec<_> = deps.iter().map(|d| d.property.as_str()).collect();
        assert_eq!(props, ["b", "a"]);
        assert!(!is_detecting());
    }

    #[test]
    fn nested_windows_fail_fast() {
        let outer = detect().unwrap();
        assert_eq!(detect().unwrap_err(), TalError::NestedDetection);
        assert!(is_detecting());
        drop(outer);
        assert!(!is_detecting());
        let again = detect().unwrap();
        assert!(again.finish().is_empty());
    }

    #[test]
    fn writes_are_suppressed_while_detecting() {
        let ctx = wrap_object(&Value::from(Object::new().with("a", 1)), None).unwrap();
        let window = detect().unwrap();
        assert_eq!(ctx.set("a", Value::from(2)), Ok(true));
        drop(window);
        assert_eq!(ctx.get("a").as_number(), Some(1.0));
    }
}
