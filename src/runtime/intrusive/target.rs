//! Target base capability
//!
//! Every object managed by [`IntrusivePtr`](super::IntrusivePtr) embeds a
//! [`RefCounts`] and exposes it through [`IntrusiveTarget`]. The counts live
//! inside the object, so adopting it needs no second allocation.
//!
//! # Count protocol
//! - A fresh object has `strong == 0, weak == 0`.
//! - Adoption sets `strong = 1, weak = 1`. All strong pointers together hold
//!   exactly one weak unit, so `weak >= 1` whenever `strong >= 1`.
//! - When both counts reach 0 the object is deallocated. Dropping a
//!   [`RefCounts`] with a non-zero count is an invariant violation.

use std::fmt;
use std::sync::atomic::{AtomicUsize, Ordering};

use crate::util::config::ordering_policy;
use crate::util::error::{fatal, CountKind, RefCountError, TracedError};

/// Upper bound for either count. Exceeding it is treated as a leak bug.
pub const MAX_REFCOUNT: usize = isize::MAX as usize;

/// Strong and weak counters embedded in a managed object.
///
/// Cloning yields fresh zero counters: counts belong to the pointer layer,
/// never to the payload's value.
pub struct RefCounts {
    strong: AtomicUsize,
    weak: AtomicUsize,
}

impl RefCounts {
    /// Zeroed counters for an object nobody owns yet
    pub const fn new() -> Self {
        Self {
            strong: AtomicUsize::new(0),
            weak: AtomicUsize::new(0),
        }
    }

    /// Current strong count
    #[inline]
    pub fn strong(&self) -> usize {
        self.strong.load(ordering_policy().load())
    }

    /// Current weak count (including the unit held by the strong group)
    #[inline]
    pub fn weak(&self) -> usize {
        self.weak.load(ordering_policy().load())
    }

    /// Claim a fresh object: requires `(0, 0)`, then stores `(1, 1)`.
    ///
    /// Relaxed ordering is enough here because no other thread can observe
    /// the object before it is handed out.
    pub fn initialize(&self) -> Result<(), TracedError> {
        let strong = self.strong.load(Ordering::Relaxed);
        let weak = self.weak.load(Ordering::Relaxed);
        if strong != 0 || weak != 0 {
            return Err(TracedError::new(
                RefCountError::AlreadyOwned { strong, weak },
                "RefCounts::initialize",
            ));
        }
        self.strong.store(1, Ordering::Relaxed);
        self.weak.store(1, Ordering::Relaxed);
        Ok(())
    }

    /// Increment the strong count, returning the new value
    #[inline]
    pub fn increase_strong(&self) -> usize {
        let new = self.strong.fetch_add(1, ordering_policy().increment()) + 1;
        if new > MAX_REFCOUNT {
            fatal(TracedError::new(
                RefCountError::Overflow { count: new },
                "RefCounts::increase_strong",
            ));
        }
        new
    }

    /// Increment the weak count, returning the new value
    #[inline]
    pub fn increase_weak(&self) -> usize {
        let new = self.weak.fetch_add(1, ordering_policy().increment()) + 1;
        if new > MAX_REFCOUNT {
            fatal(TracedError::new(
                RefCountError::Overflow { count: new },
                "RefCounts::increase_weak",
            ));
        }
        new
    }

    /// Decrement the strong count, returning the new value
    #[inline]
    pub fn decrease_strong(&self) -> usize {
        let prev = self.strong.fetch_sub(1, ordering_policy().decrement());
        if prev == 0 {
            self.strong.fetch_add(1, Ordering::Relaxed);
            fatal(TracedError::new(
                RefCountError::Underflow {
                    which: CountKind::Strong,
                },
                "RefCounts::decrease_strong",
            ));
        }
        prev - 1
    }

    /// Decrement the weak count, returning the new value
    #[inline]
    pub fn decrease_weak(&self) -> usize {
        let prev = self.weak.fetch_sub(1, ordering_policy().decrement());
        if prev == 0 {
            self.weak.fetch_add(1, Ordering::Relaxed);
            fatal(TracedError::new(
                RefCountError::Underflow {
                    which: CountKind::Weak,
                },
                "RefCounts::decrease_weak",
            ));
        }
        prev - 1
    }

    /// Increment the strong count only if it is currently non-zero.
    ///
    /// Returns the new count, or `None` once the strong group is gone. Once
    /// the strong count has reached 0 it never moves again, so a failed
    /// attempt is final.
    pub fn try_increase_strong(&self) -> Option<usize> {
        let policy = ordering_policy();
        let mut current = self.strong.load(policy.load());
        loop {
            if current == 0 {
                return None;
            }
            if current >= MAX_REFCOUNT {
                fatal(TracedError::new(
                    RefCountError::Overflow { count: current + 1 },
                    "RefCounts::try_increase_strong",
                ));
            }
            match self.strong.compare_exchange_weak(
                current,
                current + 1,
                policy.upgrade(),
                Ordering::Relaxed,
            ) {
                Ok(_) => return Some(current + 1),
                Err(actual) => current = actual,
            }
        }
    }
}

impl Default for RefCounts {
    fn default() -> Self {
        Self::new()
    }
}

impl Clone for RefCounts {
    fn clone(&self) -> Self {
        Self::new()
    }
}

impl fmt::Debug for RefCounts {
    fn fmt(
        &self,
        f: &mut fmt::Formatter<'_>,
    ) -> fmt::Result {
        f.debug_struct("RefCounts")
            .field("strong", &self.strong.load(Ordering::Relaxed))
            .field("weak", &self.weak.load(Ordering::Relaxed))
            .finish()
    }
}

impl Drop for RefCounts {
    fn drop(&mut self) {
        let strong = *self.strong.get_mut();
        let weak = *self.weak.get_mut();
        if strong == 0 && weak == 0 {
            return;
        }

        let err = TracedError::new(RefCountError::NonZeroOnDrop { strong, weak }, "RefCounts::drop");
        if std::thread::panicking() {
            // A second panic would abort; the unwinding one already reports the bug.
            tracing::error!("{}", err);
            return;
        }
        fatal(err);
    }
}

/// Capability of objects managed by intrusive pointers.
///
/// # Safety
///
/// `ref_counts` must return the same [`RefCounts`], embedded in `self`, for
/// the whole life of the object. The pointers rely on it to decide when the
/// allocation is freed.
pub unsafe trait IntrusiveTarget {
    /// The counters embedded in this object
    fn ref_counts(&self) -> &RefCounts;

    /// Free heavy internal state early.
    ///
    /// Called exactly once, when the last strong pointer goes away while weak
    /// pointers still observe the object. The object itself stays allocated
    /// until the last weak pointer is dropped, so implementations must leave
    /// it in a valid (if empty) state. Not called when the object is
    /// deallocated directly.
    fn release_storage(&self) {}
}

/// Implement [`IntrusiveTarget`] for a type with an embedded [`RefCounts`] field.
///
/// ```
/// use tinytorch::impl_intrusive_target;
/// use tinytorch::runtime::intrusive::{IntrusivePtr, RefCounts};
/// use parking_lot::Mutex;
///
/// struct Buffer {
///     counts: RefCounts,
///     data: Mutex<Vec<f32>>,
/// }
///
/// impl Buffer {
///     fn free(&self) {
///         self.data.lock().clear();
///     }
/// }
///
/// impl_intrusive_target!(Buffer, counts, release = free);
///
/// let buf = IntrusivePtr::new(Buffer { counts: RefCounts::new(), data: Mutex::new(vec![1.0]) });
/// assert_eq!(buf.use_count(), 1);
/// ```
#[macro_export]
macro_rules! impl_intrusive_target {
    ($ty:ty, $field:ident) => {
        unsafe impl $crate::runtime::intrusive::IntrusiveTarget for $ty {
            #[inline]
            fn ref_counts(&self) -> &$crate::runtime::intrusive::RefCounts {
                &self.$field
            }
        }
    };
    ($ty:ty, $field:ident, release = $method:ident) => {
        unsafe impl $crate::runtime::intrusive::IntrusiveTarget for $ty {
            #[inline]
            fn ref_counts(&self) -> &$crate::runtime::intrusive::RefCounts {
                &self.$field
            }

            fn release_storage(&self) {
                self.$method()
            }
        }
    };
}
