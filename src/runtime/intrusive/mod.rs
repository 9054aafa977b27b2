//! Intrusive reference-counted pointers
//!
//! [`IntrusivePtr`] owns, [`WeakIntrusivePtr`] observes. Both operate on
//! objects that embed their own [`RefCounts`], so there is no separate
//! control block.
//!
//! Teardown happens in two phases when weak pointers outlive the strong ones:
//! [`IntrusiveTarget::release_storage`] frees the payload as soon as the last
//! strong pointer is dropped, and the object shell is deallocated when the
//! last weak pointer follows.
//!
//! ```
//! use tinytorch::impl_intrusive_target;
//! use tinytorch::runtime::intrusive::{IntrusivePtr, RefCounts};
//!
//! #[derive(Default)]
//! struct Node {
//!     counts: RefCounts,
//!     value: i64,
//! }
//! impl_intrusive_target!(Node, counts);
//!
//! let a = IntrusivePtr::new(Node { value: 7, ..Default::default() });
//! let b = a.clone();
//! let w = a.downgrade();
//! assert_eq!((a.use_count(), a.weak_use_count()), (2, 2));
//!
//! drop(a);
//! drop(b);
//! assert!(w.expired());
//! assert!(w.lock().is_null());
//! ```

mod ptr;
mod target;
mod upcast;
mod weak;

pub use ptr::{CountInit, IntrusivePtr};
pub use target::{IntrusiveTarget, RefCounts, MAX_REFCOUNT};
pub use upcast::Upcast;
pub use weak::WeakIntrusivePtr;

/// Allocate `value` and wrap it in an owning pointer
pub fn make_intrusive<T: IntrusiveTarget>(value: T) -> IntrusivePtr<T> {
    IntrusivePtr::new(value)
}

#[cfg(test)]
mod tests;
