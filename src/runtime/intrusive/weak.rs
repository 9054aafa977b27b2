//! Weak intrusive pointer

use std::fmt;
use std::marker::PhantomData;
use std::ptr::NonNull;

use super::ptr::{deallocate, IntrusivePtr};
use super::target::IntrusiveTarget;
use super::upcast::Upcast;

/// Non-owning observer of an intrusively counted object.
///
/// Holds one weak unit: the object shell stays allocated while any weak
/// pointer exists, but its payload may already have been released. The
/// target is only reachable through [`WeakIntrusivePtr::lock`].
pub struct WeakIntrusivePtr<T: ?Sized + IntrusiveTarget> {
    target: Option<NonNull<T>>,
    _marker: PhantomData<T>,
}

unsafe impl<T: ?Sized + IntrusiveTarget + Send + Sync> Send for WeakIntrusivePtr<T> {}
unsafe impl<T: ?Sized + IntrusiveTarget + Send + Sync> Sync for WeakIntrusivePtr<T> {}

impl<T: ?Sized + IntrusiveTarget> WeakIntrusivePtr<T> {
    /// The empty weak pointer; it is always expired
    pub const fn null() -> Self {
        Self {
            target: None,
            _marker: PhantomData,
        }
    }

    /// Observe the target of `strong`
    pub fn new(strong: &IntrusivePtr<T>) -> Self {
        strong.downgrade()
    }

    /// Re-wrap a pointer obtained from [`WeakIntrusivePtr::release`].
    ///
    /// # Safety
    ///
    /// The caller must own one weak unit on `target`, which is transferred to
    /// the returned pointer.
    pub unsafe fn from_raw(target: NonNull<T>) -> Self {
        Self::from_counted(target)
    }

    pub(super) fn from_counted(target: NonNull<T>) -> Self {
        Self {
            target: Some(target),
            _marker: PhantomData,
        }
    }

    /// Try to obtain a strong pointer; empty if the target has expired.
    ///
    /// The strong count is only incremented from a non-zero value, checked
    /// atomically, so this never revives an object whose last strong pointer
    /// is concurrently being dropped.
    pub fn lock(&self) -> IntrusivePtr<T> {
        match self.target {
            // SAFETY: our weak unit keeps the object shell allocated
            Some(target) if unsafe { target.as_ref() }.ref_counts().try_increase_strong().is_some() => {
                IntrusivePtr::from_counted(target)
            }
            _ => IntrusivePtr::null(),
        }
    }

    /// [`WeakIntrusivePtr::lock`] returning `None` on expiry
    pub fn upgrade(&self) -> Option<IntrusivePtr<T>> {
        let strong = self.lock();
        if strong.is_null() {
            None
        } else {
            Some(strong)
        }
    }

    /// Whether no strong pointer remains
    pub fn expired(&self) -> bool {
        self.use_count() == 0
    }

    /// Strong count of the target, 0 when empty
    pub fn use_count(&self) -> usize {
        self.counts().map_or(0, |(strong, _)| strong)
    }

    /// Weak count of the target, 0 when empty
    pub fn weak_use_count(&self) -> usize {
        self.counts().map_or(0, |(_, weak)| weak)
    }

    pub fn is_null(&self) -> bool {
        self.target.is_none()
    }

    /// Give up the target without touching its counts; the caller now holds one weak unit
    #[must_use = "the released pointer carries a weak reference that must be balanced"]
    pub fn release(&mut self) -> Option<NonNull<T>> {
        self.target.take()
    }

    /// Move the target out, leaving this pointer empty
    pub fn take(&mut self) -> Self {
        match self.target.take() {
            Some(target) => Self::from_counted(target),
            None => Self::null(),
        }
    }

    pub fn reset(&mut self) {
        drop(self.take());
    }

    pub fn swap(
        &mut self,
        other: &mut Self,
    ) {
        std::mem::swap(&mut self.target, &mut other.target);
    }

    /// Whether both observe the same object (or are both empty)
    pub fn ptr_eq(
        &self,
        other: &Self,
    ) -> bool {
        self.target.map(NonNull::cast::<u8>) == other.target.map(NonNull::cast::<u8>)
    }

    /// Whether this observes the target of `strong`
    pub fn observes(
        &self,
        strong: &IntrusivePtr<T>,
    ) -> bool {
        self.target.map(NonNull::cast::<u8>) == strong.as_ptr().map(NonNull::cast::<u8>)
    }

    /// Convert to a weak pointer to a related type, moving the weak unit
    pub fn upcast<U>(mut self) -> WeakIntrusivePtr<U>
    where
        U: ?Sized + IntrusiveTarget,
        T: Upcast<U>,
    {
        match self.release() {
            // SAFETY: Upcast guarantees a non-null pointer to the same allocation
            Some(target) => WeakIntrusivePtr::from_counted(unsafe {
                NonNull::new_unchecked(T::upcast_ptr(target.as_ptr()))
            }),
            None => WeakIntrusivePtr::null(),
        }
    }

    fn counts(&self) -> Option<(usize, usize)> {
        self.target.map(|target| {
            // SAFETY: our weak unit keeps the object shell allocated
            let counts = unsafe { target.as_ref() }.ref_counts();
            (counts.strong(), counts.weak())
        })
    }
}

impl<T: ?Sized + IntrusiveTarget> Clone for WeakIntrusivePtr<T> {
    fn clone(&self) -> Self {
        match self.target {
            Some(target) => {
                // SAFETY: our weak unit keeps the object shell allocated
                unsafe { target.as_ref() }.ref_counts().increase_weak();
                Self::from_counted(target)
            }
            None => Self::null(),
        }
    }
}

impl<T: ?Sized + IntrusiveTarget> Drop for WeakIntrusivePtr<T> {
    fn drop(&mut self) {
        let Some(target) = self.target.take() else {
            return;
        };
        // SAFETY: we own one weak unit. Weak reaching 0 implies the strong group
        // already gave up its unit, so nothing else refers to the object.
        unsafe {
            if target.as_ref().ref_counts().decrease_weak() == 0 {
                deallocate(target);
            }
        }
    }
}

impl<T: ?Sized + IntrusiveTarget> Default for WeakIntrusivePtr<T> {
    fn default() -> Self {
        Self::null()
    }
}

impl<T: ?Sized + IntrusiveTarget> From<&IntrusivePtr<T>> for WeakIntrusivePtr<T> {
    fn from(strong: &IntrusivePtr<T>) -> Self {
        strong.downgrade()
    }
}

impl<T: ?Sized + IntrusiveTarget> fmt::Debug for WeakIntrusivePtr<T> {
    fn fmt(
        &self,
        f: &mut fmt::Formatter<'_>,
    ) -> fmt::Result {
        match self.counts() {
            Some((strong, weak)) => f
                .debug_struct("WeakIntrusivePtr")
                .field("strong", &strong)
                .field("weak", &weak)
                .finish(),
            None => write!(f, "WeakIntrusivePtr(null)"),
        }
    }
}
