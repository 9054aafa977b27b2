//! Owning intrusive pointer

use std::cmp::Ordering;
use std::fmt;
use std::hash::{Hash, Hasher};
use std::marker::PhantomData;
use std::ops::Deref;
use std::ptr::NonNull;

use super::target::IntrusiveTarget;
use super::upcast::Upcast;
use super::weak::WeakIntrusivePtr;
use crate::util::config::lifecycle_tracing;
use crate::util::error::{fatal, RefCountError, TracedError};

/// How [`IntrusivePtr::from_raw`] treats the target's counters
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum CountInit {
    /// Fresh object: counts must read `(0, 0)` and become `(1, 1)`
    #[default]
    Initialize,
    /// The caller already owns one strong unit (e.g. from [`IntrusivePtr::release`])
    Adopted,
}

/// Strong, owning pointer to an object carrying its own reference counts.
///
/// Cloning increments the strong count, dropping decrements it. When the last
/// strong pointer goes away the object is either deallocated (no weak
/// pointers left) or has its storage released while the shell waits for the
/// last [`WeakIntrusivePtr`].
pub struct IntrusivePtr<T: ?Sized + IntrusiveTarget> {
    target: Option<NonNull<T>>,
    _marker: PhantomData<T>,
}

unsafe impl<T: ?Sized + IntrusiveTarget + Send + Sync> Send for IntrusivePtr<T> {}
unsafe impl<T: ?Sized + IntrusiveTarget + Send + Sync> Sync for IntrusivePtr<T> {}

impl<T: IntrusiveTarget> IntrusivePtr<T> {
    /// Allocate `value` and take ownership of it
    pub fn new(value: T) -> Self {
        Self::from_box(Box::new(value))
    }
}

impl<T: ?Sized + IntrusiveTarget> IntrusivePtr<T> {
    /// The empty pointer
    pub const fn null() -> Self {
        Self {
            target: None,
            _marker: PhantomData,
        }
    }

    /// Take ownership of a boxed object with zeroed counts
    pub fn from_box(boxed: Box<T>) -> Self {
        if let Err(err) = boxed.ref_counts().initialize() {
            fatal(err.with_track("IntrusivePtr::from_box"));
        }
        trace_event("adopt", &*boxed);
        Self::from_counted(NonNull::from(Box::leak(boxed)))
    }

    /// Wrap a raw pointer obtained from `Box::into_raw` or [`IntrusivePtr::release`].
    ///
    /// A null `raw` yields the empty pointer. With [`CountInit::Initialize`]
    /// the counts must read `(0, 0)`; anything else is an invariant
    /// violation and is raised.
    ///
    /// # Safety
    ///
    /// `raw` must be null or point to a live object allocated by `Box`. With
    /// [`CountInit::Adopted`] the caller must own one strong unit, which is
    /// transferred to the returned pointer.
    pub unsafe fn from_raw(
        raw: *mut T,
        init: CountInit,
    ) -> Self {
        match Self::try_from_raw(raw, init) {
            Ok(ptr) => ptr,
            Err(err) => fatal(err.with_track("IntrusivePtr::from_raw")),
        }
    }

    /// Like [`IntrusivePtr::from_raw`], returning the violation instead of raising it.
    ///
    /// # Safety
    ///
    /// Same contract as [`IntrusivePtr::from_raw`].
    pub unsafe fn try_from_raw(
        raw: *mut T,
        init: CountInit,
    ) -> Result<Self, TracedError> {
        let Some(target) = NonNull::new(raw) else {
            return Ok(Self::null());
        };
        if init == CountInit::Initialize {
            let object = target.as_ref();
            object.ref_counts().initialize()?;
            trace_event("adopt", object);
        }
        Ok(Self::from_counted(target))
    }

    /// Wrap a target whose strong count already accounts for this pointer
    pub(super) fn from_counted(target: NonNull<T>) -> Self {
        Self {
            target: Some(target),
            _marker: PhantomData,
        }
    }

    /// Shared reference to the target, `None` when empty
    #[inline]
    pub fn get(&self) -> Option<&T> {
        // SAFETY: a non-empty pointer holds a strong unit, keeping the target alive
        self.target.map(|target| unsafe { &*target.as_ptr() })
    }

    /// Raw address of the target without transferring ownership
    #[inline]
    pub fn as_ptr(&self) -> Option<NonNull<T>> {
        self.target
    }

    /// Strong count of the target, 0 when empty
    pub fn use_count(&self) -> usize {
        self.get().map_or(0, |target| target.ref_counts().strong())
    }

    /// Weak count of the target (including the strong group's unit), 0 when empty
    pub fn weak_use_count(&self) -> usize {
        self.get().map_or(0, |target| target.ref_counts().weak())
    }

    /// Whether this is the only strong pointer
    pub fn unique(&self) -> bool {
        self.use_count() == 1
    }

    pub fn is_null(&self) -> bool {
        self.target.is_none()
    }

    /// Whether the pointer refers to an object
    pub fn defined(&self) -> bool {
        self.target.is_some()
    }

    /// Give up the target without touching its counts.
    ///
    /// The caller now holds one strong unit and must balance it, usually by
    /// re-wrapping with [`CountInit::Adopted`].
    #[must_use = "the released pointer carries a strong reference that must be balanced"]
    pub fn release(&mut self) -> Option<NonNull<T>> {
        self.target.take()
    }

    /// Consuming form of [`IntrusivePtr::release`]
    #[must_use = "the released pointer carries a strong reference that must be balanced"]
    pub fn into_raw(mut self) -> Option<NonNull<T>> {
        self.release()
    }

    /// Move the target out, leaving this pointer empty
    pub fn take(&mut self) -> Self {
        match self.target.take() {
            Some(target) => Self::from_counted(target),
            None => Self::null(),
        }
    }

    /// Drop the current target, leaving this pointer empty
    pub fn reset(&mut self) {
        drop(self.take());
    }

    pub fn swap(
        &mut self,
        other: &mut Self,
    ) {
        std::mem::swap(&mut self.target, &mut other.target);
    }

    /// Copy-assign from `other`.
    ///
    /// The previous target is released first (running its release path if
    /// this was its last strong pointer), then `other`'s target gains one
    /// strong unit. Assigning a pointer that already shares the target is a
    /// no-op.
    pub fn assign(
        &mut self,
        other: &Self,
    ) {
        if self.ptr_eq(other) {
            return;
        }
        self.reset();
        self.target = other.acquire_strong();
    }

    /// Whether both pointers refer to the same object (or are both empty)
    pub fn ptr_eq(
        &self,
        other: &Self,
    ) -> bool {
        self.addr() == other.addr()
    }

    /// Create a weak observer of the target
    pub fn downgrade(&self) -> WeakIntrusivePtr<T> {
        match self.target {
            Some(target) => {
                // SAFETY: target is alive while we hold a strong unit
                unsafe { target.as_ref() }.ref_counts().increase_weak();
                WeakIntrusivePtr::from_counted(target)
            }
            None => WeakIntrusivePtr::null(),
        }
    }

    /// Convert to a pointer to a related type, moving the strong unit
    pub fn upcast<U>(mut self) -> IntrusivePtr<U>
    where
        U: ?Sized + IntrusiveTarget,
        T: Upcast<U>,
    {
        match self.release() {
            // SAFETY: Upcast guarantees a non-null pointer to the same allocation
            Some(target) => IntrusivePtr::from_counted(unsafe {
                NonNull::new_unchecked(T::upcast_ptr(target.as_ptr()))
            }),
            None => IntrusivePtr::null(),
        }
    }

    /// Copy-convert to a pointer to a related type
    pub fn upcast_ref<U>(&self) -> IntrusivePtr<U>
    where
        U: ?Sized + IntrusiveTarget,
        T: Upcast<U>,
    {
        self.clone().upcast()
    }

    fn acquire_strong(&self) -> Option<NonNull<T>> {
        let target = self.target?;
        // SAFETY: target is alive while we hold a strong unit
        let counts = unsafe { target.as_ref() }.ref_counts();
        if counts.increase_strong() == 1 {
            // restore the released state before raising
            counts.decrease_strong();
            fatal(TracedError::new(RefCountError::Resurrection, "IntrusivePtr::clone"));
        }
        Some(target)
    }

    #[inline]
    fn addr(&self) -> Option<NonNull<u8>> {
        self.target.map(NonNull::cast)
    }
}

/// Give up one strong unit on `target`.
///
/// The thread that takes the strong count to 0 decides the object's fate.
/// If only the strong group's weak unit remains, the object is deallocated
/// directly. Otherwise its storage is released and the group's weak unit is
/// dropped; whichever side takes the weak count to 0 deallocates.
///
/// # Safety
///
/// The caller must own one strong unit on a live `target`.
unsafe fn release_strong<T: ?Sized + IntrusiveTarget>(target: NonNull<T>) {
    let object = target.as_ref();
    let counts = object.ref_counts();
    if counts.decrease_strong() != 0 {
        return;
    }

    // With strong at 0 no new weak pointer can be created, so weak == 1 means
    // only the strong group's unit is left.
    let should_delete = if counts.weak() == 1 {
        counts.decrease_weak();
        true
    } else {
        trace_event("release_storage", object);
        object.release_storage();
        counts.decrease_weak() == 0
    };

    if should_delete {
        deallocate(target);
    }
}

/// Free the object. Both counts must already read 0.
///
/// # Safety
///
/// `target` must come from `Box` and no pointer may use it afterwards.
pub(super) unsafe fn deallocate<T: ?Sized + IntrusiveTarget>(target: NonNull<T>) {
    trace_event("deallocate", target.as_ref());
    drop(Box::from_raw(target.as_ptr()));
}

pub(super) fn trace_event<T: ?Sized + IntrusiveTarget>(
    event: &'static str,
    object: &T,
) {
    if lifecycle_tracing() {
        let counts = object.ref_counts();
        tracing::trace!(
            "{} {:p} (strong = {}, weak = {})",
            event,
            object as *const T as *const u8,
            counts.strong(),
            counts.weak()
        );
    }
}

impl<T: ?Sized + IntrusiveTarget> Clone for IntrusivePtr<T> {
    fn clone(&self) -> Self {
        Self {
            target: self.acquire_strong(),
            _marker: PhantomData,
        }
    }
}

impl<T: ?Sized + IntrusiveTarget> Drop for IntrusivePtr<T> {
    fn drop(&mut self) {
        if let Some(target) = self.target.take() {
            // SAFETY: a non-empty pointer owns one strong unit
            unsafe { release_strong(target) }
        }
    }
}

impl<T: ?Sized + IntrusiveTarget> Default for IntrusivePtr<T> {
    fn default() -> Self {
        Self::null()
    }
}

impl<T: ?Sized + IntrusiveTarget> Deref for IntrusivePtr<T> {
    type Target = T;

    /// # Panics
    ///
    /// Panics if the pointer is empty.
    fn deref(&self) -> &T {
        match self.get() {
            Some(target) => target,
            None => panic!("dereferenced an empty IntrusivePtr"),
        }
    }
}

impl<T: ?Sized + IntrusiveTarget> From<Box<T>> for IntrusivePtr<T> {
    fn from(boxed: Box<T>) -> Self {
        Self::from_box(boxed)
    }
}

impl<T: ?Sized + IntrusiveTarget> PartialEq for IntrusivePtr<T> {
    fn eq(
        &self,
        other: &Self,
    ) -> bool {
        self.ptr_eq(other)
    }
}

impl<T: ?Sized + IntrusiveTarget> Eq for IntrusivePtr<T> {}

impl<T: ?Sized + IntrusiveTarget> PartialOrd for IntrusivePtr<T> {
    fn partial_cmp(
        &self,
        other: &Self,
    ) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl<T: ?Sized + IntrusiveTarget> Ord for IntrusivePtr<T> {
    fn cmp(
        &self,
        other: &Self,
    ) -> Ordering {
        self.addr().cmp(&other.addr())
    }
}

impl<T: ?Sized + IntrusiveTarget> Hash for IntrusivePtr<T> {
    fn hash<H: Hasher>(
        &self,
        state: &mut H,
    ) {
        self.addr().hash(state);
    }
}

impl<T: ?Sized + IntrusiveTarget + fmt::Debug> fmt::Debug for IntrusivePtr<T> {
    fn fmt(
        &self,
        f: &mut fmt::Formatter<'_>,
    ) -> fmt::Result {
        match self.get() {
            Some(target) => f
                .debug_struct("IntrusivePtr")
                .field("strong", &target.ref_counts().strong())
                .field("weak", &target.ref_counts().weak())
                .field("target", &target)
                .finish(),
            None => write!(f, "IntrusivePtr(null)"),
        }
    }
}

impl<T: ?Sized + IntrusiveTarget> fmt::Pointer for IntrusivePtr<T> {
    fn fmt(
        &self,
        f: &mut fmt::Formatter<'_>,
    ) -> fmt::Result {
        match self.addr() {
            Some(addr) => fmt::Pointer::fmt(&addr, f),
            None => fmt::Pointer::fmt(&std::ptr::null::<u8>(), f),
        }
    }
}
