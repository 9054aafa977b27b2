//! Compile-time checked pointer conversions
//!
//! `IntrusivePtr<T>` converts to `IntrusivePtr<U>` only when `T: Upcast<U>`.
//! Every type upcasts to itself; concrete-to-trait-object conversions are
//! declared with [`impl_upcast!`](crate::impl_upcast).

/// Conversion of a pointer to `Self` into a pointer to `U`.
///
/// # Safety
///
/// `upcast_ptr` must return a pointer to the same allocation whose
/// [`ref_counts`](super::IntrusiveTarget::ref_counts) yields the same
/// counters, and which can be freed as a `Box<U>`. Unsizing coercions
/// (`*mut Concrete` to `*mut dyn Trait`) satisfy this.
pub unsafe trait Upcast<U: ?Sized> {
    fn upcast_ptr(ptr: *mut Self) -> *mut U;
}

unsafe impl<T: ?Sized> Upcast<T> for T {
    #[inline]
    fn upcast_ptr(ptr: *mut T) -> *mut T {
        ptr
    }
}

/// Declare unsizing conversions for intrusive pointers.
///
/// ```
/// use tinytorch::{impl_intrusive_target, impl_upcast};
/// use tinytorch::runtime::intrusive::{IntrusivePtr, IntrusiveTarget, RefCounts};
///
/// trait Storage: IntrusiveTarget + Send + Sync {
///     fn nbytes(&self) -> usize;
/// }
///
/// struct CpuStorage {
///     counts: RefCounts,
///     bytes: Vec<u8>,
/// }
///
/// impl_intrusive_target!(CpuStorage, counts);
/// impl_upcast!(CpuStorage => dyn Storage);
///
/// impl Storage for CpuStorage {
///     fn nbytes(&self) -> usize {
///         self.bytes.len()
///     }
/// }
///
/// let cpu = IntrusivePtr::new(CpuStorage { counts: RefCounts::new(), bytes: vec![0; 16] });
/// let storage: IntrusivePtr<dyn Storage> = cpu.upcast();
/// assert_eq!(storage.nbytes(), 16);
/// ```
#[macro_export]
macro_rules! impl_upcast {
    ($from:ty => $($to:ty),+ $(,)?) => {
        $(
            unsafe impl $crate::runtime::intrusive::Upcast<$to> for $from {
                #[inline]
                fn upcast_ptr(ptr: *mut Self) -> *mut $to {
                    ptr
                }
            }
        )+
    };
}
