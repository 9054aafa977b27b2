//! TinyTorch core memory primitives
//!
//! Intrusive strong/weak reference-counted pointers for polymorphic heap
//! objects that carry their own counts.
//!
//! # Example
//!
//! ```
//! use tinytorch::impl_intrusive_target;
//! use tinytorch::runtime::intrusive::{make_intrusive, RefCounts};
//!
//! struct Scalar {
//!     counts: RefCounts,
//!     value: f64,
//! }
//! impl_intrusive_target!(Scalar, counts);
//!
//! let x = make_intrusive(Scalar { counts: RefCounts::new(), value: 1.5 });
//! assert_eq!(x.value, 1.5);
//! assert!(x.unique());
//! ```

#![doc(html_root_url = "https://docs.rs/tinytorch")]
#![warn(rust_2018_idioms)]

// Public modules
pub mod runtime;

// Utility modules
pub mod util;

// Re-exports
pub use runtime::intrusive::{
    make_intrusive, CountInit, IntrusivePtr, IntrusiveTarget, RefCounts, Upcast, WeakIntrusivePtr,
};
pub use util::error::{RefCountError, TracedError};

/// Library version
pub const VERSION: &str = env!("CARGO_PKG_VERSION");

/// Library name
pub const NAME: &str = "TinyTorch";
