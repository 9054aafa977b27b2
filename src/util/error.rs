//! Reference-count invariant violations
//!
//! A violated count invariant is a lifetime-management bug, never a transient
//! condition. It is raised as a panic whose payload is a [`TracedError`]:
//! the message plus an append-only trace of the call sites it passed through.
//!
//! ```
//! use tinytorch::util::error::{catch_fatal, RefCountError, TracedError, fatal};
//!
//! let err = catch_fatal(|| -> () {
//!     fatal(TracedError::new(RefCountError::Resurrection, "IntrusivePtr::clone"))
//! })
//! .unwrap_err();
//! assert_eq!(err.kind(), &RefCountError::Resurrection);
//! ```

use std::borrow::Cow;
use std::fmt;
use std::panic::{self, AssertUnwindSafe};

use smallvec::SmallVec;
use thiserror::Error;

/// Detected impossible reference-count states
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum RefCountError {
    #[error("Trying to destruct an intrusive target with strong = {strong}, weak = {weak} (both should be 0)")]
    NonZeroOnDrop { strong: usize, weak: usize },

    #[error("Cannot adopt an intrusive target that is already owned (strong = {strong}, weak = {weak})")]
    AlreadyOwned { strong: usize, weak: usize },

    #[error("Cannot increase strong count from 0: the target has already been released")]
    Resurrection,

    #[error("Reference count overflow ({count})")]
    Overflow { count: usize },

    #[error("Reference count underflow: {which} count is already 0")]
    Underflow { which: CountKind },
}

/// Which of the two inline counters an error refers to
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CountKind {
    Strong,
    Weak,
}

impl fmt::Display for CountKind {
    fn fmt(
        &self,
        f: &mut fmt::Formatter<'_>,
    ) -> fmt::Result {
        match self {
            CountKind::Strong => write!(f, "strong"),
            CountKind::Weak => write!(f, "weak"),
        }
    }
}

/// Call-site identifier appended to a [`TracedError`]
pub type Site = Cow<'static, str>;

/// An invariant violation together with the sites it propagated through.
///
/// The first entry of the trace is the originating site, later entries were
/// appended by handlers on the way up.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TracedError {
    kind: RefCountError,
    trace: SmallVec<[Site; 4]>,
}

impl TracedError {
    /// Create an error raised at `site`
    pub fn new(
        kind: RefCountError,
        site: impl Into<Site>,
    ) -> Self {
        let mut trace = SmallVec::new();
        trace.push(site.into());
        Self { kind, trace }
    }

    /// Append the site of a handler the error is passing through
    pub fn add_track(
        &mut self,
        site: impl Into<Site>,
    ) {
        self.trace.push(site.into());
    }

    /// Builder form of [`TracedError::add_track`]
    pub fn with_track(
        mut self,
        site: impl Into<Site>,
    ) -> Self {
        self.add_track(site);
        self
    }

    pub fn kind(&self) -> &RefCountError {
        &self.kind
    }

    /// Human-readable message without the trace
    pub fn message(&self) -> String {
        self.kind.to_string()
    }

    /// Sites from origin to the outermost handler
    pub fn trace(&self) -> impl ExactSizeIterator<Item = &str> + '_ {
        self.trace.iter().map(|site| site.as_ref())
    }

    /// Site where the violation was detected
    pub fn origin(&self) -> &str {
        self.trace.first().map(|site| site.as_ref()).unwrap_or("<unknown>")
    }
}

impl fmt::Display for TracedError {
    fn fmt(
        &self,
        f: &mut fmt::Formatter<'_>,
    ) -> fmt::Result {
        write!(f, "{}", self.kind)?;
        for site in &self.trace {
            write!(f, "\n  at {}", site)?;
        }
        Ok(())
    }
}

impl std::error::Error for TracedError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        Some(&self.kind)
    }
}

/// Raise an invariant violation. Never returns.
#[cold]
#[inline(never)]
pub fn fatal(err: TracedError) -> ! {
    tracing::error!("{}", err);
    panic::panic_any(err)
}

/// Run `f`, turning a raised [`TracedError`] into `Err`.
///
/// Panics that do not carry a [`TracedError`] keep unwinding.
pub fn catch_fatal<T, F>(f: F) -> Result<T, TracedError>
where
    F: FnOnce() -> T,
{
    match panic::catch_unwind(AssertUnwindSafe(f)) {
        Ok(value) => Ok(value),
        Err(payload) => match payload.downcast::<TracedError>() {
            Ok(err) => Err(*err),
            Err(other) => panic::resume_unwind(other),
        },
    }
}

/// Run `f`; if it raises, append `site` to the trace and raise again.
pub fn track_fatal<T, F>(
    site: impl Into<Site>,
    f: F,
) -> T
where
    F: FnOnce() -> T,
{
    match catch_fatal(f) {
        Ok(value) => value,
        Err(err) => panic::resume_unwind(Box::new(err.with_track(site))),
    }
}

/// Install a panic hook that renders [`TracedError`] payloads with their trace.
///
/// Other panics go to the previously installed hook.
pub fn install_panic_hook() {
    let previous = panic::take_hook();
    panic::set_hook(Box::new(move |info| match info.payload().downcast_ref::<TracedError>() {
        Some(err) => eprintln!("fatal: {}", err),
        None => previous(info),
    }));
}
