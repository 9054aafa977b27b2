//! TinyTorch integration tests
//!
//! Exercise the public API the way a downstream crate would.

#[path = "integration/lifecycle.rs"]
mod lifecycle;
#[path = "integration/stress.rs"]
mod stress;
#[path = "integration/errors.rs"]
mod errors;
#[path = "integration/config.rs"]
mod config;
