//! Runtime system
//!
//! This module contains the intrusive pointer memory primitives and the
//! scenario drivers used to exercise them.

pub mod intrusive;
pub mod scenario;
