//! Utility types and functions

pub mod config;
pub mod error;
pub mod logger;

#[cfg(test)]
mod tests;
