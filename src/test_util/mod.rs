//! Utilities for testing code that talks to the middleware without running one. They are part
//!  of the regular (non-#[cfg(test)]) crate so applications can use them in their own tests.

pub mod chunked_reader;
pub mod fake_middleware;
