//! End-to-end test support for remanence
//!
//! The [`harness`] module provides isolated, tempfile-backed service
//! instances with a pinned clock and seeding helpers.

pub mod harness;
