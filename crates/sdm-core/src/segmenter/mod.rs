//! Range math and segment planning.
//!
//! Splits a download into N contiguous byte-range segments and computes the
//! HTTP Range header bounds for resuming each one mid-way.

mod range;

pub use range::{plan_segments, Segment};
