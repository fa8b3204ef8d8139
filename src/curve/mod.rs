//! Controller curves
//!
//! Curves map a 7-bit (or normalized) controller value to a modulation
//! value. A `CurveSet` is built once per instrument load and shared
//! read-only with the audio thread.

mod curve;
mod set;
mod spline;

pub use curve::{Curve, Interpolator, NUM_POINTS, NUM_PREDEFINED};
pub use set::{CurveError, CurveSet};
