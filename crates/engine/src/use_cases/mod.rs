//! Use cases - request orchestration.
//!
//! `transmute` drives one request end to end; `generation` holds the
//! backends it dispatches to.

pub mod generation;
pub mod transmute;

pub use transmute::{TransmuteImage, TransmuteOutcome};
