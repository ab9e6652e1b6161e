//! Infrastructure implementations.
//!
//! Contains port trait implementations for external dependencies.

pub mod clock;
pub mod comfyui;
pub mod config;
pub mod correlation;
pub mod ports;
pub mod replicate;
pub mod source_images;
