//! Transmute Engine library.
//!
//! Turns source images plus a mode and two sliders into one generated image,
//! using either a hosted predictions API or a local node-graph engine.
//!
//! ## Structure
//!
//! - `use_cases/` - Request orchestration and the two generation backends
//! - `infrastructure/` - External dependency implementations (ports + adapters)
//! - `api/` - HTTP entry points
//! - `app` - Application composition

pub mod api;
pub mod app;
pub mod infrastructure;
pub mod use_cases;

pub use app::App;
