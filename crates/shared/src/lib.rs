//! Transmute Protocol - Wire types for the transmutation HTTP API
//!
//! # Design Principles
//!
//! 1. **Minimal dependencies** - Only serde and serde_json
//! 2. **No business logic** - Pure data types and serialization
//! 3. **No domain types** - modes travel as plain strings and are parsed by the engine

pub mod requests;
pub mod responses;

pub use requests::TransmuteRequest;
pub use responses::{BackendHealthResponse, ErrorCode, ErrorResponse, TransmuteResponse};
