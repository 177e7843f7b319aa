//! Geocatalog Client - Spatial index service clients
//!
//! This crate provides the HTTP client that talks to the remote spatial
//! service, and an in-memory service with the same contract.

pub mod error;
pub mod http;
pub mod memory;
pub mod traits;

pub use error::{ClientError, ClientResult};
pub use http::HttpSpatialClient;
pub use memory::MemorySpatialService;
pub use traits::{ConnectionSettings, SpatialService};
