//! # Admin API
//!
//! Topology management surface exposed to an operator layer. Handlers are
//! transport-agnostic: they take an [`ApiRequest`] and produce the uniform
//! [`ApiResponse`] envelope.

pub mod handlers;
pub mod response_types;

pub use handlers::TopologyApi;
pub use response_types::{ApiError, ApiRequest, ApiResponse};
