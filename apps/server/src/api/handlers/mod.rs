//! Request handlers for API endpoints
//!
//! Handlers coordinate between routes and services, handling:
//! - Request extraction
//! - Service invocation
//! - Response status selection

pub mod evses;
pub mod metrics;
pub mod sites;
pub mod stations;
