//! Station catalog service
//!
//! JSON API over sites, charging stations and EVSEs:
//! - Generic list queries with filtering, full-text search, geo bounds,
//!   field projection and keyset pagination
//! - Owner-scoped reads and writes behind an external token verifier
//! - MySQL storage behind the [`db::CatalogStore`] trait

pub mod api;
pub mod auth;
pub mod config;
pub mod db;
pub mod error;
pub mod geo;
pub mod logging;
pub mod metrics;
pub mod models;
pub mod services;
pub mod state;

pub use config::Config;
pub use error::{Error, Result};
pub use state::AppState;
