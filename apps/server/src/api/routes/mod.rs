//! Route definitions

pub mod catalog;
pub mod metrics;
