//! Request models for catalog writes

pub mod catalog;

pub use catalog::{parse_new, to_row, NewEvse, NewRecord, NewSite, NewStation};
