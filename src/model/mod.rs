//! Data model shared by the catalog, the search engine and the CLI.

pub mod types;

pub use types::{Categories, StyleRecord};
