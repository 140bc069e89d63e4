pub mod cache;
pub mod csv;
pub mod data;
pub mod encoding;
pub mod export;
pub mod file;
pub mod inference;
pub mod linear;
pub mod model;
pub mod pipeline;
pub mod print;
pub mod reindex;
pub mod summary;

#[doc = include_str!("../../README.md")]
#[cfg(doc)]
fn readme() {}
