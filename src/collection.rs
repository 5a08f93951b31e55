//! In-memory document collections with unique-index enforcement.
mod core;
mod index;
mod ops;

pub use core::Collection;
pub use index::IndexSpec;
