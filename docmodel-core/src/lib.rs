//! Typed document mapping for document databases.
//!
//! This crate is the core of the docmodel project and provides:
//!
//! - **Record traits** ([`record`]) - Records, models and their document conversion
//! - **Field registry** ([`field`], [`value`]) - Per-type field descriptors and typed field paths
//! - **Filters** ([`query`]) - Compile-time checked filter construction and the query representation
//! - **Updates** ([`update`]) - Typed update expressions and merge-on-save flattening
//! - **Store backend abstraction** ([`backend`]) - Traits for implementing different storage backends
//! - **Collections interface** ([`collection`]) - Typed persistence over one collection
//! - **Cursors** ([`cursor`]) - Lazy streams of decoded records
//! - **Document store** ([`store`]) - Binding models to collections
//! - **Encoding helpers** ([`codec`]) - Building blocks for `Record` implementations
//! - **Error handling** ([`error`]) - Error types and result types
//!
//! # Example
//!
//! ```ignore
//! use docmodel::prelude::*;
//!
//! #[derive(Debug, Clone, PartialEq, Record)]
//! #[record(collection = "users")]
//! pub struct User {
//!     #[record(id)]
//!     pub id: Option<ObjectId>,
//!     pub name: String,
//!     pub age: Option<i32>,
//! }
//!
//! let f = User::fields();
//! let filter = f.name.starts_with("A").and(f.age.gte(18));
//! let update = f.age.inc(1);
//! ```

#[allow(unused_extern_crates)]
extern crate self as docmodel_core;

pub mod backend;
pub mod codec;
pub mod collection;
pub mod cursor;
pub mod error;
pub mod field;
pub mod query;
pub mod record;
pub mod store;
pub mod update;
pub mod value;

#[cfg(test)]
mod test_support;
