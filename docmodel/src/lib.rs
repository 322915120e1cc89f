//! Main docmodel crate providing typed document mapping for document databases.
//!
//! This crate is the primary entry point of the docmodel framework. It re-exports the core
//! types from the sub-crates, the `#[derive(Record)]` macro and the storage backends.
//!
//! # Features
//!
//! - **Typed records** - Plain structs mapped to documents by `#[derive(Record)]`
//! - **Checked expressions** - Filters and updates built from typed field paths
//! - **Merge-on-save** - `save` updates only the fields an instance holds
//! - **Multiple backends** - In-memory and MongoDB storage behind one trait
//!
//! # Quick Start
//!
//! ```ignore
//! use docmodel::prelude::*;
//!
//! #[derive(Debug, Clone, PartialEq, Record)]
//! pub struct Point {
//!     pub x: Option<i32>,
//!     pub y: Option<f64>,
//! }
//!
//! #[derive(Debug, Clone, PartialEq, Record)]
//! #[record(collection = "shapes")]
//! pub struct Shape {
//!     #[record(id)]
//!     pub id: Option<ObjectId>,
//!     pub name: String,
//!     pub origin: Point,
//! }
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let store = DocumentStore::new(InMemoryStore::builder().build().await?);
//!     let shapes = store.typed_collection::<Shape>()?;
//!
//!     let mut square = Shape {
//!         id: None,
//!         name: "square".to_string(),
//!         origin: Point { x: Some(1), y: None },
//!     };
//!     shapes.insert_one(&mut square).await?;
//!
//!     let f = Shape::fields();
//!     shapes.update_many(f.origin.x.gte(1), f.origin.y.set(0.5)).await?;
//!
//!     let found = shapes
//!         .find_with(f.name.starts_with("sq"), FindOptions::new().sort(f.name.asc()))
//!         .await?
//!         .try_collect_all()
//!         .await?;
//!
//!     println!("{found:?}");
//!
//!     store.shutdown().await?;
//!     Ok(())
//! }
//! ```
//!
//! # Backends
//!
//! - [`memory`] - In-memory storage for development and testing
//! - `mongodb` - Persistent MongoDB backend (requires the `mongodb` feature)

#[allow(unused_extern_crates)]
extern crate self as docmodel;

pub mod prelude;

pub use docmodel_core::{
    backend, codec, collection, cursor, error, field, query, record, store, update, value,
};
pub use docmodel_macros::Record;

pub use bson;
pub use chrono;
pub use uuid;

pub use docmodel_memory as memory;

#[cfg(feature = "mongodb")]
pub use docmodel_mongodb as mongodb;
