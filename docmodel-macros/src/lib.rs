//! Procedural macros for the docmodel project.
//!
//! `#[derive(Record)]` turns a struct with named fields into a record: it registers the
//! field descriptors, generates the typed field paths (`<Name>Fields`) and the document
//! encoder/decoder, and implements `Model` when a field is marked `#[record(id)]`.
//!
//! # Attributes
//!
//! - `#[record(collection = "name")]` on the struct: default collection of the model
//! - `#[record(id)]` on a field: identifier, stored under `_id`; declared as `I` or `Option<I>`
//! - `#[record(rename = "key")]` on a field: document key, defaults to the member name

#[allow(unused_extern_crates)]
extern crate self as docmodel_macros;

mod record;

use proc_macro::TokenStream;
use syn::{DeriveInput, parse_macro_input};

#[proc_macro_derive(Record, attributes(record))]
pub fn derive_record(input: TokenStream) -> TokenStream {
    let input = parse_macro_input!(input as DeriveInput);

    record::expand(input)
        .unwrap_or_else(syn::Error::into_compile_error)
        .into()
}
