//! The abstract syntax tree: scopes of declarations, reached by a two-pass
//! builder that turns a [`crate::parser::ParseTree`] into this typed form.
//! See spec.md §3.4 / §4.7.

pub mod builder;
pub mod source;

pub use source::*;
