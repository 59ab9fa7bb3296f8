//! Shared domain types for the podchat synchronization engine: the
//! chronological location key, chat and message types, error taxonomy,
//! RDF vocabularies and pod resource addressing conventions.

pub mod constants;
pub mod error;
pub mod location;
pub mod types;
pub mod urls;
pub mod vocab;
