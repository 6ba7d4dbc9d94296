//! Core types for the CouchDB gateway: the schema-free document model and the
//! `DocumentStore` abstraction with its CouchDB implementation.

pub mod document;
pub mod store;
