//! Storage engine substrate.
//!
//! The service needs two primitives from its storage engine: plain binary objects for chunk
//! payloads ([`Backend`]) and small revisioned documents supporting compare-and-swap for the
//! catalog and the video records ([`DocumentStore`]).

pub mod common;
pub mod in_memory;
pub mod local_fs;

pub use common::{
    Backend, BoxedBackend, BoxedDocumentStore, CasOutcome, Document, DocumentStore, Revision,
};
