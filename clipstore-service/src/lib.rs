//! Chunked video storage with social metadata.
//!
//! This crate provides the storage layer behind the clipstore server:
//!
//! - [`chunks::ChunkStore`] splits large binary objects into fixed-size chunks and streams them
//!   back, optionally restricted to a byte range.
//! - [`catalog::ObjectCatalog`] tracks every object's upload state and hides incomplete ones.
//! - [`records::MetadataRepository`] stores descriptive video records and mutates their likes
//!   and comments atomically.
//! - [`gateway::StreamingGateway`] combines the above into all-or-nothing uploads and lazy
//!   downloads.
//!
//! All components share one [`StorageEngine`], which is created at startup and passed to each
//! of them explicitly.
#![warn(missing_docs)]
#![warn(missing_debug_implementations)]

pub mod admin;
pub mod backend;
pub mod catalog;
pub mod chunks;
mod collection;
pub mod error;
pub mod gateway;
pub mod id;
pub mod reaper;
pub mod records;
mod service;
mod stream;

pub use error::{Error, Result};
pub use service::{StorageConfig, StorageEngine};
pub use stream::PayloadStream;
