//! Core data models for the upload and metadata engine.
//!
//! These are plain values: `FileRecord` lives in the metadata index, the
//! batch and stats types are computed per request and serialized as JSON.

pub mod batch;
pub mod file_record;
pub mod stats;
