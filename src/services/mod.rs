//! Engine services: storage gateways, content validation, the metadata index
//! and the upload/batch orchestration on top of them.

pub mod batch_coordinator;
pub mod content_validator;
pub mod disk_store;
pub mod memory_store;
pub mod metadata_index;
pub mod object_store;
pub mod signing;
pub mod staging;
pub mod upload_pipeline;
