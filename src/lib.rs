//! filevault: upload pipeline and in-process metadata index for a file
//! service backed by an object store.
//!
//! The engine lives in [`services`]: `UploadPipeline` and `BatchCoordinator`
//! drive `ContentValidator` → `ObjectStoreGateway` → `MetadataIndex`. The
//! axum layer in [`handlers`] and [`routes`] is thin glue over it.

pub mod config;
pub mod errors;
pub mod handlers;
pub mod models;
pub mod routes;
pub mod services;
pub mod state;
