//! S3-compatible object storage.
//!
//! This crate provides:
//! - The `BlobStore` capability used by the worker pipeline
//! - An aws-sdk-s3 implementation for S3, MinIO and R2
//! - A closed `StorageError` enumeration for SDK failures

pub mod client;
pub mod error;
pub mod store;

pub use client::{S3BlobStore, S3Config};
pub use error::{StorageError, StorageResult};
pub use store::BlobStore;
