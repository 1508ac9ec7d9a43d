//! Blob storage for rendered videos.
//!
//! This crate provides:
//! - An S3-compatible client with presigned GET URLs for finished renders
//! - An HMAC-signed delivery-token layer with TTL caps
//! - URL hygiene: a delivery URL is never the raw object key and never
//!   lives longer than one hour

pub mod client;
pub mod delivery;
pub mod error;

pub use client::{BlobClient, BlobConfig, ObjectInfo};
pub use delivery::{
    DeliveryConfig, DeliveryToken, DeliveryUrl, DeliveryUrlGenerator,
    DEFAULT_DOWNLOAD_EXPIRY_SECS, MAX_EXPIRY_SECS,
};
pub use error::{StorageError, StorageResult};
