#![doc = "asset-uploader-core: upload pipeline library for asset-uploader."]

//! This crate holds the whole upload pipeline: the blob-sink contract, key
//! derivation, the bounded queue and worker pool, retry policy and completion
//! tracking. Cloud SDK clients live in the CLI crate and plug in through
//! [`contract::BlobSink`].
//!
//! # Usage
//! Build an [`config::UploaderConfig`], wrap a sink in an `Arc`, and call
//! [`dispatch::upload_tree`].

pub mod config;
pub mod contract;
pub mod dispatch;
pub mod enumerate;
pub mod error;
pub mod pool;
pub mod retry;
pub mod tracker;
pub mod unit;

pub use error::{SinkError, UploadError};
