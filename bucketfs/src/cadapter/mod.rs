//! Object store adapters (cAdapter)
//!
//! Submodules:
//! - `client`: backend trait and the wire-neutral types the handle layer consumes
//! - `transfer`: background upload/download tasks
//! - `memory`: in-process backend used by tests and demos
//! - `localfs`: backend that maps keys onto a local directory
//! - `s3`: S3-compatible adapter with retries and multipart uploads
//!
pub mod client;
pub mod localfs;
pub mod memory;
mod paging;
pub mod s3;
pub mod transfer;
