//! File-system-like handles over a flat, key-addressed object store.
//!
//! A [`Bucket`] pairs a name with an [`ObjectBackend`](cadapter::client::ObjectBackend).
//! From it callers obtain [`Handle`]s (the root, a single fetched key, or
//! listing results), navigate with [`Handle::get_file`] and
//! [`Handle::get_parent`], read and write values, and walk the
//! pseudo-directory tree with depth bounds.
//!
//! Handles cache what they learn about their key and only go back to the
//! store for what they do not know yet:
//!
//! ```no_run
//! # async fn demo() -> bucketfs::Result<()> {
//! use bucketfs::{Bucket, cadapter::memory::MemoryBackend};
//!
//! let bucket = Bucket::new("repository", MemoryBackend::new());
//! let red = bucket.root().get_file("colors/red.txt")?;
//! red.set_value_as_string("crimson").await?;
//! assert_eq!(red.get_value_as_string().await?, "crimson");
//! # Ok(())
//! # }
//! ```

pub mod bucket;
pub mod cadapter;
pub mod error;
pub mod handle;
mod listing;
pub mod path;
pub mod walk;

pub use bucket::Bucket;
pub use error::{Error, Result, StoreError};
pub use handle::{Handle, NodeKind, TransferHandle, ValueWriter};
pub use path::Path;
pub use walk::UNBOUNDED;
