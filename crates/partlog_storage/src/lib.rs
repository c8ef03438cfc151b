//! # partlog storage
//!
//! Byte-store backends underneath partlog's write-ahead log segments.
//!
//! Backends are **opaque byte stores**: they know nothing about segment
//! headers, record frames or checksums. Every segment file of the log is
//! one backend instance, opened by a segment directory in `partlog_core`.
//!
//! ## Design Principles
//!
//! - Backends are simple byte stores (read, append, positional write, flush)
//! - Preallocation pads with zero bytes; readers treat zeros as end of data
//! - Must be `Send + Sync` so archived segments can be read concurrently
//!
//! ## Available Backends
//!
//! - [`InMemoryBackend`] - For tests and ephemeral logs; handles can share one buffer
//! - [`FileBackend`] - For persistent segments using OS file APIs
//!
//! ## Example
//!
//! ```rust
//! use partlog_storage::{StorageBackend, InMemoryBackend};
//!
//! let mut backend = InMemoryBackend::new();
//! let offset = backend.append(b"hello world").unwrap();
//! let data = backend.read_at(offset, 11).unwrap();
//! assert_eq!(&data, b"hello world");
//! ```

#![deny(unsafe_code)]
#![warn(missing_docs)]

mod backend;
mod error;
mod file;
mod memory;

pub use backend::StorageBackend;
pub use error::{StorageError, StorageResult};
pub use file::FileBackend;
pub use memory::InMemoryBackend;
