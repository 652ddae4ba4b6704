//! # Sandboxed File Manager
//!
//! A secure, path-sandboxed file store. Every operation resolves its path
//! relative to a base directory, canonicalizes it (so `..`, `.`, and
//! symlinks are handled correctly), and rejects anything that would escape
//! the sandbox root.
//!
//! This crate backs the proxy's published output directories: the per-proxy
//! playlist/guide (atomic write) and the logo cache (plain read/write).
//!
//! ## Atomic publish
//!
//! ```rust
//! use sandboxed_file_manager::SandboxedManager;
//!
//! # async fn example() -> Result<(), Box<dyn std::error::Error>> {
//! let outputs = SandboxedManager::builder()
//!     .base_directory("/var/lib/m3u-proxy/proxies/01JB")
//!     .build()
//!     .await?;
//!
//! // write_atomic writes to .tmp/<name>.<rand>, fsyncs, then renames over
//! // the live file so concurrent readers never observe a partial write.
//! outputs.write_atomic("playlist.m3u", "#EXTM3U\n").await?;
//! let playlist = outputs.read_to_string("playlist.m3u").await?;
//! # Ok(())
//! # }
//! ```
//!
//! ## Logo cache
//!
//! ```rust
//! use sandboxed_file_manager::SandboxedManager;
//!
//! # async fn example() -> Result<(), Box<dyn std::error::Error>> {
//! let logos = SandboxedManager::builder()
//!     .base_directory("/var/lib/m3u-proxy/logos")
//!     .build()
//!     .await?;
//!
//! logos.write_atomic("01JB.png", b"...".as_slice()).await?;
//! let bytes = logos.read("01JB.png").await?;
//! # Ok(())
//! # }
//! ```
//!
//! ## Security
//!
//! Path canonicalization resolves `../`, `.`, and symlinks before any
//! operation is allowed, and every resolved path is checked to remain
//! inside the sandbox root.

pub mod error;
pub mod manager;
pub mod security;

pub use error::{Result, SandboxedFileError};
pub use manager::{SandboxedManager, SandboxedManagerBuilder};

// Re-export commonly used types
pub use std::time::Duration;
