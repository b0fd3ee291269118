//! # pixcache
//!
//! A derivative-image cache in front of an S3-compatible object store.
//! Originals live in the bucket; resized and WebP re-encoded derivatives are
//! produced on first request and kept on the local filesystem.
//!
//! # Request Flow
//!
//! ```text
//! GET /2024/01/a.png.webp?width=300&webp=1
//!   → logical path  2024/01/a.png
//!   → descriptor    { width: 300, webp: true }
//!   → cache key     <root>/webp/resized/300/2024/01/a.png.webp
//!   → hit: serve file   miss: fetch → decode → resize → encode → serve
//! ```
//!
//! Non-image paths and `original=1` requests skip the cache and stream the
//! upstream object verbatim.
//!
//! # Module Map
//!
//! | Module | Role |
//! |--------|------|
//! | [`params`] | Raw query parameters → [`params::TransformDescriptor`] |
//! | [`classify`] | Image-extension check and logical path recovery |
//! | [`cache`] | Cache key layout, single-flight materialization, invalidation |
//! | [`fetch`] | Streaming and buffered reads of originals |
//! | [`imaging`] | Pure-Rust decode, orient, resize and encode |
//! | [`store`] | [`store::ObjectStore`] trait with S3 and in-memory backends |
//! | [`adapter`] | [`adapter::StorageAdapter`]: upload, exists, delete, read, serve |
//! | [`server`] | axum router: the HTTP serving boundary |
//! | [`config`] | `config.toml` loading, merging over stock defaults, validation |
//!
//! # Design Decisions
//!
//! ## Descriptors Never Fail
//!
//! Query parameters are untrusted. A malformed `width` is treated as absent
//! rather than rejected, so a bad link still returns an image at the default
//! width. The cache key omits the width segment in that case, which keeps one
//! artifact per distinct output.
//!
//! ## Atomic Artifacts
//!
//! Encoders write into a temporary file beside the final location; only a
//! finished file is renamed onto the cache key. A crash or a failed decode
//! leaves nothing behind, so "file exists" always means "file is complete".
//!
//! ## One Transcode Per Key
//!
//! Concurrent misses for the same cache key share one fetch and one
//! transcode. The work runs in its own task, so a client that disconnects
//! does not abandon a half-written derivative for the next request.

pub mod adapter;
pub mod cache;
pub mod classify;
pub mod config;
pub mod fetch;
pub mod imaging;
pub mod params;
pub mod server;
pub mod store;
