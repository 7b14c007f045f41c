//! Content checksums for Sharing Cloud.
//!
//! Blobs carry a SHA-256 digest of their content, rendered as lowercase hex.
//! The digest is fixed and stable so stored checksums can be re-verified at
//! any time. It wraps an established library; no custom cryptography.

pub mod hasher;

pub use hasher::ContentHasher;
