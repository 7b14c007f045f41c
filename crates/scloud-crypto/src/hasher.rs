use scloud_types::Checksum;
use sha2::{Digest, Sha256};

/// SHA-256 over raw content bytes, with no domain tag. The result matches
/// what `sha256sum` prints.
pub struct ContentHasher;

impl ContentHasher {
    /// Digest raw bytes.
    pub fn checksum(data: &[u8]) -> Checksum {
        Checksum::from_digest(Sha256::digest(data).into())
    }

    /// Verify that data produces the expected checksum.
    pub fn verify(data: &[u8], expected: &Checksum) -> bool {
        Self::checksum(data) == *expected
    }
}
