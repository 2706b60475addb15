use sha2::{Digest, Sha256};

/// SHA-256 hex digest of a serialized snapshot, logged with every upload so
/// a remote file can be matched to the run that wrote it.
pub fn content_hash(content: &[u8]) -> String {
    let mut hasher = Sha256::new();
    hasher.update(content);
    let digest = hasher.finalize();
    hex::encode(digest)
}
