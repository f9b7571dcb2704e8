//! Artifact cache collaborator.
//!
//! The scheduler probes the cache before fetching and writes decoded
//! artifacts back after a successful fetch. Implementations may evict at any
//! time; a miss simply means "fetch it".

mod disk;
mod memory;

use async_trait::async_trait;
use sha2::{Digest, Sha256};

use crate::artifact::Artifact;

pub use disk::DiskArtifactCache;
pub use memory::MemoryArtifactCache;

/// Content store keyed by `(resource identity, base context)`.
#[async_trait]
pub trait ArtifactCache: Send + Sync {
    async fn get(&self, identity: &str, context: &str) -> Option<Artifact>;
    async fn put(&self, artifact: &Artifact, identity: &str, context: &str);
}

/// Stable key for `(identity, context)`: SHA-256 as lowercase hex.
pub fn cache_key(identity: &str, context: &str) -> String {
    let mut hasher = Sha256::new();
    hasher.update(context.as_bytes());
    hasher.update([0u8]);
    hasher.update(identity.as_bytes());
    hex::encode(hasher.finalize())
}
