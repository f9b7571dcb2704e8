use async_trait::async_trait;
use std::collections::HashMap;
use tokio::sync::RwLock;

use crate::artifact::Artifact;

use super::{cache_key, ArtifactCache};

/// Process-local cache; never evicts on its own.
#[derive(Debug, Default)]
pub struct MemoryArtifactCache {
    entries: RwLock<HashMap<String, Artifact>>,
}

impl MemoryArtifactCache {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn len(&self) -> usize {
        self.entries.read().await.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.entries.read().await.is_empty()
    }

    /// Drop every entry (e.g. to simulate eviction).
    pub async fn clear(&self) {
        self.entries.write().await.clear();
    }
}

#[async_trait]
impl ArtifactCache for MemoryArtifactCache {
    async fn get(&self, identity: &str, context: &str) -> Option<Artifact> {
        self.entries
            .read()
            .await
            .get(&cache_key(identity, context))
            .cloned()
    }

    async fn put(&self, artifact: &Artifact, identity: &str, context: &str) {
        self.entries
            .write()
            .await
            .insert(cache_key(identity, context), artifact.clone());
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::artifact::ArtifactFormat;

    #[tokio::test]
    async fn put_then_get_by_identity_and_context() {
        let cache = MemoryArtifactCache::new();
        let art = Artifact::new(ArtifactFormat::Gif, b"GIF89a".to_vec());
        cache.put(&art, "a.gif", "thumb").await;
        assert_eq!(cache.get("a.gif", "thumb").await, Some(art));
        assert_eq!(cache.get("a.gif", "full").await, None);
        assert_eq!(cache.len().await, 1);
        cache.clear().await;
        assert!(cache.is_empty().await);
    }
}
