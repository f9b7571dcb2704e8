//! On-disk artifact cache: one file per `(identity, context)` under a directory.

use anyhow::{Context, Result};
use async_trait::async_trait;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use crate::artifact::{Artifact, ArtifactDecoder, ImageDecoder};

use super::{cache_key, ArtifactCache};

/// Stores raw artifact bytes in `dir/<sha256>.bin`; entries are re-validated
/// with the decoder on read, so a corrupted file reads as a miss.
#[derive(Clone)]
pub struct DiskArtifactCache {
    dir: PathBuf,
    decoder: Arc<dyn ArtifactDecoder>,
}

impl std::fmt::Debug for DiskArtifactCache {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("DiskArtifactCache").field("dir", &self.dir).finish()
    }
}

impl DiskArtifactCache {
    /// Open (creating if needed) a cache rooted at `dir`, decoding images.
    pub async fn open(dir: impl Into<PathBuf>) -> Result<Self> {
        Self::open_with_decoder(dir, Arc::new(ImageDecoder)).await
    }

    pub async fn open_with_decoder(
        dir: impl Into<PathBuf>,
        decoder: Arc<dyn ArtifactDecoder>,
    ) -> Result<Self> {
        let dir = dir.into();
        tokio::fs::create_dir_all(&dir)
            .await
            .with_context(|| format!("create cache dir: {}", dir.display()))?;
        Ok(Self { dir, decoder })
    }

    /// Default cache directory: `~/.cache/artload/artifacts`.
    pub fn default_dir() -> Result<PathBuf> {
        let xdg_dirs = xdg::BaseDirectories::with_prefix("artload")?;
        Ok(xdg_dirs.get_cache_home().join("artifacts"))
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    fn path_for(&self, identity: &str, context: &str) -> PathBuf {
        self.dir.join(format!("{}.bin", cache_key(identity, context)))
    }

    async fn write(&self, path: &Path, artifact: &Artifact) -> Result<()> {
        // Write-then-rename so readers never observe a partial file.
        let tmp = path.with_extension("part");
        tokio::fs::write(&tmp, &artifact.data[..])
            .await
            .with_context(|| format!("write {}", tmp.display()))?;
        tokio::fs::rename(&tmp, path)
            .await
            .with_context(|| format!("rename into {}", path.display()))?;
        Ok(())
    }
}

#[async_trait]
impl ArtifactCache for DiskArtifactCache {
    async fn get(&self, identity: &str, context: &str) -> Option<Artifact> {
        let path = self.path_for(identity, context);
        let bytes = match tokio::fs::read(&path).await {
            Ok(b) => b,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return None,
            Err(e) => {
                tracing::warn!(path = %path.display(), error = %e, "artifact cache read failed");
                return None;
            }
        };
        match self.decoder.decode(&bytes) {
            Ok(artifact) => Some(artifact),
            Err(e) => {
                tracing::warn!(path = %path.display(), error = %e, "discarding corrupt cache entry");
                let _ = tokio::fs::remove_file(&path).await;
                None
            }
        }
    }

    async fn put(&self, artifact: &Artifact, identity: &str, context: &str) {
        let path = self.path_for(identity, context);
        if let Err(e) = self.write(&path, artifact).await {
            tracing::warn!(identity, error = %e, "artifact cache write failed");
        }
    }
}
