/// Local cache of downloaded peer content.
/// Layout: `<root>/<peer_id>/<kind>/<gallery>/<file>`
use crate::error::Result;
use crate::gallery::{GalleryDescriptor, GallerySource, MediaKind};
use crate::library::{read_gallery_file, safe_component, scan_galleries};
use std::path::{Path, PathBuf};
use tracing::debug;

#[derive(Debug, Clone)]
pub struct DownloadCache {
    root: PathBuf,
}

impl DownloadCache {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    fn kind_dir(&self, peer_id: &str, kind: MediaKind) -> Result<PathBuf> {
        Ok(self.root.join(safe_component(peer_id)?).join(kind.as_str()))
    }

    /// Target path for one cached file; every component is validated
    pub fn file_path(
        &self,
        peer_id: &str,
        kind: MediaKind,
        gallery: &str,
        file: &str,
    ) -> Result<PathBuf> {
        Ok(self
            .kind_dir(peer_id, kind)?
            .join(safe_component(gallery)?)
            .join(safe_component(file)?))
    }

    pub async fn save(
        &self,
        peer_id: &str,
        kind: MediaKind,
        gallery: &str,
        file: &str,
        bytes: &[u8],
    ) -> Result<PathBuf> {
        let path = self.file_path(peer_id, kind, gallery, file)?;
        if let Some(parent) = path.parent() {
            tokio::fs::create_dir_all(parent).await?;
        }
        tokio::fs::write(&path, bytes).await?;
        debug!("Cached {} bytes at {:?}", bytes.len(), path);
        Ok(path)
    }

    pub async fn list_galleries(
        &self,
        peer_id: &str,
        kind: MediaKind,
    ) -> Result<Vec<GalleryDescriptor>> {
        scan_galleries(&self.kind_dir(peer_id, kind)?, GallerySource::Downloaded).await
    }

    pub async fn read_file(
        &self,
        peer_id: &str,
        kind: MediaKind,
        gallery: &str,
        file: &str,
    ) -> Result<Vec<u8>> {
        read_gallery_file(&self.kind_dir(peer_id, kind)?, gallery, file).await
    }
}
