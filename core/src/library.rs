/// Read-only view of the local content tree: `<root>/<kind>/<gallery>/<file>`
use crate::error::{Result, ShareError};
use crate::gallery::{DocContent, GalleryDescriptor, GallerySource, MediaKind};
use crate::identity::FolderSummary;
use std::collections::BTreeMap;
use std::io::ErrorKind;
use std::path::{Path, PathBuf};
use tracing::debug;

#[derive(Debug, Clone)]
pub struct Library {
    root: PathBuf,
}

impl Library {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    pub async fn list_galleries(&self, kind: MediaKind) -> Result<Vec<GalleryDescriptor>> {
        scan_galleries(&self.root.join(kind.as_str()), GallerySource::Live).await
    }

    pub async fn read_file(&self, kind: MediaKind, gallery: &str, file: &str) -> Result<Vec<u8>> {
        read_gallery_file(&self.root.join(kind.as_str()), gallery, file).await
    }

    pub async fn read_doc(&self, gallery: &str, file: &str) -> Result<DocContent> {
        let bytes = self.read_file(MediaKind::Docs, gallery, file).await?;
        Ok(DocContent {
            filename: format!("{}/{}", gallery, file),
            size: bytes.len() as u64,
            content: String::from_utf8_lossy(&bytes).into_owned(),
        })
    }

    pub async fn folder_info(&self) -> Result<BTreeMap<MediaKind, FolderSummary>> {
        let mut info = BTreeMap::new();
        for kind in MediaKind::ALL {
            let galleries = self.list_galleries(kind).await?;
            info.insert(
                kind,
                FolderSummary {
                    galleries: galleries.len(),
                    files: galleries.iter().map(|g| g.file_count).sum(),
                },
            );
        }
        Ok(info)
    }
}

/// Reject anything that could leave the directory it is joined onto
pub fn safe_component(name: &str) -> Result<&str> {
    if name.is_empty()
        || name == "."
        || name == ".."
        || name.contains('/')
        || name.contains('\\')
        || name.contains('\0')
    {
        return Err(ShareError::Format(format!("invalid path component: {:?}", name)));
    }
    Ok(name)
}

fn is_hidden(name: &str) -> bool {
    name.starts_with('.')
}

/// List every gallery directory under `dir`, sorted by name, with sorted file lists.
/// A missing `dir` is an empty listing.
pub async fn scan_galleries(dir: &Path, source: GallerySource) -> Result<Vec<GalleryDescriptor>> {
    let mut galleries = Vec::new();
    for name in list_entries(dir, EntryKind::Dir).await? {
        let files = list_entries(&dir.join(&name), EntryKind::File).await?;
        galleries.push(GalleryDescriptor::new(name, files, source));
    }
    debug!("Scanned {:?}: {} galleries", dir, galleries.len());
    Ok(galleries)
}

pub async fn read_gallery_file(dir: &Path, gallery: &str, file: &str) -> Result<Vec<u8>> {
    let path = dir.join(safe_component(gallery)?).join(safe_component(file)?);
    match tokio::fs::read(&path).await {
        Ok(bytes) => Ok(bytes),
        Err(e) if e.kind() == ErrorKind::NotFound => {
            Err(ShareError::NotFound(format!("{}/{}", gallery, file)))
        }
        Err(e) => Err(ShareError::Io(e)),
    }
}

#[derive(Clone, Copy, PartialEq)]
enum EntryKind {
    Dir,
    File,
}

async fn list_entries(dir: &Path, wanted: EntryKind) -> Result<Vec<String>> {
    let mut read_dir = match tokio::fs::read_dir(dir).await {
        Ok(rd) => rd,
        Err(e) if e.kind() == ErrorKind::NotFound => return Ok(Vec::new()),
        Err(e) => return Err(ShareError::Io(e)),
    };

    let mut names = Vec::new();
    while let Some(entry) = read_dir.next_entry().await? {
        let Ok(name) = entry.file_name().into_string() else {
            continue;
        };
        if is_hidden(&name) {
            continue;
        }
        // Follows symlinks; dangling entries are skipped
        let Ok(meta) = tokio::fs::metadata(entry.path()).await else {
            continue;
        };
        let matches = match wanted {
            EntryKind::Dir => meta.is_dir(),
            EntryKind::File => meta.is_file(),
        };
        if matches {
            names.push(name);
        }
    }
    names.sort();
    Ok(names)
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    fn seed(root: &Path, rel: &str, body: &[u8]) {
        let path = root.join(rel);
        std::fs::create_dir_all(path.parent().unwrap()).unwrap();
        std::fs::write(path, body).unwrap();
    }

    #[tokio::test]
    async fn test_list_galleries_sorted() {
        let dir = TempDir::new().unwrap();
        seed(dir.path(), "images/trip/b.jpg", b"b");
        seed(dir.path(), "images/trip/a.jpg", b"a");
        seed(dir.path(), "images/trip/.thumbs", b"x");
        seed(dir.path(), "images/attic/c.png", b"c");
        seed(dir.path(), "images/.cache/d.png", b"d");

        let library = Library::new(dir.path());
        let galleries = library.list_galleries(MediaKind::Images).await.unwrap();
        assert_eq!(galleries.len(), 2);
        assert_eq!(galleries[0].name, "attic");
        assert_eq!(galleries[1].files, vec!["a.jpg", "b.jpg"]);
        assert_eq!(galleries[1].file_count, 2);

        assert!(library.list_galleries(MediaKind::Video).await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_read_file_and_doc() {
        let dir = TempDir::new().unwrap();
        seed(dir.path(), "docs/notes/readme.md", b"# hello");
        let library = Library::new(dir.path());

        let doc = library.read_doc("notes", "readme.md").await.unwrap();
        assert_eq!(doc.filename, "notes/readme.md");
        assert_eq!(doc.size, 7);
        assert_eq!(doc.content, "# hello");

        assert!(matches!(
            library.read_file(MediaKind::Docs, "notes", "missing.md").await,
            Err(ShareError::NotFound(_))
        ));
        assert!(matches!(
            library.read_file(MediaKind::Docs, "..", "secret").await,
            Err(ShareError::Format(_))
        ));
    }

    #[tokio::test]
    async fn test_folder_info() {
        let dir = TempDir::new().unwrap();
        seed(dir.path(), "docs/a/1.txt", b"1");
        seed(dir.path(), "docs/a/2.txt", b"2");
        seed(dir.path(), "images/b/3.jpg", b"3");

        let info = Library::new(dir.path()).folder_info().await.unwrap();
        assert_eq!(info[&MediaKind::Docs], FolderSummary { galleries: 1, files: 2 });
        assert_eq!(info[&MediaKind::Images].files, 1);
        assert_eq!(info[&MediaKind::Audio], FolderSummary::default());
    }

    #[test]
    fn test_safe_component() {
        assert!(safe_component("trip").is_ok());
        assert!(safe_component("a b.jpg").is_ok());
        for bad in ["", ".", "..", "a/b", "a\\b"] {
            assert!(safe_component(bad).is_err(), "{:?}", bad);
        }
    }
}
