/// Gallery listings and the live/downloaded merge
use crate::error::{Result, ShareError};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::fmt;
use std::str::FromStr;

/// Media kind; each maps to one top-level directory of a content tree
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum MediaKind {
    Docs,
    Images,
    Audio,
    Video,
}

impl MediaKind {
    pub const ALL: [MediaKind; 4] = [
        MediaKind::Docs,
        MediaKind::Images,
        MediaKind::Audio,
        MediaKind::Video,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            MediaKind::Docs => "docs",
            MediaKind::Images => "images",
            MediaKind::Audio => "audio",
            MediaKind::Video => "video",
        }
    }
}

impl fmt::Display for MediaKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for MediaKind {
    type Err = ShareError;

    fn from_str(s: &str) -> Result<Self> {
        match s {
            "docs" => Ok(MediaKind::Docs),
            "images" => Ok(MediaKind::Images),
            "audio" => Ok(MediaKind::Audio),
            "video" => Ok(MediaKind::Video),
            other => Err(ShareError::Format(format!("unknown media kind: {}", other))),
        }
    }
}

/// Where a listing came from
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum GallerySource {
    #[default]
    Live,
    Downloaded,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct GalleryDescriptor {
    pub name: String,
    #[serde(default)]
    pub file_count: usize,
    pub files: Vec<String>,
    #[serde(default)]
    pub source: GallerySource,
    #[serde(default)]
    pub is_downloaded: bool,
}

impl GalleryDescriptor {
    pub fn new(name: impl Into<String>, files: Vec<String>, source: GallerySource) -> Self {
        Self {
            name: name.into(),
            file_count: files.len(),
            files,
            source,
            is_downloaded: false,
        }
    }
}

/// Text document served by a peer
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DocContent {
    pub filename: String,
    pub size: u64,
    pub content: String,
}

/// Combine live and downloaded listings into one view.
///
/// Live entries come first in input order, followed by downloaded-only
/// entries in input order. A live entry whose name also appears in
/// `downloaded` is flagged `is_downloaded`; names compare byte-exact.
pub fn merge(
    live: Vec<GalleryDescriptor>,
    downloaded: Vec<GalleryDescriptor>,
) -> Vec<GalleryDescriptor> {
    let mut out: Vec<GalleryDescriptor> = Vec::with_capacity(live.len() + downloaded.len());
    let mut by_name: HashMap<String, usize> = HashMap::new();

    for mut g in live {
        if by_name.contains_key(&g.name) {
            continue;
        }
        g.source = GallerySource::Live;
        g.is_downloaded = false;
        by_name.insert(g.name.clone(), out.len());
        out.push(g);
    }

    for mut g in downloaded {
        match by_name.get(&g.name) {
            Some(&idx) => {
                if out[idx].source == GallerySource::Live {
                    out[idx].is_downloaded = true;
                }
            }
            None => {
                g.source = GallerySource::Downloaded;
                g.is_downloaded = false;
                by_name.insert(g.name.clone(), out.len());
                out.push(g);
            }
        }
    }

    out
}

#[cfg(test)]
mod tests {
    use super::*;

    fn gallery(name: &str, files: &[&str]) -> GalleryDescriptor {
        GalleryDescriptor::new(
            name,
            files.iter().map(|f| f.to_string()).collect(),
            GallerySource::Live,
        )
    }

    #[test]
    fn test_merge_trip_and_old() {
        let live = vec![gallery("trip", &["a.jpg"])];
        let downloaded = vec![gallery("trip", &["a.jpg"]), gallery("old", &["b.jpg"])];

        let merged = merge(live, downloaded);
        assert_eq!(merged.len(), 2);
        assert_eq!(merged[0].name, "trip");
        assert_eq!(merged[0].source, GallerySource::Live);
        assert!(merged[0].is_downloaded);
        assert_eq!(merged[1].name, "old");
        assert_eq!(merged[1].source, GallerySource::Downloaded);
        assert!(!merged[1].is_downloaded);
    }

    #[test]
    fn test_merge_ordering() {
        let live = vec![gallery("c", &[]), gallery("a", &[]), gallery("b", &[])];
        let downloaded = vec![gallery("z", &[]), gallery("a", &[]), gallery("y", &[])];

        let names: Vec<_> = merge(live, downloaded).into_iter().map(|g| g.name).collect();
        assert_eq!(names, vec!["c", "a", "b", "z", "y"]);
    }

    #[test]
    fn test_merge_is_case_sensitive() {
        let merged = merge(vec![gallery("Trip", &[])], vec![gallery("trip", &[])]);
        assert_eq!(merged.len(), 2);
        assert!(!merged[0].is_downloaded);
        assert_eq!(merged[1].source, GallerySource::Downloaded);
    }

    #[test]
    fn test_merge_empty_inputs() {
        assert!(merge(vec![], vec![]).is_empty());

        let only_downloaded = merge(vec![], vec![gallery("old", &["x"])]);
        assert_eq!(only_downloaded[0].source, GallerySource::Downloaded);
        assert_eq!(only_downloaded[0].file_count, 1);
    }

    #[test]
    fn test_merge_keeps_first_duplicate() {
        let merged = merge(
            vec![gallery("a", &["1"]), gallery("a", &["2"])],
            vec![gallery("b", &[]), gallery("b", &["3"])],
        );
        assert_eq!(merged.len(), 2);
        assert_eq!(merged[0].files, vec!["1"]);
        assert!(merged[1].files.is_empty());
    }

    #[test]
    fn test_media_kind_parse() {
        assert_eq!("docs".parse::<MediaKind>().unwrap(), MediaKind::Docs);
        assert_eq!(MediaKind::Images.to_string(), "images");
        assert!("Images".parse::<MediaKind>().is_err());
    }

    #[test]
    fn test_listing_ignores_unknown_fields() {
        let raw = r#"{"name":"trip","files":["a.jpg"],"thumbnail":"x"}"#;
        let g: GalleryDescriptor = serde_json::from_str(raw).unwrap();
        assert_eq!(g.source, GallerySource::Live);
        assert!(serde_json::from_str::<GalleryDescriptor>(r#"{"name":"trip"}"#).is_err());
    }
}
