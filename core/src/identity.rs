/// Persistent node identity and the /api/info payload
use crate::descriptor::ConnectionDescriptor;
use crate::error::{Result, ShareError};
use crate::gallery::MediaKind;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fs;
use std::path::{Path, PathBuf};
use uuid::Uuid;

/// Who this node is and where peers can reach it. Fixed for the life of the process.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct NodeIdentity {
    pub peer_id: String,
    pub name: String,
    pub host: String,
    pub port: u16,
}

impl NodeIdentity {
    pub fn descriptor(&self) -> Result<ConnectionDescriptor> {
        ConnectionDescriptor::new(&self.host, self.port, &self.peer_id)
    }
}

/// Per-kind summary of a content tree
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct FolderSummary {
    pub galleries: usize,
    pub files: usize,
}

/// Answer to `GET /api/info`
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct NodeInfo {
    pub node: NodeIdentity,
    #[serde(rename = "folderInfo", default)]
    pub folder_info: BTreeMap<MediaKind, FolderSummary>,
}

#[derive(Debug, Serialize, Deserialize)]
struct IdentityFileV1 {
    version: u8,
    peer_id: String,
}

fn identity_path(data_dir: &Path) -> PathBuf {
    data_dir.join("identity.json")
}

/// Load the persisted peer id, or mint and persist a fresh one
pub fn load_or_create(data_dir: &Path, name: &str, host: &str, port: u16) -> Result<NodeIdentity> {
    fs::create_dir_all(data_dir).map_err(ShareError::Io)?;

    let path = identity_path(data_dir);
    let peer_id = if path.exists() {
        let raw = fs::read_to_string(&path).map_err(ShareError::Io)?;
        let parsed: IdentityFileV1 =
            serde_json::from_str(&raw).map_err(ShareError::Serialization)?;
        if parsed.version != 1 {
            return Err(ShareError::Config(format!(
                "Unsupported identity file version: {}",
                parsed.version
            )));
        }
        parsed.peer_id
    } else {
        let peer_id = Uuid::new_v4().simple().to_string();
        let file = IdentityFileV1 {
            version: 1,
            peer_id: peer_id.clone(),
        };
        let json = serde_json::to_string_pretty(&file).map_err(ShareError::Serialization)?;
        fs::write(&path, json).map_err(ShareError::Io)?;
        peer_id
    };

    let identity = NodeIdentity {
        peer_id,
        name: name.to_string(),
        host: host.to_string(),
        port,
    };
    // Fail at startup rather than advertise an address nobody can parse
    identity.descriptor()?;
    Ok(identity)
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn test_identity_is_stable() {
        let dir = TempDir::new().unwrap();
        let first = load_or_create(dir.path(), "attic", "127.0.0.1", 9000).unwrap();
        let second = load_or_create(dir.path(), "attic", "127.0.0.1", 9001).unwrap();
        assert_eq!(first.peer_id, second.peer_id);
        assert_eq!(second.port, 9001);
        assert_eq!(
            first.descriptor().unwrap().to_string(),
            format!("127.0.0.1:9000:{}", first.peer_id)
        );
    }

    #[test]
    fn test_rejects_unknown_version() {
        let dir = TempDir::new().unwrap();
        fs::write(identity_path(dir.path()), r#"{"version":7,"peer_id":"x"}"#).unwrap();
        assert!(matches!(
            load_or_create(dir.path(), "n", "127.0.0.1", 9000),
            Err(ShareError::Config(_))
        ));
    }

    #[test]
    fn test_node_info_wire_names() {
        let info = NodeInfo {
            node: NodeIdentity {
                peer_id: "p".into(),
                name: "n".into(),
                host: "h".into(),
                port: 1,
            },
            folder_info: BTreeMap::new(),
        };
        let v = serde_json::to_value(&info).unwrap();
        assert!(v.get("folderInfo").is_some());
        assert_eq!(v["node"]["peer_id"], "p");
    }
}
