/// Friend registry: known peers, persisted in sled, online status derived at read time
use crate::descriptor::ConnectionDescriptor;
use crate::error::{Result, ShareError};
use crate::identity::NodeInfo;
use crate::peer_client::PeerClient;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::path::Path;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::Mutex;
use tracing::{debug, info, warn};

/// What is persisted per friend
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FriendRecord {
    pub peer_id: String,
    pub peer_name: String,
    pub host: String,
    pub port: u16,
    pub added_at: DateTime<Utc>,
    pub last_seen: Option<DateTime<Utc>>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum OnlineStatus {
    /// Never contacted successfully
    #[default]
    Unknown,
    Online,
    Offline,
}

/// A friend as seen by callers, with `is_online` computed for the moment of the read
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Friend {
    pub peer_id: String,
    pub peer_name: String,
    pub host: String,
    pub port: u16,
    pub added_at: DateTime<Utc>,
    pub last_seen: Option<DateTime<Utc>>,
    #[serde(default)]
    pub is_online: bool,
    #[serde(default)]
    pub status: OnlineStatus,
}

pub fn online_status(
    last_seen: Option<DateTime<Utc>>,
    now: DateTime<Utc>,
    threshold: Duration,
) -> OnlineStatus {
    match last_seen {
        None => OnlineStatus::Unknown,
        Some(seen) => match (now - seen).to_std() {
            Ok(elapsed) if elapsed >= threshold => OnlineStatus::Offline,
            // Negative elapsed means the clock moved backwards; treat as fresh
            _ => OnlineStatus::Online,
        },
    }
}

impl Friend {
    fn from_record(record: &FriendRecord, now: DateTime<Utc>, threshold: Duration) -> Self {
        let status = online_status(record.last_seen, now, threshold);
        Self {
            peer_id: record.peer_id.clone(),
            peer_name: record.peer_name.clone(),
            host: record.host.clone(),
            port: record.port,
            added_at: record.added_at,
            last_seen: record.last_seen,
            is_online: status == OnlineStatus::Online,
            status,
        }
    }
}

/// Durable backing for the registry. Calls block, so the registry runs them
/// on the blocking pool.
pub trait FriendStore: Send + Sync + 'static {
    fn save(&self, record: &FriendRecord) -> Result<()>;
    fn delete(&self, peer_id: &str) -> Result<()>;
    fn flush(&self) -> Result<()>;
}

impl FriendStore for sled::Db {
    fn save(&self, record: &FriendRecord) -> Result<()> {
        let value = serde_json::to_vec(record)?;
        self.insert(record.peer_id.as_bytes(), value)?;
        Ok(())
    }

    fn delete(&self, peer_id: &str) -> Result<()> {
        self.remove(peer_id.as_bytes())?;
        Ok(())
    }

    fn flush(&self) -> Result<()> {
        sled::Tree::flush(self)?;
        Ok(())
    }
}

enum StoreOp {
    Save(FriendRecord),
    Delete(String),
}

/// Known peers. Reads only take the map lock. Mutations are serialized by
/// `writes`, reach the store with no map lock held, and are applied to the map
/// once the store accepted them.
#[derive(Clone)]
pub struct FriendRegistry {
    local_peer_id: String,
    friends: Arc<Mutex<HashMap<String, FriendRecord>>>,
    writes: Arc<Mutex<()>>,
    store: Option<Arc<dyn FriendStore>>,
    online_threshold: Duration,
}

impl FriendRegistry {
    /// Create new registry (in-memory only)
    pub fn new(local_peer_id: &str, online_threshold: Duration) -> Self {
        Self::from_parts(local_peer_id, online_threshold, HashMap::new(), None)
    }

    /// Create registry with persistent storage, loading existing friends
    pub fn with_storage(
        data_dir: &Path,
        local_peer_id: &str,
        online_threshold: Duration,
    ) -> Result<Self> {
        let db = sled::open(data_dir.join("friends.db"))
            .map_err(|e| ShareError::Storage(format!("Failed to open friends DB: {}", e)))?;

        let mut friends = HashMap::new();
        for entry in db.iter() {
            let (key, value) = entry?;
            match serde_json::from_slice::<FriendRecord>(&value) {
                Ok(record) => {
                    friends.insert(record.peer_id.clone(), record);
                }
                Err(e) => warn!(
                    "Skipping unreadable friend record {}: {}",
                    String::from_utf8_lossy(&key),
                    e
                ),
            }
        }
        info!("Loaded {} friends", friends.len());

        Ok(Self::from_parts(
            local_peer_id,
            online_threshold,
            friends,
            Some(Arc::new(db)),
        ))
    }

    fn from_parts(
        local_peer_id: &str,
        online_threshold: Duration,
        friends: HashMap<String, FriendRecord>,
        store: Option<Arc<dyn FriendStore>>,
    ) -> Self {
        Self {
            local_peer_id: local_peer_id.to_string(),
            friends: Arc::new(Mutex::new(friends)),
            writes: Arc::new(Mutex::new(())),
            store,
            online_threshold,
        }
    }

    /// Handshake with the peer behind `descriptor`, then record it as a friend.
    ///
    /// The descriptor's peer id is only a claim: the id and name the remote
    /// reports are what get stored. On any network failure the registry is
    /// left untouched.
    pub async fn add(
        &self,
        client: &PeerClient,
        descriptor: &ConnectionDescriptor,
        peer_name: Option<&str>,
    ) -> Result<Friend> {
        let info = client.fetch_info(descriptor).await?;
        if info.node.peer_id != descriptor.peer_id() {
            warn!(
                "Peer at {} claims id {} but reports {}; using the reported id",
                descriptor.authority(),
                descriptor.peer_id(),
                info.node.peer_id
            );
        }
        self.upsert(descriptor, &info, peer_name, Utc::now()).await
    }

    /// Insert or refresh a friend from a confirmed handshake
    pub async fn upsert(
        &self,
        descriptor: &ConnectionDescriptor,
        info: &NodeInfo,
        peer_name: Option<&str>,
        seen_at: DateTime<Utc>,
    ) -> Result<Friend> {
        let peer_id = info.node.peer_id.trim();
        if peer_id.is_empty() {
            return Err(ShareError::Protocol("peer reported an empty id".to_string()));
        }
        // The stored id must round-trip through a connection string or the friend is unreachable
        let address = ConnectionDescriptor::new(descriptor.host(), descriptor.port(), peer_id)
            .map_err(|e| ShareError::Protocol(format!("peer reported an unusable id: {}", e)))?;
        if address.peer_id() == self.local_peer_id {
            return Err(ShareError::Format("cannot add this node as its own friend".to_string()));
        }
        let name = peer_name
            .map(str::trim)
            .filter(|n| !n.is_empty())
            .unwrap_or(info.node.name.as_str())
            .to_string();

        let _writer = self.writes.lock().await;
        let existing = self.friends.lock().await.get(address.peer_id()).cloned();
        let record = match existing {
            Some(mut r) => {
                r.peer_name = name;
                r.host = address.host().to_string();
                r.port = address.port();
                r.last_seen = Some(r.last_seen.map_or(seen_at, |prev| prev.max(seen_at)));
                r
            }
            None => FriendRecord {
                peer_id: address.peer_id().to_string(),
                peer_name: name,
                host: address.host().to_string(),
                port: address.port(),
                added_at: seen_at,
                last_seen: Some(seen_at),
            },
        };

        self.write(StoreOp::Save(record.clone()), true).await?;
        self.friends
            .lock()
            .await
            .insert(record.peer_id.clone(), record.clone());

        info!("Friend {} ({}) at {}:{}", record.peer_name, record.peer_id, record.host, record.port);
        Ok(Friend::from_record(&record, Utc::now(), self.online_threshold))
    }

    pub async fn remove(&self, peer_id: &str) -> Result<()> {
        let _writer = self.writes.lock().await;
        if !self.friends.lock().await.contains_key(peer_id) {
            return Err(ShareError::NotFound(format!("friend {}", peer_id)));
        }
        self.write(StoreOp::Delete(peer_id.to_string()), true).await?;
        self.friends.lock().await.remove(peer_id);
        info!("Removed friend {}", peer_id);
        Ok(())
    }

    /// All friends, oldest first
    pub async fn list(&self) -> Vec<Friend> {
        let now = Utc::now();
        let friends = self.friends.lock().await;
        let mut out: Vec<Friend> = friends
            .values()
            .map(|r| Friend::from_record(r, now, self.online_threshold))
            .collect();
        drop(friends);
        out.sort_by(|a, b| a.added_at.cmp(&b.added_at).then_with(|| a.peer_id.cmp(&b.peer_id)));
        out
    }

    pub async fn get(&self, peer_id: &str) -> Result<Friend> {
        let friends = self.friends.lock().await;
        friends
            .get(peer_id)
            .map(|r| Friend::from_record(r, Utc::now(), self.online_threshold))
            .ok_or_else(|| ShareError::NotFound(format!("friend {}", peer_id)))
    }

    /// Address to use for outbound calls to a friend
    pub async fn resolve(&self, peer_id: &str) -> Result<ConnectionDescriptor> {
        let (host, port) = {
            let friends = self.friends.lock().await;
            let r = friends
                .get(peer_id)
                .ok_or_else(|| ShareError::NotFound(format!("friend {}", peer_id)))?;
            (r.host.clone(), r.port)
        };
        ConnectionDescriptor::new(&host, port, peer_id)
    }

    /// Record a successful contact. Unknown peers are ignored; `last_seen` never moves backwards.
    ///
    /// The contact happened regardless of whether it can be persisted, so the
    /// map is updated first and a store failure is only logged.
    pub async fn mark_seen(&self, peer_id: &str, when: DateTime<Utc>) {
        let _writer = self.writes.lock().await;
        let snapshot = {
            let mut friends = self.friends.lock().await;
            let Some(record) = friends.get_mut(peer_id) else {
                return;
            };
            if record.last_seen.is_some_and(|prev| prev >= when) {
                return;
            }
            record.last_seen = Some(when);
            record.clone()
        };
        if let Err(e) = self.write(StoreOp::Save(snapshot), false).await {
            warn!("Failed to persist last_seen for {}: {}", peer_id, e);
        }
        debug!("Peer {} seen at {}", peer_id, when);
    }

    pub fn online_threshold(&self) -> Duration {
        self.online_threshold
    }

    // Runs on the blocking pool; callers hold `writes` but never the map lock.
    async fn write(&self, op: StoreOp, durable: bool) -> Result<()> {
        let Some(store) = self.store.clone() else {
            return Ok(());
        };
        tokio::task::spawn_blocking(move || {
            match op {
                StoreOp::Save(record) => store.save(&record)?,
                StoreOp::Delete(peer_id) => store.delete(&peer_id)?,
            }
            if durable {
                store.flush()?;
            }
            Ok(())
        })
        .await
        .map_err(|e| ShareError::Storage(format!("friend store task failed: {}", e)))?
    }
}
