/// Bulk download of a friend's docs and images into the local cache
use crate::cache::DownloadCache;
use crate::error::{Result, ShareError};
use crate::friends::FriendRegistry;
use crate::gallery::{GalleryDescriptor, MediaKind};
use crate::peer_client::PeerClient;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::Semaphore;
use tokio::task::{self, JoinSet};
use tokio::time::{timeout, timeout_at, Instant};
use tracing::{debug, info, warn};

/// Media kinds pulled by a bulk download
pub const SYNCED_KINDS: [MediaKind; 2] = [MediaKind::Docs, MediaKind::Images];

/// Item name used for the entry that records a deadline expiry
pub const CANCELLED_ITEM: &str = "*";

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DownloadError {
    pub item: String,
    pub reason: String,
}

/// Aggregate result of one bulk download. Errors are in completion order.
///
/// `errors` holds one entry per failed file plus, on deadline expiry, the
/// `*` entry. A listing that could not be fetched schedules no files, so it
/// is reported in `listing_errors` instead.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct DownloadOutcome {
    pub docs_downloaded: usize,
    pub images_downloaded: usize,
    pub errors: Vec<DownloadError>,
    #[serde(default)]
    pub listing_errors: Vec<DownloadError>,
    /// Files scheduled across every listing that arrived
    pub total_files: usize,
    /// Files still in flight or queued when the deadline expired
    pub abandoned: usize,
}

impl DownloadOutcome {
    pub fn saved(&self) -> usize {
        self.docs_downloaded + self.images_downloaded
    }

    pub fn cancelled(&self) -> bool {
        self.errors.iter().any(|e| e.item == CANCELLED_ITEM)
    }

    /// Failed files, not counting the cancellation entry
    pub fn failed_files(&self) -> usize {
        self.errors.iter().filter(|e| e.item != CANCELLED_ITEM).count()
    }

    /// Completed, but not everything made it
    pub fn is_partial_failure(&self) -> bool {
        !self.errors.is_empty() || !self.listing_errors.is_empty()
    }

    fn record_error(&mut self, item: String, reason: String) {
        warn!("Download of {} failed: {}", item, reason);
        self.errors.push(DownloadError { item, reason });
    }

    fn record_listing_error(&mut self, kind: MediaKind, reason: String) {
        warn!("Listing {} failed: {}", kind, reason);
        self.listing_errors.push(DownloadError {
            item: format!("{}/", kind),
            reason,
        });
    }

    fn record_cancelled(&mut self, abandoned: usize) {
        self.abandoned = abandoned;
        self.record_error(
            CANCELLED_ITEM.to_string(),
            format!("deadline exceeded: {} transfer(s) abandoned", abandoned),
        );
    }
}

#[derive(Debug, Clone)]
struct Transfer {
    kind: MediaKind,
    gallery: String,
    file: String,
}

impl Transfer {
    fn item(&self) -> String {
        format!("{}/{}", self.gallery, self.file)
    }
}

/// What a spawned task was started for
enum Job {
    Listing(MediaKind),
    Transfer(Transfer),
}

/// What a spawned task hands back
enum Completed {
    Listing(MediaKind, Result<Vec<GalleryDescriptor>>),
    Transfer(Transfer, Result<()>),
}

#[derive(Clone)]
pub struct ContentSyncEngine {
    client: PeerClient,
    registry: FriendRegistry,
    cache: DownloadCache,
    workers: usize,
    write_timeout: Duration,
}

impl ContentSyncEngine {
    pub fn new(
        client: PeerClient,
        registry: FriendRegistry,
        cache: DownloadCache,
        workers: usize,
    ) -> Self {
        let write_timeout = client.timeout();
        Self {
            client,
            registry,
            cache,
            workers: workers.max(1),
            write_timeout,
        }
    }

    /// Fetch every doc and image the friend lists and save it in the cache.
    ///
    /// Only an unknown `peer_id` is an error. Everything after that lands in
    /// the outcome: a failed listing or transfer becomes an error entry and
    /// never stops its siblings. Transfers for a listing start as soon as that
    /// listing arrives. When `deadline` passes, outstanding work is aborted and
    /// the outcome reports what finished before it.
    pub async fn download_all(
        &self,
        peer_id: &str,
        deadline: Option<Instant>,
    ) -> Result<DownloadOutcome> {
        let friend = self.registry.get(peer_id).await?;
        let started = Instant::now();
        let mut outcome = DownloadOutcome::default();

        info!("Starting bulk download from {} ({})", friend.peer_name, peer_id);

        let semaphore = Arc::new(Semaphore::new(self.workers));
        let mut tasks = JoinSet::new();
        let mut pending: HashMap<task::Id, Job> = HashMap::new();

        for kind in SYNCED_KINDS {
            let client = self.client.clone();
            let peer = peer_id.to_string();
            let handle = tasks.spawn(async move {
                Completed::Listing(kind, client.fetch_galleries(&peer, kind).await)
            });
            pending.insert(handle.id(), Job::Listing(kind));
        }

        loop {
            let next = match deadline {
                Some(d) => match timeout_at(d, tasks.join_next_with_id()).await {
                    Ok(next) => next,
                    Err(_) => {
                        tasks.abort_all();
                        let mut abandoned = 0;
                        for job in pending.into_values() {
                            match job {
                                Job::Listing(kind) => outcome.record_listing_error(
                                    kind,
                                    "deadline exceeded before the listing arrived".to_string(),
                                ),
                                Job::Transfer(_) => abandoned += 1,
                            }
                        }
                        outcome.record_cancelled(abandoned);
                        break;
                    }
                },
                None => tasks.join_next_with_id().await,
            };

            let Some(joined) = next else {
                break;
            };
            let completed = match joined {
                Ok((id, completed)) => {
                    pending.remove(&id);
                    completed
                }
                Err(e) => {
                    let reason = ShareError::Protocol(format!("task failed: {}", e));
                    match pending.remove(&e.id()) {
                        Some(Job::Listing(kind)) => Completed::Listing(kind, Err(reason)),
                        Some(Job::Transfer(t)) => Completed::Transfer(t, Err(reason)),
                        None => continue,
                    }
                }
            };

            match completed {
                Completed::Listing(kind, Ok(galleries)) => {
                    let transfers = plan(kind, galleries);
                    debug!("Scheduling {} {} transfers from {}", transfers.len(), kind, peer_id);
                    outcome.total_files += transfers.len();
                    for transfer in transfers {
                        let engine = self.clone();
                        let peer = peer_id.to_string();
                        let semaphore = semaphore.clone();
                        let job = transfer.clone();
                        let handle = tasks.spawn(async move {
                            let result = match semaphore.acquire_owned().await {
                                Ok(_permit) => engine.transfer(&peer, &job).await,
                                Err(e) => {
                                    Err(ShareError::Protocol(format!("worker pool closed: {}", e)))
                                }
                            };
                            Completed::Transfer(job, result)
                        });
                        pending.insert(handle.id(), Job::Transfer(transfer));
                    }
                }
                Completed::Listing(kind, Err(e)) => outcome.record_listing_error(kind, e.to_string()),
                Completed::Transfer(transfer, Ok(())) => match transfer.kind {
                    MediaKind::Docs => outcome.docs_downloaded += 1,
                    MediaKind::Images => outcome.images_downloaded += 1,
                    _ => {}
                },
                Completed::Transfer(transfer, Err(e)) => {
                    outcome.record_error(transfer.item(), e.to_string())
                }
            }
        }

        info!(
            "Bulk download from {} done in {:?}: {} docs, {} images, {} errors",
            peer_id,
            started.elapsed(),
            outcome.docs_downloaded,
            outcome.images_downloaded,
            outcome.errors.len() + outcome.listing_errors.len()
        );
        Ok(outcome)
    }

    async fn transfer(&self, peer_id: &str, job: &Transfer) -> Result<()> {
        // Refuse unsafe names before spending a network round trip on them
        self.cache
            .file_path(peer_id, job.kind, &job.gallery, &job.file)?;

        let bytes = self
            .client
            .fetch_file(peer_id, job.kind, &job.gallery, &job.file)
            .await?;

        timeout(
            self.write_timeout,
            self.cache
                .save(peer_id, job.kind, &job.gallery, &job.file, &bytes),
        )
        .await
        .map_err(|_| ShareError::Timeout(format!("writing {} to cache", job.item())))??;
        Ok(())
    }
}

/// One transfer per file, galleries and files in listing order
fn plan(kind: MediaKind, galleries: Vec<GalleryDescriptor>) -> Vec<Transfer> {
    galleries
        .into_iter()
        .flat_map(|g| {
            let gallery = g.name;
            g.files.into_iter().map(move |file| Transfer {
                kind,
                gallery: gallery.clone(),
                file,
            })
        })
        .collect()
}
