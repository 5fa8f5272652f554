/// Main node: wires identity, registry, client, library, cache and sync engine together
use crate::cache::DownloadCache;
use crate::config::Config;
use crate::descriptor::ConnectionDescriptor;
use crate::error::{Result, ShareError};
use crate::friends::{Friend, FriendRegistry};
use crate::gallery::{merge, GalleryDescriptor, MediaKind};
use crate::identity::{self, NodeIdentity, NodeInfo};
use crate::library::Library;
use crate::peer_client::PeerClient;
use crate::sync_engine::{ContentSyncEngine, DownloadOutcome};
use serde::Serialize;
use std::time::Duration;
use tokio::net::TcpListener;
use tokio::signal;
use tokio::time::Instant;
use tracing::{info, warn};

/// Answer to a reachability probe
#[derive(Debug, Clone, Serialize)]
pub struct DiscoverResult {
    pub reachable: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub node: Option<NodeIdentity>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub connection_string: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

/// A friend's galleries, live listing merged with what is already cached
#[derive(Debug, Clone, Serialize)]
pub struct PeerGalleries {
    pub peer_id: String,
    pub kind: MediaKind,
    pub peer_online: bool,
    pub galleries: Vec<GalleryDescriptor>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub live_error: Option<String>,
}

#[derive(Clone)]
pub struct Node {
    pub identity: NodeIdentity,
    config: Config,
    pub registry: FriendRegistry,
    pub client: PeerClient,
    pub library: Library,
    pub cache: DownloadCache,
    pub engine: ContentSyncEngine,
}

impl Node {
    /// Create a node, loading identity and friends from the data directory
    pub fn new(config: Config) -> Result<Self> {
        config.validate()?;
        let data_dir = config.data_dir();
        let identity = identity::load_or_create(
            &data_dir,
            &config.node_name(),
            &config.advertised_host,
            config.listen_addr.port(),
        )?;

        let registry =
            FriendRegistry::with_storage(&data_dir, &identity.peer_id, config.online_threshold)?;
        let client = PeerClient::new(registry.clone(), config.peer_timeout);
        let library = Library::new(config.content_dir());
        let cache = DownloadCache::new(data_dir.join("downloads"));
        let engine = ContentSyncEngine::new(
            client.clone(),
            registry.clone(),
            cache.clone(),
            config.download_workers,
        );

        info!("Created node {} ({})", identity.name, identity.peer_id);

        Ok(Self {
            identity,
            config,
            registry,
            client,
            library,
            cache,
            engine,
        })
    }

    pub fn config(&self) -> &Config {
        &self.config
    }

    /// Serve the gateway until Ctrl+C / SIGTERM
    pub async fn start(self) -> Result<()> {
        let listener = TcpListener::bind(self.config.listen_addr).await?;
        info!("Content root: {:?}", self.library.root());
        match self.identity.descriptor() {
            Ok(d) => info!("Connection string: {}", d),
            Err(e) => warn!("Advertised address is not shareable: {}", e),
        }

        tokio::select! {
            result = crate::gateway::serve(listener, self) => result?,
            _ = wait_for_shutdown() => info!("Shutdown signal received, stopping node..."),
        }

        info!("Node stopped");
        Ok(())
    }

    pub async fn info(&self) -> Result<NodeInfo> {
        Ok(NodeInfo {
            node: self.identity.clone(),
            folder_info: self.library.folder_info().await?,
        })
    }

    /// Probe `host` or `host:port` without touching the friend registry
    pub async fn discover(&self, target: &str) -> Result<DiscoverResult> {
        let (host, port) = parse_probe_target(target, self.config.listen_addr.port())?;
        match self.client.probe(&host, port).await {
            Ok(info) => {
                let connection_string = ConnectionDescriptor::new(&host, port, &info.node.peer_id)
                    .map(|d| d.to_string())
                    .ok();
                Ok(DiscoverResult {
                    reachable: true,
                    node: Some(info.node),
                    connection_string,
                    error: None,
                })
            }
            Err(e) if e.is_remote() => {
                info!("Probe of {}:{} failed: {}", host, port, e);
                Ok(DiscoverResult {
                    reachable: false,
                    node: None,
                    connection_string: None,
                    error: Some(e.to_string()),
                })
            }
            Err(e) => Err(e),
        }
    }

    pub async fn add_friend(&self, connection_string: &str, name: Option<&str>) -> Result<Friend> {
        let descriptor = ConnectionDescriptor::parse(connection_string.trim())?;
        self.registry.add(&self.client, &descriptor, name).await
    }

    pub async fn peer_galleries(&self, peer_id: &str, kind: MediaKind) -> Result<PeerGalleries> {
        self.registry.get(peer_id).await?;
        let downloaded = self.cache.list_galleries(peer_id, kind).await?;
        let live = self.client.fetch_galleries(peer_id, kind).await;
        let (live, peer_online, live_error) = match live {
            Ok(live) => (live, true, None),
            Err(e) if downloaded.is_empty() => return Err(e),
            Err(e) => {
                warn!("Live listing from {} failed, serving cache: {}", peer_id, e);
                (Vec::new(), false, Some(e.to_string()))
            }
        };

        Ok(PeerGalleries {
            peer_id: peer_id.to_string(),
            kind,
            peer_online,
            galleries: merge(live, downloaded),
            live_error,
        })
    }

    pub async fn peer_gallery(
        &self,
        peer_id: &str,
        kind: MediaKind,
        gallery: &str,
    ) -> Result<GalleryDescriptor> {
        self.peer_galleries(peer_id, kind)
            .await?
            .galleries
            .into_iter()
            .find(|g| g.name == gallery)
            .ok_or_else(|| ShareError::NotFound(format!("gallery {}", gallery)))
    }

    pub async fn downloaded_gallery(
        &self,
        peer_id: &str,
        kind: MediaKind,
        gallery: &str,
    ) -> Result<GalleryDescriptor> {
        self.cache
            .list_galleries(peer_id, kind)
            .await?
            .into_iter()
            .find(|g| g.name == gallery)
            .ok_or_else(|| ShareError::NotFound(format!("gallery {}", gallery)))
    }

    /// Bulk download with an explicit or configured deadline
    pub async fn download_all(
        &self,
        peer_id: &str,
        deadline_after: Option<Duration>,
    ) -> Result<DownloadOutcome> {
        let budget = deadline_after.unwrap_or(self.config.download_deadline);
        self.engine
            .download_all(peer_id, Some(Instant::now() + budget))
            .await
    }
}

fn parse_probe_target(target: &str, default_port: u16) -> Result<(String, u16)> {
    let target = target.trim();
    let (host, port) = match target.split_once(':') {
        Some((host, port)) => {
            let port = port
                .parse::<u16>()
                .ok()
                .filter(|p| *p > 0)
                .ok_or_else(|| ShareError::Format(format!("invalid port in {:?}", target)))?;
            (host, port)
        }
        None => (target, default_port),
    };
    if host.is_empty() || host.contains(char::is_whitespace) {
        return Err(ShareError::Format(format!("invalid address {:?}", target)));
    }
    Ok((host.to_string(), port))
}

/// Wait for shutdown signal (Ctrl+C)
async fn wait_for_shutdown() {
    let ctrl_c = async {
        if let Err(e) = signal::ctrl_c().await {
            warn!("Failed to listen for Ctrl+C: {}", e);
            std::future::pending::<()>().await;
        }
        info!("Ctrl+C received");
    };

    #[cfg(unix)]
    let terminate = async {
        match signal::unix::signal(signal::unix::SignalKind::terminate()) {
            Ok(mut sig) => {
                sig.recv().await;
                info!("SIGTERM received");
            }
            Err(e) => {
                warn!("Failed to install SIGTERM handler: {}", e);
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {},
        _ = terminate => {},
    }
}
