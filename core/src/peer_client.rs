/// Outbound calls to a remote peer's HTTP surface
use crate::descriptor::ConnectionDescriptor;
use crate::error::{Result, ShareError};
use crate::friends::{Friend, FriendRegistry};
use crate::gallery::{DocContent, GalleryDescriptor, GallerySource, MediaKind};
use crate::identity::NodeInfo;
use bytes::Bytes;
use chrono::Utc;
use http::header::{ACCEPT, USER_AGENT};
use http::{Request, Uri};
use http_body_util::{BodyExt, Full};
use hyper_util::client::legacy::connect::HttpConnector;
use hyper_util::client::legacy::Client;
use hyper_util::rt::TokioExecutor;
use serde::de::DeserializeOwned;
use serde::Deserialize;
use std::time::Duration;
use tokio::time::timeout;
use tracing::debug;

const CLIENT_AGENT: &str = concat!("nodeshare/", env!("CARGO_PKG_VERSION"));

#[derive(Debug, Deserialize)]
struct GalleryListing {
    galleries: Vec<GalleryDescriptor>,
}

#[derive(Debug, Deserialize)]
struct FriendListing {
    friends: Vec<Friend>,
}

/// HTTP client for peer endpoints. Every call is bounded by `timeout` and
/// never retried; calls addressed by peer id refresh that friend's `last_seen`
/// on success.
#[derive(Clone)]
pub struct PeerClient {
    http: Client<HttpConnector, Full<Bytes>>,
    registry: FriendRegistry,
    timeout: Duration,
}

impl PeerClient {
    pub fn new(registry: FriendRegistry, timeout: Duration) -> Self {
        let http = Client::builder(TokioExecutor::new()).build(HttpConnector::new());
        Self {
            http,
            registry,
            timeout,
        }
    }

    pub fn timeout(&self) -> Duration {
        self.timeout
    }

    /// Raw reachability probe against `host:port`, no registry involvement
    pub async fn probe(&self, host: &str, port: u16) -> Result<NodeInfo> {
        self.get_json(&format!("{}:{}", host, port), "/api/info").await
    }

    pub async fn fetch_info(&self, descriptor: &ConnectionDescriptor) -> Result<NodeInfo> {
        self.probe(descriptor.host(), descriptor.port()).await
    }

    pub async fn fetch_galleries(
        &self,
        peer_id: &str,
        kind: MediaKind,
    ) -> Result<Vec<GalleryDescriptor>> {
        let path = format!("/api/galleries/{}", kind);
        let listing: GalleryListing = self.get_peer_json(peer_id, &path).await?;
        Ok(listing
            .galleries
            .into_iter()
            .map(|mut g| {
                g.file_count = g.files.len();
                g.source = GallerySource::Live;
                g.is_downloaded = false;
                g
            })
            .collect())
    }

    pub async fn fetch_file(
        &self,
        peer_id: &str,
        kind: MediaKind,
        gallery: &str,
        filename: &str,
    ) -> Result<Bytes> {
        let path = format!(
            "/api/galleries/{}/{}/{}",
            kind,
            urlencoding::encode(gallery),
            urlencoding::encode(filename)
        );
        let descriptor = self.registry.resolve(peer_id).await?;
        let body = self.get_bytes(&descriptor.authority(), &path).await?;
        self.registry.mark_seen(peer_id, Utc::now()).await;
        Ok(body)
    }

    /// `filename` is `<gallery>/<file>` within the peer's docs tree
    pub async fn fetch_doc(&self, peer_id: &str, filename: &str) -> Result<DocContent> {
        let (gallery, file) = filename
            .split_once('/')
            .filter(|(g, f)| !g.is_empty() && !f.is_empty())
            .ok_or_else(|| {
                ShareError::Format(format!("expected <gallery>/<file>, got {:?}", filename))
            })?;
        let path = format!(
            "/api/docs/{}/{}",
            urlencoding::encode(gallery),
            urlencoding::encode(file)
        );
        self.get_peer_json(peer_id, &path).await
    }

    pub async fn fetch_friends_of(&self, peer_id: &str) -> Result<Vec<Friend>> {
        let listing: FriendListing = self.get_peer_json(peer_id, "/api/friends").await?;
        Ok(listing.friends)
    }

    async fn get_peer_json<T: DeserializeOwned>(&self, peer_id: &str, path: &str) -> Result<T> {
        let descriptor = self.registry.resolve(peer_id).await?;
        let value = self.get_json(&descriptor.authority(), path).await?;
        self.registry.mark_seen(peer_id, Utc::now()).await;
        Ok(value)
    }

    async fn get_json<T: DeserializeOwned>(&self, authority: &str, path: &str) -> Result<T> {
        let body = self.get_bytes(authority, path).await?;
        serde_json::from_slice(&body).map_err(|e| {
            ShareError::Protocol(format!("undecodable response from {}{}: {}", authority, path, e))
        })
    }

    async fn get_bytes(&self, authority: &str, path: &str) -> Result<Bytes> {
        let uri: Uri = format!("http://{}{}", authority, path)
            .parse()
            .map_err(|e| ShareError::Format(format!("invalid peer URL: {}", e)))?;
        let req = Request::get(uri)
            .header(USER_AGENT, CLIENT_AGENT)
            .header(ACCEPT, "application/json, */*")
            .body(Full::new(Bytes::new()))
            .map_err(|e| ShareError::Protocol(format!("failed to build request: {}", e)))?;

        debug!("GET http://{}{}", authority, path);
        let exchange = async {
            let resp = self
                .http
                .request(req)
                .await
                .map_err(|e| ShareError::Unreachable(format!("{}: {}", authority, e)))?;
            let status = resp.status();
            let body = resp
                .into_body()
                .collect()
                .await
                .map_err(|e| ShareError::Unreachable(format!("{}: {}", authority, e)))?
                .to_bytes();
            Ok::<_, ShareError>((status, body))
        };

        let (status, body) = timeout(self.timeout, exchange).await.map_err(|_| {
            ShareError::Timeout(format!("{}{} after {:?}", authority, path, self.timeout))
        })??;

        if status.is_success() {
            Ok(body)
        } else if status.is_client_error() {
            Err(ShareError::NotFound(format!("{} ({})", path, status)))
        } else {
            Err(ShareError::Protocol(format!("{} answered {} for {}", authority, status, path)))
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tokio::net::TcpListener;

    fn client(timeout: Duration) -> PeerClient {
        PeerClient::new(FriendRegistry::new("me", Duration::from_secs(60)), timeout)
    }

    #[tokio::test]
    async fn test_refused_connection_is_unreachable() {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let port = listener.local_addr().unwrap().port();
        drop(listener);

        let result = client(Duration::from_secs(2)).probe("127.0.0.1", port).await;
        assert!(matches!(result, Err(ShareError::Unreachable(_))), "{:?}", result);
    }

    #[tokio::test]
    async fn test_silent_peer_times_out() {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let port = listener.local_addr().unwrap().port();
        let hold = tokio::spawn(async move {
            let (_stream, _) = listener.accept().await.unwrap();
            tokio::time::sleep(Duration::from_secs(5)).await;
        });

        let result = client(Duration::from_millis(200)).probe("127.0.0.1", port).await;
        assert!(matches!(result, Err(ShareError::Timeout(_))), "{:?}", result);
        hold.abort();
    }

    #[tokio::test]
    async fn test_unknown_peer_is_not_found() {
        let result = client(Duration::from_secs(1))
            .fetch_galleries("nobody", MediaKind::Images)
            .await;
        assert!(matches!(result, Err(ShareError::NotFound(_))));
    }

    #[tokio::test]
    async fn test_fetch_doc_requires_gallery() {
        let result = client(Duration::from_secs(1)).fetch_doc("nobody", "readme.md").await;
        assert!(matches!(result, Err(ShareError::Format(_))));
    }
}
