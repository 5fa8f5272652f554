/// REST gateway: local API for the UI plus the surface peers call into
///
/// Endpoints (local):
///   GET    /api/info
///   POST   /api/discover                      body: {"ip":"<host>[:<port>]"}
///   GET    /api/friends
///   POST   /api/friends                       body: {"connection_string":"host:port:peerID","name":"..."}
///   GET    /api/friends/:peer_id
///   DELETE /api/friends/:peer_id
///   GET    /api/peer-galleries/:peer_id[/:gallery[/:file]]   ?kind=images
///   GET    /api/downloaded/:peer_id/:kind[/:gallery[/:file]]
///   POST   /api/peer-docs/:peer_id/download   ?timeout_ms=N
///   GET    /api/peer-docs/:peer_id[/:gallery/:file | /:gallery%2F:file]
///   GET    /api/peer-friends/:peer_id
///
/// Endpoints (peer-facing):
///   GET    /api/galleries/:kind[/:gallery/:file]
///   GET    /api/docs/:gallery/:file
use crate::error::{Result, ShareError};
use crate::gallery::MediaKind;
use crate::node::Node;
use bytes::Bytes;
use http_body_util::{BodyExt, Full, Limited};
use hyper::server::conn::http1;
use hyper::service::service_fn;
use hyper::{Method, Request, Response, StatusCode};
use hyper_util::rt::TokioIo;
use serde::de::DeserializeOwned;
use serde::Deserialize;
use std::convert::Infallible;
use std::sync::Arc;
use std::time::Duration;
use tokio::net::TcpListener;
use tracing::{debug, error, info, warn};

const MAX_BODY_BYTES: usize = 64 * 1024;

type Resp = Response<Full<Bytes>>;

// ─── Helpers ─────────────────────────────────────────────────────────────────

fn cors_headers(builder: hyper::http::response::Builder) -> hyper::http::response::Builder {
    builder
        .header("Access-Control-Allow-Origin", "*")
        .header("Access-Control-Allow-Methods", "GET, POST, DELETE, OPTIONS")
        .header("Access-Control-Allow-Headers", "Content-Type")
}

fn respond(status: StatusCode, content_type: &str, body: Bytes) -> Resp {
    cors_headers(Response::builder())
        .status(status)
        .header("Content-Type", content_type)
        .body(Full::new(body))
        .unwrap_or_else(|_| Response::new(Full::new(Bytes::new())))
}

fn json_ok<T: serde::Serialize>(value: &T) -> Resp {
    match serde_json::to_vec(value) {
        Ok(body) => respond(StatusCode::OK, "application/json", Bytes::from(body)),
        Err(e) => json_err(&ShareError::Serialization(e)),
    }
}

fn json_err(err: &ShareError) -> Resp {
    let body = serde_json::to_vec(&serde_json::json!({ "error": err.to_string() }))
        .unwrap_or_default();
    respond(err.status_code(), "application/json", Bytes::from(body))
}

fn file_ok(name: &str, body: Bytes) -> Resp {
    respond(StatusCode::OK, detect_content_type(name), body)
}

// ─── Entry point ─────────────────────────────────────────────────────────────

/// Accept connections on `listener` forever, one task per connection
pub async fn serve(listener: TcpListener, node: Node) -> Result<()> {
    let addr = listener.local_addr()?;
    info!("Gateway listening on http://{}", addr);

    let node = Arc::new(node);
    loop {
        match listener.accept().await {
            Ok((stream, remote)) => {
                debug!("Connection from {}", remote);
                let io = TokioIo::new(stream);
                let node = node.clone();
                tokio::spawn(async move {
                    let svc = service_fn(move |req| {
                        let node = node.clone();
                        async move { Ok::<_, Infallible>(handle(req, node).await) }
                    });
                    if let Err(e) = http1::Builder::new().serve_connection(io, svc).await {
                        if !e.is_incomplete_message() {
                            error!("Gateway connection error: {:?}", e);
                        }
                    }
                });
            }
            Err(e) => error!("Gateway accept error: {}", e),
        }
    }
}

// ─── Router ──────────────────────────────────────────────────────────────────

async fn handle(req: Request<hyper::body::Incoming>, node: Arc<Node>) -> Resp {
    let method = req.method().clone();
    let path = req.uri().path().to_string();

    if method == Method::OPTIONS {
        return respond(StatusCode::NO_CONTENT, "text/plain", Bytes::new());
    }

    match route(req, &node).await {
        Ok(resp) => resp,
        Err(e) => {
            if e.status_code().is_server_error() {
                warn!("{} {} failed: {}", method, path, e);
            } else {
                debug!("{} {} rejected: {}", method, path, e);
            }
            json_err(&e)
        }
    }
}

async fn route(req: Request<hyper::body::Incoming>, node: &Node) -> Result<Resp> {
    let method = req.method().clone();
    let query = req.uri().query().unwrap_or("").to_string();
    let segments = path_segments(req.uri().path())?;
    let segs: Vec<&str> = segments.iter().map(String::as_str).collect();

    match (&method, segs.as_slice()) {
        (&Method::GET, ["api", "info"]) => Ok(json_ok(&node.info().await?)),
        (&Method::POST, ["api", "discover"]) => post_discover(req, node).await,

        (&Method::GET, ["api", "friends"]) => {
            Ok(json_ok(&serde_json::json!({ "friends": node.registry.list().await })))
        }
        (&Method::POST, ["api", "friends"]) => post_add_friend(req, node).await,
        (&Method::GET, ["api", "friends", peer_id]) => Ok(json_ok(&node.registry.get(peer_id).await?)),
        (&Method::DELETE, ["api", "friends", peer_id]) => {
            node.registry.remove(peer_id).await?;
            Ok(json_ok(&serde_json::json!({ "removed": true })))
        }

        // Peer-facing: our own library
        (&Method::GET, ["api", "galleries", kind]) => {
            let galleries = node.library.list_galleries(kind.parse()?).await?;
            Ok(json_ok(&serde_json::json!({ "galleries": galleries })))
        }
        (&Method::GET, ["api", "galleries", kind, gallery, file]) => {
            let bytes = node.library.read_file(kind.parse()?, gallery, file).await?;
            Ok(file_ok(file, Bytes::from(bytes)))
        }
        (&Method::GET, ["api", "docs", gallery, file]) => {
            Ok(json_ok(&node.library.read_doc(gallery, file).await?))
        }

        // Live view of a friend's content
        (&Method::GET, ["api", "peer-galleries", peer_id]) => {
            let kind = kind_param(&query)?;
            Ok(json_ok(&node.peer_galleries(peer_id, kind).await?))
        }
        (&Method::GET, ["api", "peer-galleries", peer_id, gallery]) => {
            let kind = kind_param(&query)?;
            Ok(json_ok(&node.peer_gallery(peer_id, kind, gallery).await?))
        }
        (&Method::GET, ["api", "peer-galleries", peer_id, gallery, file]) => {
            let kind = kind_param(&query)?;
            let bytes = node.client.fetch_file(peer_id, kind, gallery, file).await?;
            Ok(file_ok(file, bytes))
        }

        // Cached view of a friend's content
        (&Method::GET, ["api", "downloaded", peer_id, kind]) => {
            let kind: MediaKind = kind.parse()?;
            let galleries = node.cache.list_galleries(peer_id, kind).await?;
            Ok(json_ok(&serde_json::json!({
                "peer_id": peer_id,
                "kind": kind,
                "galleries": galleries,
            })))
        }
        (&Method::GET, ["api", "downloaded", peer_id, kind, gallery]) => {
            Ok(json_ok(&node.downloaded_gallery(peer_id, kind.parse()?, gallery).await?))
        }
        (&Method::GET, ["api", "downloaded", peer_id, kind, gallery, file]) => {
            let bytes = node.cache.read_file(peer_id, kind.parse()?, gallery, file).await?;
            Ok(file_ok(file, Bytes::from(bytes)))
        }

        (&Method::POST, ["api", "peer-docs", peer_id, "download"]) => {
            let budget = query_param(&query, "timeout_ms")
                .map(|v| {
                    v.parse::<u64>()
                        .map(Duration::from_millis)
                        .map_err(|_| ShareError::Format(format!("invalid timeout_ms: {}", v)))
                })
                .transpose()?;
            Ok(json_ok(&node.download_all(peer_id, budget).await?))
        }
        (&Method::GET, ["api", "peer-docs", peer_id]) => {
            let galleries = node.client.fetch_galleries(peer_id, MediaKind::Docs).await?;
            Ok(json_ok(&serde_json::json!({
                "peer_id": peer_id,
                "galleries": galleries,
            })))
        }
        (&Method::GET, ["api", "peer-docs", peer_id, filename]) => {
            Ok(json_ok(&node.client.fetch_doc(peer_id, filename).await?))
        }
        (&Method::GET, ["api", "peer-docs", peer_id, gallery, file]) => {
            let filename = format!("{}/{}", gallery, file);
            Ok(json_ok(&node.client.fetch_doc(peer_id, &filename).await?))
        }

        (&Method::GET, ["api", "peer-friends", peer_id]) => {
            let friends = node.client.fetch_friends_of(peer_id).await?;
            Ok(json_ok(&serde_json::json!({ "friends": friends })))
        }

        _ => Err(ShareError::NotFound(format!("no route for {} {}", method, segments.join("/")))),
    }
}

// ─── Handlers ────────────────────────────────────────────────────────────────

#[derive(Deserialize)]
struct DiscoverRequest {
    ip: String,
}

async fn post_discover(req: Request<hyper::body::Incoming>, node: &Node) -> Result<Resp> {
    let r: DiscoverRequest = read_json(req).await?;
    Ok(json_ok(&node.discover(&r.ip).await?))
}

#[derive(Deserialize)]
struct AddFriendRequest {
    connection_string: String,
    name: Option<String>,
}

async fn post_add_friend(req: Request<hyper::body::Incoming>, node: &Node) -> Result<Resp> {
    let r: AddFriendRequest = read_json(req).await?;
    let friend = node.add_friend(&r.connection_string, r.name.as_deref()).await?;
    Ok(json_ok(&serde_json::json!({ "friend": friend })))
}

// ─── Utilities ────────────────────────────────────────────────────────────────

async fn read_json<T: DeserializeOwned>(req: Request<hyper::body::Incoming>) -> Result<T> {
    let body = Limited::new(req.into_body(), MAX_BODY_BYTES)
        .collect()
        .await
        .map_err(|e| ShareError::Format(format!("body read error: {}", e)))?
        .to_bytes();
    serde_json::from_slice(&body).map_err(|e| ShareError::Format(format!("invalid JSON: {}", e)))
}

fn path_segments(path: &str) -> Result<Vec<String>> {
    path.split('/')
        .filter(|s| !s.is_empty())
        .map(|s| {
            urlencoding::decode(s)
                .map(|c| c.into_owned())
                .map_err(|_| ShareError::Format(format!("invalid percent-encoding in {:?}", s)))
        })
        .collect()
}

fn query_param(query: &str, key: &str) -> Option<String> {
    for pair in query.split('&') {
        if let Some((k, v)) = pair.split_once('=') {
            if k == key {
                return urlencoding::decode(v).ok().map(|v| v.into_owned());
            }
        }
    }
    None
}

fn kind_param(query: &str) -> Result<MediaKind> {
    match query_param(query, "kind") {
        Some(kind) => kind.parse(),
        None => Ok(MediaKind::Images),
    }
}

fn detect_content_type(name: &str) -> &'static str {
    let ext = name
        .rsplit_once('.')
        .map(|(_, ext)| ext.to_ascii_lowercase())
        .unwrap_or_default();
    match ext.as_str() {
        "html" | "htm" => "text/html; charset=utf-8",
        "md" | "markdown" => "text/markdown; charset=utf-8",
        "txt" => "text/plain; charset=utf-8",
        "json" => "application/json; charset=utf-8",
        "pdf" => "application/pdf",
        "png" => "image/png",
        "jpg" | "jpeg" => "image/jpeg",
        "gif" => "image/gif",
        "webp" => "image/webp",
        "svg" => "image/svg+xml",
        "mp3" => "audio/mpeg",
        "ogg" => "audio/ogg",
        "wav" => "audio/wav",
        "mp4" => "video/mp4",
        "webm" => "video/webm",
        _ => "application/octet-stream",
    }
}
