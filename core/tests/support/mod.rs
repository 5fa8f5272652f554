//! Shared harness: real nodes on ephemeral ports and a scriptable stub peer
#![allow(dead_code)]

use bytes::Bytes;
use http_body_util::Full;
use hyper::server::conn::http1;
use hyper::service::service_fn;
use hyper::{Request, Response, StatusCode};
use hyper_util::rt::TokioIo;
use nodeshare_core::{gateway, Config, Node};
use std::collections::HashMap;
use std::convert::Infallible;
use std::net::SocketAddr;
use std::path::Path;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tempfile::TempDir;
use tokio::net::TcpListener;
use tokio::task::JoinHandle;

pub struct TestNode {
    pub node: Node,
    pub addr: SocketAddr,
    pub dir: TempDir,
    handle: JoinHandle<nodeshare_core::Result<()>>,
}

impl TestNode {
    pub fn connection_string(&self) -> String {
        self.node.identity.descriptor().unwrap().to_string()
    }

    pub fn peer_id(&self) -> &str {
        &self.node.identity.peer_id
    }

    pub fn url(&self, path: &str) -> String {
        format!("http://{}{}", self.addr, path)
    }
}

impl Drop for TestNode {
    fn drop(&mut self) {
        self.handle.abort();
    }
}

pub fn seed(root: &Path, rel: &str, body: &[u8]) {
    let path = root.join(rel);
    std::fs::create_dir_all(path.parent().unwrap()).unwrap();
    std::fs::write(path, body).unwrap();
}

pub async fn spawn_node(name: &str, files: &[(&str, &[u8])]) -> TestNode {
    spawn_node_with(name, files, |_| {}).await
}

/// Start a node serving `files` (paths relative to its content root)
pub async fn spawn_node_with(
    name: &str,
    files: &[(&str, &[u8])],
    tweak: impl FnOnce(&mut Config),
) -> TestNode {
    let dir = TempDir::new().unwrap();
    for (rel, body) in files {
        seed(&dir.path().join("content"), rel, body);
    }

    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    let mut config = Config {
        listen_addr: addr,
        advertised_host: "127.0.0.1".to_string(),
        node_name: Some(name.to_string()),
        data_dir: Some(dir.path().join("data")),
        content_dir: Some(dir.path().join("content")),
        peer_timeout: Duration::from_secs(1),
        ..Default::default()
    };
    tweak(&mut config);

    let node = Node::new(config).unwrap();
    let handle = tokio::spawn(gateway::serve(listener, node.clone()));
    TestNode {
        node,
        addr,
        dir,
        handle,
    }
}

#[derive(Clone)]
pub enum Reply {
    Json(String),
    Body(&'static [u8]),
    Status(u16),
    Delayed(Duration, Box<Reply>),
}

/// A peer that answers from a fixed route table and counts concurrent file requests
pub struct StubPeer {
    pub addr: SocketAddr,
    pub peer_id: String,
    pub max_in_flight: Arc<AtomicUsize>,
    handle: JoinHandle<()>,
}

impl StubPeer {
    pub fn connection_string(&self) -> String {
        format!("127.0.0.1:{}:{}", self.addr.port(), self.peer_id)
    }
}

impl Drop for StubPeer {
    fn drop(&mut self) {
        self.handle.abort();
    }
}

pub async fn spawn_stub_peer(peer_id: &str, mut routes: HashMap<String, Reply>) -> StubPeer {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    routes.entry("/api/info".to_string()).or_insert_with(|| {
        Reply::Json(format!(
            r#"{{"node":{{"peer_id":"{}","name":"stub","host":"127.0.0.1","port":{}}},"folderInfo":{{}}}}"#,
            peer_id,
            addr.port()
        ))
    });

    let routes = Arc::new(routes);
    let in_flight = Arc::new(AtomicUsize::new(0));
    let max_in_flight = Arc::new(AtomicUsize::new(0));
    let max = max_in_flight.clone();

    let handle = tokio::spawn(async move {
        loop {
            let Ok((stream, _)) = listener.accept().await else {
                continue;
            };
            let routes = routes.clone();
            let in_flight = in_flight.clone();
            let max = max.clone();
            tokio::spawn(async move {
                let svc = service_fn(move |req: Request<hyper::body::Incoming>| {
                    let routes = routes.clone();
                    let in_flight = in_flight.clone();
                    let max = max.clone();
                    async move {
                        // Only file fetches count towards the concurrency peak
                        let depth = req.uri().path().split('/').filter(|s| !s.is_empty()).count();
                        let is_file = depth >= 5;
                        if is_file {
                            let now = in_flight.fetch_add(1, Ordering::SeqCst) + 1;
                            max.fetch_max(now, Ordering::SeqCst);
                        }
                        let reply = routes.get(req.uri().path()).cloned();
                        let resp = render(reply).await;
                        if is_file {
                            in_flight.fetch_sub(1, Ordering::SeqCst);
                        }
                        Ok::<_, Infallible>(resp)
                    }
                });
                // One request per connection so a stopped stub really goes dark
                let _ = http1::Builder::new()
                    .keep_alive(false)
                    .serve_connection(TokioIo::new(stream), svc)
                    .await;
            });
        }
    });

    StubPeer {
        addr,
        peer_id: peer_id.to_string(),
        max_in_flight,
        handle,
    }
}

async fn render(reply: Option<Reply>) -> Response<Full<Bytes>> {
    let mut reply = reply.unwrap_or(Reply::Status(404));
    while let Reply::Delayed(delay, inner) = reply {
        tokio::time::sleep(delay).await;
        reply = *inner;
    }
    let (status, body) = match reply {
        Reply::Json(json) => (StatusCode::OK, Bytes::from(json)),
        Reply::Body(bytes) => (StatusCode::OK, Bytes::from_static(bytes)),
        Reply::Status(code) => (
            StatusCode::from_u16(code).unwrap(),
            Bytes::from_static(b"{\"error\":\"stub\"}"),
        ),
        Reply::Delayed(..) => unreachable!(),
    };
    Response::builder()
        .status(status)
        .body(Full::new(body))
        .unwrap()
}

/// Minimal HTTP helper for hitting a node's REST surface
pub async fn request(
    method: &str,
    url: &str,
    body: Option<&str>,
) -> (StatusCode, serde_json::Value) {
    use http_body_util::BodyExt;
    use hyper_util::client::legacy::Client;
    use hyper_util::rt::TokioExecutor;

    let client = Client::builder(TokioExecutor::new()).build_http::<Full<Bytes>>();
    let req = Request::builder()
        .method(method)
        .uri(url)
        .header("Content-Type", "application/json")
        .body(Full::new(Bytes::from(body.unwrap_or("").to_string())))
        .unwrap();
    let resp = client.request(req).await.unwrap();
    let status = resp.status();
    let bytes = resp.into_body().collect().await.unwrap().to_bytes();
    let json = serde_json::from_slice(&bytes).unwrap_or(serde_json::Value::Null);
    (status, json)
}
