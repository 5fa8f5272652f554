/// Configuration management
use crate::error::{Result, ShareError};
use serde::{Deserialize, Serialize};
use std::net::SocketAddr;
use std::path::PathBuf;
use std::time::Duration;

const DEFAULT_PORT: u16 = 9000;

/// Node configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Config {
    /// Address the gateway listens on
    pub listen_addr: SocketAddr,

    /// Host other peers should use to reach this node
    pub advertised_host: String,

    /// Human readable node name reported by /api/info
    pub node_name: Option<String>,

    /// Data directory for identity, friends and downloads (defaults to `.nodeshare/node-<port>`)
    pub data_dir: Option<PathBuf>,

    /// Root of the local media/document tree (defaults to `<data_dir>/content`)
    pub content_dir: Option<PathBuf>,

    /// Ceiling for every outbound peer call and cache write
    pub peer_timeout: Duration,

    /// A friend seen within this window is online
    pub online_threshold: Duration,

    /// Concurrent transfers during a bulk download
    pub download_workers: usize,

    /// Default deadline for a whole bulk download
    pub download_deadline: Duration,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            listen_addr: SocketAddr::from(([0, 0, 0, 0], DEFAULT_PORT)),
            advertised_host: "127.0.0.1".to_string(),
            node_name: None,
            data_dir: None,
            content_dir: None,
            peer_timeout: Duration::from_secs(5),
            online_threshold: Duration::from_secs(120),
            download_workers: 6,
            download_deadline: Duration::from_secs(300),
        }
    }
}

impl Config {
    /// Create config from command line arguments
    pub fn from_args(args: &[String]) -> Result<Self> {
        if args.len() < 2 {
            return Err(ShareError::Config(format!(
                "Usage: {} <port> [--host <addr>] [--name <name>] [--data-dir <path>] [--content-dir <path>] [--timeout-ms <ms>] [--online-secs <s>] [--workers <n>] [--deadline-secs <s>]",
                args.first().map(String::as_str).unwrap_or("nodeshare")
            )));
        }

        let port = args[1]
            .parse::<u16>()
            .map_err(|_| ShareError::Config("Port must be a valid number (0-65535)".to_string()))?;

        let mut config = Self {
            listen_addr: SocketAddr::from(([0, 0, 0, 0], port)),
            ..Default::default()
        };

        let mut i = 2;
        while i < args.len() {
            let flag = args[i].as_str();
            let value = args
                .get(i + 1)
                .ok_or_else(|| ShareError::Config(format!("{} requires an argument", flag)))?;
            match flag {
                "--host" => config.advertised_host = value.clone(),
                "--name" => config.node_name = Some(value.clone()),
                "--data-dir" => config.data_dir = Some(PathBuf::from(value)),
                "--content-dir" => config.content_dir = Some(PathBuf::from(value)),
                "--timeout-ms" => {
                    config.peer_timeout = Duration::from_millis(parse_number(flag, value)?)
                }
                "--online-secs" => {
                    config.online_threshold = Duration::from_secs(parse_number(flag, value)?)
                }
                "--workers" => config.download_workers = parse_number(flag, value)? as usize,
                "--deadline-secs" => {
                    config.download_deadline = Duration::from_secs(parse_number(flag, value)?)
                }
                other => {
                    return Err(ShareError::Config(format!("Unknown argument: {}", other)));
                }
            }
            i += 2;
        }

        // Env overrides (nice for scripts)
        if let Ok(host) = std::env::var("NODESHARE_HOST") {
            config.advertised_host = host;
        }
        if let Ok(dir) = std::env::var("NODESHARE_CONTENT_DIR") {
            config.content_dir = Some(PathBuf::from(dir));
        }
        if let Some(ms) = std::env::var("NODESHARE_TIMEOUT_MS")
            .ok()
            .and_then(|s| s.parse::<u64>().ok())
        {
            config.peer_timeout = Duration::from_millis(ms);
        }
        if let Some(n) = std::env::var("NODESHARE_WORKERS")
            .ok()
            .and_then(|s| s.parse::<usize>().ok())
        {
            config.download_workers = n;
        }

        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<()> {
        if self.download_workers == 0 {
            return Err(ShareError::Config("--workers must be at least 1".to_string()));
        }
        if self.peer_timeout.is_zero() {
            return Err(ShareError::Config("--timeout-ms must be positive".to_string()));
        }
        if self.advertised_host.is_empty() || self.advertised_host.contains(':') {
            return Err(ShareError::Config(
                "--host must be a non-empty host without ':'".to_string(),
            ));
        }
        Ok(())
    }

    pub fn data_dir(&self) -> PathBuf {
        self.data_dir.clone().unwrap_or_else(|| {
            PathBuf::from(".nodeshare").join(format!("node-{}", self.listen_addr.port()))
        })
    }

    pub fn content_dir(&self) -> PathBuf {
        self.content_dir
            .clone()
            .unwrap_or_else(|| self.data_dir().join("content"))
    }

    pub fn node_name(&self) -> String {
        self.node_name
            .clone()
            .unwrap_or_else(|| format!("node-{}", self.listen_addr.port()))
    }
}

fn parse_number(flag: &str, value: &str) -> Result<u64> {
    value
        .parse::<u64>()
        .map_err(|_| ShareError::Config(format!("{} must be a non-negative number", flag)))
}
