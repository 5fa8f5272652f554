/// nodeshare - peer connection & content synchronization
///
/// Nodes share a local media/document tree with their friends: connection
/// strings identify peers, a friend registry remembers them, catalogs are
/// queried live over HTTP, and a bulk download mirrors a friend's docs and
/// images into a local cache.

pub mod cache;
pub mod config;
pub mod descriptor;
pub mod error;
pub mod friends;
pub mod gallery;
pub mod gateway;
pub mod identity;
pub mod library;
pub mod node;
pub mod peer_client;
pub mod sync_engine;

pub use config::Config;
pub use descriptor::ConnectionDescriptor;
pub use error::{Result, ShareError};
pub use friends::{Friend, FriendRegistry, OnlineStatus};
pub use gallery::{merge, GalleryDescriptor, GallerySource, MediaKind};
pub use node::Node;
pub use peer_client::PeerClient;
pub use sync_engine::{ContentSyncEngine, DownloadError, DownloadOutcome};
