//! Pod Watch Engine
//!
//! Keeps an authoritative in-memory view of the pods in a namespace scope
//! and streams their lifecycle to any number of subscribers.
//!
//! # Example
//!
//! ```no_run
//! use std::sync::Arc;
//! use cluster_client::{KubeClusterClient, NamespaceScope};
//! use pod_watch::{WatchConfig, WatchContext, WatchHub};
//!
//! # async fn example() -> Result<(), Box<dyn std::error::Error>> {
//! let client = KubeClusterClient::try_default().await?;
//! let hub = WatchHub::new(WatchContext::new(Arc::new(client), WatchConfig::default()));
//!
//! let session = hub.session(&NamespaceScope::All);
//! session.wait_until_watching().await?;
//! let (snapshot, mut events) = session.subscribe_with_snapshot()?;
//! for (pod, status) in snapshot {
//!     println!("{} {}", pod.id, status);
//! }
//! while let Ok(event) = events.recv().await {
//!     println!("{} {} {}", event.action.as_str(), event.id, event.status);
//! }
//! # Ok(())
//! # }
//! ```
//!
//! # Layout
//!
//! - [`status`]: kubectl-compatible status labels
//! - [`cache`]: identity -> record map, one event per mutation
//! - [`watcher`]: list, bounded sync, then watch
//! - [`broadcaster`]: bounded drop-oldest queue per subscriber
//! - [`session`] / [`hub`]: one shared watcher per scope

pub mod broadcaster;
pub mod cache;
pub mod config;
pub mod error;
pub mod event;
pub mod hub;
pub mod session;
pub mod status;
pub mod watcher;

pub use broadcaster::{EventBroadcaster, Subscription, SubscriptionId};
pub use cache::{LabelledRecord, ResourceCache, SummarizedRecord};
pub use config::{WatchConfig, WatchContext};
pub use error::{SessionEnd, WatchError};
pub use event::{ActionPolicy, Event, EventAction, WireEvent};
pub use hub::WatchHub;
pub use session::WatchSession;
pub use status::{PodSummary, StatusLabel};
pub use watcher::{ResourceWatcher, WatcherState};
