//! Kubernetes Cluster Client
//!
//! The control-plane collaborator for the pod status engine. Lists and
//! watches pods, projecting each one into a [`WorkloadRecord`], and exposes
//! the handful of passthrough calls the status service needs.
//!
//! # Example
//!
//! ```no_run
//! use cluster_client::{ClusterClientTrait, KubeClusterClient, NamespaceScope};
//!
//! # async fn example() -> Result<(), Box<dyn std::error::Error>> {
//! // Uses ~/.kube/config locally, the service account in-cluster
//! let client = KubeClusterClient::try_default().await?;
//!
//! let pods = client.list_pods(&NamespaceScope::All).await?;
//! println!("{} pods", pods.len());
//! # Ok(())
//! # }
//! ```
//!
//! # Features
//!
//! - **Informer-style watch**: `Resync`, listed pods, `Synced`, then deltas
//! - **Typed records**: pods are converted once, at the edge
//! - **Mocking**: `test-util` enables [`MockClusterClient`]

pub mod client;
pub mod convert;
pub mod error;
pub mod models;
#[path = "trait.rs"]
pub mod cluster_trait;
#[cfg(feature = "test-util")]
pub mod mock;

pub use client::KubeClusterClient;
pub use cluster_trait::{ClusterClientTrait, WatchStream};
pub use error::ClusterError;
pub use models::*;
#[cfg(feature = "test-util")]
pub use mock::{MockClusterClient, WatchScript};
