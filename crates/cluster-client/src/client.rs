//! kube-rs backed cluster client
//!
//! Implements [`ClusterClientTrait`] on top of `kube::Api<Pod>` and
//! `kube_runtime::watcher`, which owns the list/watch protocol and
//! resource-version bookkeeping.

use crate::error::ClusterError;
use crate::models::{NamespaceScope, WatchNotification, WorkloadRecord};
use crate::cluster_trait::{ClusterClientTrait, WatchStream};
use futures::{StreamExt, future};
use k8s_openapi::api::core::v1::{Namespace, Pod};
use kube::api::{Api, DeleteParams, ListParams};
use kube::Client;
use kube_runtime::watcher::{self, watcher};
use kube_runtime::WatchStreamExt;
use tracing::{debug, info, warn};

/// Cluster client backed by a kube [`Client`]
#[derive(Clone)]
pub struct KubeClusterClient {
    client: Client,
}

impl KubeClusterClient {
    /// Wrap an already configured kube client
    pub fn new(client: Client) -> Self {
        Self { client }
    }

    /// Connect using the local kubeconfig, or the in-cluster service account
    pub async fn try_default() -> Result<Self, ClusterError> {
        info!("Connecting to the Kubernetes API");
        let client = Client::try_default().await?;
        Ok(Self::new(client))
    }

    fn pods(&self, scope: &NamespaceScope) -> Api<Pod> {
        match scope.as_filter() {
            Some(ns) => Api::namespaced(self.client.clone(), ns),
            None => Api::all(self.client.clone()),
        }
    }
}

fn map_event(event: watcher::Event<Pod>) -> Result<WatchNotification, ClusterError> {
    Ok(match event {
        watcher::Event::Init => WatchNotification::Resync,
        watcher::Event::InitApply(pod) => WatchNotification::added(WorkloadRecord::try_from(pod)?),
        watcher::Event::InitDone => WatchNotification::Synced,
        watcher::Event::Apply(pod) => WatchNotification::updated(WorkloadRecord::try_from(pod)?),
        watcher::Event::Delete(pod) => WatchNotification::Deleted(WorkloadRecord::try_from(pod)?),
    })
}

/// Split watcher errors into broken-contract failures, which are surfaced,
/// and connection hiccups, which the backoff-wrapped watcher recovers from
/// by re-listing.
fn map_watcher_error(error: watcher::Error) -> Option<ClusterError> {
    match error {
        watcher::Error::InitialListFailed(kube::Error::SerdeError(e))
        | watcher::Error::WatchFailed(kube::Error::SerdeError(e)) => {
            Some(ClusterError::UnexpectedObject(e.to_string()))
        }
        other => {
            warn!("Pod watch interrupted, retrying with backoff: {}", other);
            None
        }
    }
}

#[async_trait::async_trait]
impl ClusterClientTrait for KubeClusterClient {
    async fn list_pods(&self, scope: &NamespaceScope) -> Result<Vec<WorkloadRecord>, ClusterError> {
        let pods = self
            .pods(scope)
            .list(&ListParams::default())
            .await
            .map_err(|e| ClusterError::Connectivity(e.to_string()))?;
        debug!("There are {} pods in {}", pods.items.len(), scope);
        pods.items.iter().map(WorkloadRecord::try_from).collect()
    }

    fn watch_pods(&self, scope: &NamespaceScope) -> WatchStream {
        info!("Opening pod watch for {}", scope);
        watcher(self.pods(scope), watcher::Config::default())
            .default_backoff()
            .filter_map(|item| {
                future::ready(match item {
                    Ok(event) => Some(map_event(event)),
                    Err(e) => map_watcher_error(e).map(Err),
                })
            })
            .boxed()
    }

    async fn list_namespaces(&self) -> Result<Vec<String>, ClusterError> {
        let api: Api<Namespace> = Api::all(self.client.clone());
        let namespaces = api.list(&ListParams::default()).await?;
        debug!("There are {} namespaces in the cluster", namespaces.items.len());
        Ok(namespaces
            .items
            .into_iter()
            .filter_map(|ns| ns.metadata.name)
            .collect())
    }

    async fn delete_pod(&self, namespace: &str, name: &str) -> Result<(), ClusterError> {
        info!("Deleting pod {}/{}", namespace, name);
        let api: Api<Pod> = Api::namespaced(self.client.clone(), namespace);
        api.delete(name, &DeleteParams::default()).await?;
        Ok(())
    }
}
