use std::path::Path;
use std::time::Duration;

use anyhow::{anyhow, Result};
use async_trait::async_trait;
use kube::{
    api::{Api, ApiResource, DynamicObject, ListParams},
    config::{KubeConfigOptions, Kubeconfig},
};
use thiserror::Error;
use tracing::debug;

#[cfg(test)]
use mockall::automock;

use crate::admission_request::GroupVersionResource;

#[derive(Debug, Error)]
pub enum ListError {
    #[error("cannot list {resource}: {source}")]
    Kube {
        resource: GroupVersionResource,
        #[source]
        source: kube::Error,
    },

    #[error("listing {resource} did not complete within {timeout:?}")]
    Timeout {
        resource: GroupVersionResource,
        timeout: Duration,
    },
}

/// Read-only access to the live objects of the cluster.
///
/// A single instance is shared by all the in-flight admission requests,
/// implementations must be safe to use concurrently.
#[cfg_attr(test, automock)]
#[async_trait]
pub trait ResourceLister: Send + Sync {
    /// Return the number of objects found at the given coordinate,
    /// fetching at most `limit` of them.
    async fn list(&self, resource: &GroupVersionResource, limit: u32) -> Result<usize, ListError>;
}

/// `ResourceLister` backed by the Kubernetes API server.
#[derive(Clone)]
pub struct KubeResourceLister {
    client: kube::Client,
}

impl KubeResourceLister {
    pub fn new(client: kube::Client) -> Self {
        Self { client }
    }
}

#[async_trait]
impl ResourceLister for KubeResourceLister {
    async fn list(&self, resource: &GroupVersionResource, limit: u32) -> Result<usize, ListError> {
        let api_resource = ApiResource {
            group: resource.group.clone(),
            version: resource.version.clone(),
            api_version: resource.api_version(),
            // the kind is not part of the list URL, the plural is enough
            kind: String::new(),
            plural: resource.resource.clone(),
        };
        let api: Api<DynamicObject> = Api::all_with(self.client.clone(), &api_resource);

        let list = api
            .list(&ListParams::default().limit(limit))
            .await
            .map_err(|source| ListError::Kube {
                resource: resource.to_owned(),
                source,
            })?;
        debug!(resource = %resource, items = list.items.len(), "listed resources");

        Ok(list.items.len())
    }
}

/// Build the Kubernetes client. An empty `kubeconfig` path infers the
/// configuration: in-cluster service account first, then the default
/// kubeconfig file.
pub async fn build_kube_client(kubeconfig: Option<&Path>) -> Result<kube::Client> {
    let config = match kubeconfig {
        Some(path) => {
            let kubeconfig = Kubeconfig::read_from(path)
                .map_err(|e| anyhow!("cannot read kubeconfig {}: {e}", path.display()))?;
            kube::Config::from_custom_kubeconfig(kubeconfig, &KubeConfigOptions::default())
                .await
                .map_err(|e| anyhow!("error building kubernetes config: {e}"))?
        }
        None => kube::Config::infer()
            .await
            .map_err(|e| anyhow!("error building kubernetes config: {e}"))?,
    };

    kube::Client::try_from(config).map_err(|e| anyhow!("error creating kubernetes client: {e}"))
}
