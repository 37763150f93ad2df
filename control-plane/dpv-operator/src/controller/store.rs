use async_trait::async_trait;
use k8s_openapi::api::apps::v1::{DaemonSet, Deployment};
use kube::api::{Api, Patch, PatchParams, PostParams};
use kube::{Client, ResourceExt};
use serde_json::json;

use crate::crd::Deployer;

#[derive(thiserror::Error, Debug, Clone, PartialEq, Eq)]
pub enum StoreError {
    #[error("not found: {0}")]
    NotFound(String),
    /// Stale resourceVersion on write, or create of an existing object.
    #[error("conflict: {0}")]
    Conflict(String),
    #[error("kube api error: {0}")]
    Api(String),
}

impl From<kube::Error> for StoreError {
    fn from(e: kube::Error) -> Self {
        match &e {
            kube::Error::Api(ae) if ae.code == 404 => {
                StoreError::NotFound(ae.message.clone())
            }
            kube::Error::Api(ae) if ae.code == 409 => {
                StoreError::Conflict(ae.message.clone())
            }
            _ => StoreError::Api(e.to_string()),
        }
    }
}

/// Cluster state the reconciler reads and writes.
///
/// `get_*` return `Ok(None)` when the object does not exist. Writes are
/// optimistic: they carry the resourceVersion of the object passed in and
/// fail with [`StoreError::Conflict`] when it is stale.
#[async_trait]
pub trait DeployerStore: Send + Sync {
    async fn get_deployer(
        &self,
        name: &str,
    ) -> Result<Option<Deployer>, StoreError>;

    /// Persist metadata/spec changes (finalizers).
    async fn update_deployer(
        &self,
        deployer: &Deployer,
    ) -> Result<Deployer, StoreError>;

    /// Persist `deployer.status` through the status subresource.
    async fn update_deployer_status(
        &self,
        deployer: &Deployer,
    ) -> Result<Deployer, StoreError>;

    async fn get_daemon_set(
        &self,
        name: &str,
    ) -> Result<Option<DaemonSet>, StoreError>;

    async fn create_daemon_set(
        &self,
        ds: &DaemonSet,
    ) -> Result<DaemonSet, StoreError>;

    async fn get_deployment(
        &self,
        name: &str,
    ) -> Result<Option<Deployment>, StoreError>;

    async fn create_deployment(
        &self,
        dep: &Deployment,
    ) -> Result<Deployment, StoreError>;

    async fn update_deployment(
        &self,
        dep: &Deployment,
    ) -> Result<Deployment, StoreError>;
}

/// [`DeployerStore`] backed by the Kubernetes API server.
pub struct KubeStore {
    client: Client,
    namespace: String,
}

impl KubeStore {
    pub fn new(client: Client, namespace: impl Into<String>) -> Self {
        Self {
            client,
            namespace: namespace.into(),
        }
    }

    fn deployers(&self) -> Api<Deployer> {
        Api::all(self.client.clone())
    }

    fn daemon_sets(&self) -> Api<DaemonSet> {
        Api::namespaced(self.client.clone(), &self.namespace)
    }

    fn deployments(&self) -> Api<Deployment> {
        Api::namespaced(self.client.clone(), &self.namespace)
    }
}

#[async_trait]
impl DeployerStore for KubeStore {
    async fn get_deployer(
        &self,
        name: &str,
    ) -> Result<Option<Deployer>, StoreError> {
        Ok(self.deployers().get_opt(name).await?)
    }

    async fn update_deployer(
        &self,
        deployer: &Deployer,
    ) -> Result<Deployer, StoreError> {
        Ok(self
            .deployers()
            .replace(&deployer.name_any(), &PostParams::default(), deployer)
            .await?)
    }

    async fn update_deployer_status(
        &self,
        deployer: &Deployer,
    ) -> Result<Deployer, StoreError> {
        // resourceVersion in the patch makes the API server reject stale writes
        let patch = json!({
            "metadata": { "resourceVersion": deployer.resource_version() },
            "status": deployer.status,
        });
        Ok(self
            .deployers()
            .patch_status(
                &deployer.name_any(),
                &PatchParams::default(),
                &Patch::Merge(&patch),
            )
            .await?)
    }

    async fn get_daemon_set(
        &self,
        name: &str,
    ) -> Result<Option<DaemonSet>, StoreError> {
        Ok(self.daemon_sets().get_opt(name).await?)
    }

    async fn create_daemon_set(
        &self,
        ds: &DaemonSet,
    ) -> Result<DaemonSet, StoreError> {
        Ok(self.daemon_sets().create(&PostParams::default(), ds).await?)
    }

    async fn get_deployment(
        &self,
        name: &str,
    ) -> Result<Option<Deployment>, StoreError> {
        Ok(self.deployments().get_opt(name).await?)
    }

    async fn create_deployment(
        &self,
        dep: &Deployment,
    ) -> Result<Deployment, StoreError> {
        Ok(self.deployments().create(&PostParams::default(), dep).await?)
    }

    async fn update_deployment(
        &self,
        dep: &Deployment,
    ) -> Result<Deployment, StoreError> {
        Ok(self
            .deployments()
            .replace(&dep.name_any(), &PostParams::default(), dep)
            .await?)
    }
}
