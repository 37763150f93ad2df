pub mod events;
pub mod finalizer;
pub mod reconcile;
pub mod status;
pub mod store;
pub mod types;

use std::sync::Arc;

use futures_util::StreamExt;
use k8s_openapi::api::apps::v1::{DaemonSet, Deployment};
use kube::{
    Client, Resource, ResourceExt,
    api::{Api, ListParams},
    runtime::{Controller, controller::Action, reflector::ObjectRef, watcher::Config},
};
use tracing::{error, info, warn};

use crate::config::{ConfigError, OperatorConfig};
use crate::crd::Deployer;
use crate::templates::TemplateError;
use crate::web::Health;

pub use events::{EventPublisher, KubeEventPublisher, NoopEventPublisher};
pub use reconcile::reconcile_by_name;
pub use store::{DeployerStore, KubeStore, StoreError};
pub use types::Requeue;

pub const CONTROLLER_NAME: &str = "dpv-operator";

#[derive(thiserror::Error, Debug)]
pub enum ReconcileErr {
    #[error(transparent)]
    Store(#[from] StoreError),
    #[error(transparent)]
    Config(#[from] ConfigError),
    /// The pass cannot make progress for this instance; no status is written.
    #[error("fatal: {0}")]
    Fatal(String),
}

impl From<TemplateError> for ReconcileErr {
    fn from(e: TemplateError) -> Self {
        match e {
            TemplateError::Config(c) => ReconcileErr::Config(c),
            other => ReconcileErr::Fatal(other.to_string()),
        }
    }
}

impl ReconcileErr {
    pub fn is_conflict(&self) -> bool {
        matches!(self, ReconcileErr::Store(StoreError::Conflict(_)))
    }

    /// Whether retrying without a spec or config change can help.
    pub fn is_retryable(&self) -> bool {
        matches!(self, ReconcileErr::Store(_))
    }
}

pub struct ControllerContext {
    pub store: Arc<dyn DeployerStore>,
    pub events: Arc<dyn EventPublisher>,
    pub cfg: OperatorConfig,
}

impl ControllerContext {
    pub fn new(
        store: Arc<dyn DeployerStore>,
        events: Arc<dyn EventPublisher>,
        cfg: OperatorConfig,
    ) -> Self {
        Self { store, events, cfg }
    }

    pub fn from_client(client: Client, cfg: OperatorConfig) -> Self {
        Self {
            store: Arc::new(KubeStore::new(client.clone(), cfg.namespace.clone())),
            events: Arc::new(KubeEventPublisher::new(client, CONTROLLER_NAME)),
            cfg,
        }
    }
}

/// Deployers that own `obj` through a controller owner reference.
///
/// Deployers are cluster-scoped while their children are namespaced, so the
/// owner refs are mapped by hand instead of through `Controller::owns`.
pub fn owning_deployers<K: Resource>(obj: K) -> Vec<ObjectRef<Deployer>> {
    let api_version = Deployer::api_version(&());
    let kind = Deployer::kind(&());
    obj.owner_references()
        .iter()
        .filter(|o| o.api_version == api_version && o.kind == kind)
        .map(|o| ObjectRef::new(&o.name))
        .collect()
}

pub async fn run_controller(
    client: Client,
    cfg: OperatorConfig,
    health: Health,
) -> anyhow::Result<()> {
    let deployers: Api<Deployer> = Api::all(client.clone());
    let daemon_sets: Api<DaemonSet> =
        Api::namespaced(client.clone(), &cfg.namespace);
    let deployments: Api<Deployment> =
        Api::namespaced(client.clone(), &cfg.namespace);

    // Fail fast when the CRD is not installed.
    deployers.list(&ListParams::default().limit(1)).await?;

    info!(namespace = %cfg.namespace, "starting deployer controller");
    let ctx = Arc::new(ControllerContext::from_client(client, cfg));
    health.set_ready(true);

    Controller::new(deployers, Config::default())
        .watches(daemon_sets, Config::default(), owning_deployers::<DaemonSet>)
        .watches(deployments, Config::default(), owning_deployers::<Deployment>)
        .shutdown_on_signal()
        .run(reconcile, error_policy, ctx)
        .for_each(|res| async move {
            match res {
                Ok((obj_ref, action)) => {
                    info!(name = %obj_ref.name, ?action, "reconciled")
                }
                Err(e) => warn!(error = ?e, "reconcile error"),
            }
        })
        .await;

    health.set_ready(false);
    Ok(())
}

async fn reconcile(
    obj: Arc<Deployer>,
    ctx: Arc<ControllerContext>,
) -> Result<Action, ReconcileErr> {
    reconcile_by_name(&obj.name_any(), &ctx)
        .await
        .map(Action::from)
}

fn error_policy(
    obj: Arc<Deployer>,
    error: &ReconcileErr,
    ctx: Arc<ControllerContext>,
) -> Action {
    error!(
        ?error,
        name = %obj.name_any(),
        retryable = error.is_retryable(),
        "reconciliation failed"
    );
    if error.is_retryable() {
        Action::requeue(ctx.cfg.error_requeue())
    } else {
        Action::await_change()
    }
}
