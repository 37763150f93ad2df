#![allow(dead_code)]

use std::collections::{BTreeMap, HashMap};
use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use dpv_operator::config::{ImageConfig, OperatorConfig};
use dpv_operator::controller::{
    ControllerContext, DeployerStore, EventPublisher, StoreError,
};
use dpv_operator::crd::{Deployer, DeployerSpec};
use k8s_openapi::api::apps::v1::{DaemonSet, Deployment};
use k8s_openapi::api::core::v1::ObjectReference;
use k8s_openapi::apimachinery::pkg::apis::meta::v1::Time;
use kube::ResourceExt;
use kube::runtime::events::EventType;

pub const NS: &str = "directpv";

pub fn all_images() -> ImageConfig {
    ImageConfig {
        directpv: Some("quay.io/minio/directpv:v4.0.10".into()),
        provisioner: Some("quay.io/minio/csi-provisioner:v3.5.0".into()),
        resizer: Some("quay.io/minio/csi-resizer:v1.8.0".into()),
        node_driver_registrar: Some(
            "quay.io/minio/csi-node-driver-registrar:v2.8.0".into(),
        ),
        liveness_probe: Some("quay.io/minio/livenessprobe:v2.10.0".into()),
    }
}

pub fn test_config(images: ImageConfig) -> OperatorConfig {
    OperatorConfig {
        namespace: NS.into(),
        service_account: "directpv-min-io".into(),
        http_port: 8081,
        create_requeue_secs: 60,
        error_requeue_secs: 30,
        images,
    }
}

/// Store operations that can be made to fail.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Op {
    GetDeployer,
    UpdateDeployer,
    UpdateDeployerStatus,
    GetDaemonSet,
    CreateDaemonSet,
    GetDeployment,
    CreateDeployment,
    UpdateDeployment,
}

#[derive(Default)]
struct State {
    rv: u64,
    deployers: BTreeMap<String, Deployer>,
    /// Last state of deployers purged after their final finalizer went away.
    purged: BTreeMap<String, Deployer>,
    daemon_sets: BTreeMap<String, DaemonSet>,
    deployments: BTreeMap<String, Deployment>,
    writes: Vec<Op>,
    failures: HashMap<Op, (StoreError, bool)>,
    /// Deployer that disappears as soon as an injected failure fires.
    vanish_on_failure: Option<String>,
}

impl State {
    fn next_rv(&mut self) -> Option<String> {
        self.rv += 1;
        Some(self.rv.to_string())
    }

    fn check_failure(&mut self, op: Op) -> Result<(), StoreError> {
        match self.failures.get(&op).cloned() {
            Some((err, persistent)) => {
                if !persistent {
                    self.failures.remove(&op);
                }
                if let Some(name) = self.vanish_on_failure.take() {
                    self.deployers.remove(&name);
                }
                Err(err)
            }
            None => Ok(()),
        }
    }
}

/// In-memory API server: optimistic concurrency on resourceVersion,
/// status subresource split, and purge once finalizers are gone.
#[derive(Default)]
pub struct FakeStore {
    state: Mutex<State>,
}

impl FakeStore {
    pub fn insert_deployer(&self, mut deployer: Deployer) {
        let mut st = self.state.lock().unwrap();
        let name = deployer.name_any();
        if deployer.metadata.uid.is_none() {
            deployer.metadata.uid = Some(format!("uid-{name}"));
        }
        deployer.metadata.resource_version = st.next_rv();
        st.deployers.insert(name, deployer);
    }

    pub fn insert_deployment(&self, mut dep: Deployment) {
        let mut st = self.state.lock().unwrap();
        dep.metadata.resource_version = st.next_rv();
        st.deployments.insert(dep.name_any(), dep);
    }

    /// What a user edit of `spec.size` looks like to the operator.
    pub fn set_size(&self, name: &str, size: i32) {
        let mut st = self.state.lock().unwrap();
        let rv = st.next_rv();
        let d = st.deployers.get_mut(name).expect("deployer exists");
        d.spec.size = size;
        d.metadata.resource_version = rv;
    }

    /// Request deletion; objects without finalizers go away at once.
    pub fn request_delete(&self, name: &str) {
        let mut st = self.state.lock().unwrap();
        let rv = st.next_rv();
        let d = st.deployers.get_mut(name).expect("deployer exists");
        if d.finalizers().is_empty() {
            st.deployers.remove(name);
            return;
        }
        d.metadata.deletion_timestamp = Some(Time(chrono::Utc::now()));
        d.metadata.resource_version = rv;
    }

    pub fn fail_once(&self, op: Op, err: StoreError) {
        self.state.lock().unwrap().failures.insert(op, (err, false));
    }

    pub fn fail_always(&self, op: Op, err: StoreError) {
        self.state.lock().unwrap().failures.insert(op, (err, true));
    }

    /// Delete `name` outright when the next injected failure fires, as if
    /// another actor removed it mid-pass.
    pub fn vanish_on_failure(&self, name: &str) {
        self.state.lock().unwrap().vanish_on_failure = Some(name.to_string());
    }

    pub fn clear_failures(&self) {
        self.state.lock().unwrap().failures.clear();
    }

    pub fn deployer(&self, name: &str) -> Option<Deployer> {
        self.state.lock().unwrap().deployers.get(name).cloned()
    }

    pub fn purged(&self, name: &str) -> Option<Deployer> {
        self.state.lock().unwrap().purged.get(name).cloned()
    }

    pub fn daemon_set(&self, name: &str) -> Option<DaemonSet> {
        self.state.lock().unwrap().daemon_sets.get(name).cloned()
    }

    pub fn deployment(&self, name: &str) -> Option<Deployment> {
        self.state.lock().unwrap().deployments.get(name).cloned()
    }

    pub fn writes(&self) -> Vec<Op> {
        self.state.lock().unwrap().writes.clone()
    }
}

fn conflict(name: &str) -> StoreError {
    StoreError::Conflict(format!(
        "Operation cannot be fulfilled on {name}: the object has been modified"
    ))
}

#[async_trait]
impl DeployerStore for FakeStore {
    async fn get_deployer(
        &self,
        name: &str,
    ) -> Result<Option<Deployer>, StoreError> {
        let mut st = self.state.lock().unwrap();
        st.check_failure(Op::GetDeployer)?;
        Ok(st.deployers.get(name).cloned())
    }

    async fn update_deployer(
        &self,
        deployer: &Deployer,
    ) -> Result<Deployer, StoreError> {
        let mut st = self.state.lock().unwrap();
        st.check_failure(Op::UpdateDeployer)?;
        let name = deployer.name_any();
        let current = st
            .deployers
            .get(&name)
            .cloned()
            .ok_or_else(|| StoreError::NotFound(name.clone()))?;
        if current.resource_version() != deployer.resource_version() {
            return Err(conflict(&name));
        }
        st.writes.push(Op::UpdateDeployer);
        let mut next = deployer.clone();
        // the main resource ignores status
        next.status = current.status.clone();
        next.metadata.deletion_timestamp =
            current.metadata.deletion_timestamp.clone();
        next.metadata.resource_version = st.next_rv();
        if next.metadata.deletion_timestamp.is_some()
            && next.finalizers().is_empty()
        {
            st.deployers.remove(&name);
            st.purged.insert(name, next.clone());
        } else {
            st.deployers.insert(name, next.clone());
        }
        Ok(next)
    }

    async fn update_deployer_status(
        &self,
        deployer: &Deployer,
    ) -> Result<Deployer, StoreError> {
        let mut st = self.state.lock().unwrap();
        st.check_failure(Op::UpdateDeployerStatus)?;
        let name = deployer.name_any();
        let mut next = st
            .deployers
            .get(&name)
            .cloned()
            .ok_or_else(|| StoreError::NotFound(name.clone()))?;
        if next.resource_version() != deployer.resource_version() {
            return Err(conflict(&name));
        }
        st.writes.push(Op::UpdateDeployerStatus);
        next.status = deployer.status.clone();
        next.metadata.resource_version = st.next_rv();
        st.deployers.insert(name, next.clone());
        Ok(next)
    }

    async fn get_daemon_set(
        &self,
        name: &str,
    ) -> Result<Option<DaemonSet>, StoreError> {
        let mut st = self.state.lock().unwrap();
        st.check_failure(Op::GetDaemonSet)?;
        Ok(st.daemon_sets.get(name).cloned())
    }

    async fn create_daemon_set(
        &self,
        ds: &DaemonSet,
    ) -> Result<DaemonSet, StoreError> {
        let mut st = self.state.lock().unwrap();
        st.check_failure(Op::CreateDaemonSet)?;
        let name = ds.name_any();
        if st.daemon_sets.contains_key(&name) {
            return Err(StoreError::Conflict(format!("{name} already exists")));
        }
        st.writes.push(Op::CreateDaemonSet);
        let mut created = ds.clone();
        created.metadata.resource_version = st.next_rv();
        st.daemon_sets.insert(name, created.clone());
        Ok(created)
    }

    async fn get_deployment(
        &self,
        name: &str,
    ) -> Result<Option<Deployment>, StoreError> {
        let mut st = self.state.lock().unwrap();
        st.check_failure(Op::GetDeployment)?;
        Ok(st.deployments.get(name).cloned())
    }

    async fn create_deployment(
        &self,
        dep: &Deployment,
    ) -> Result<Deployment, StoreError> {
        let mut st = self.state.lock().unwrap();
        st.check_failure(Op::CreateDeployment)?;
        let name = dep.name_any();
        if st.deployments.contains_key(&name) {
            return Err(StoreError::Conflict(format!("{name} already exists")));
        }
        st.writes.push(Op::CreateDeployment);
        let mut created = dep.clone();
        created.metadata.resource_version = st.next_rv();
        st.deployments.insert(name, created.clone());
        Ok(created)
    }

    async fn update_deployment(
        &self,
        dep: &Deployment,
    ) -> Result<Deployment, StoreError> {
        let mut st = self.state.lock().unwrap();
        st.check_failure(Op::UpdateDeployment)?;
        let name = dep.name_any();
        let current = st
            .deployments
            .get(&name)
            .cloned()
            .ok_or_else(|| StoreError::NotFound(name.clone()))?;
        if current.resource_version() != dep.resource_version() {
            return Err(conflict(&name));
        }
        st.writes.push(Op::UpdateDeployment);
        let mut next = dep.clone();
        next.metadata.resource_version = st.next_rv();
        st.deployments.insert(name, next.clone());
        Ok(next)
    }
}

#[derive(Debug, Clone)]
pub struct RecordedEvent {
    pub warning: bool,
    pub reason: String,
    pub action: String,
    pub note: Option<String>,
    pub object: Option<String>,
}

#[derive(Default)]
pub struct RecordingEvents {
    events: Mutex<Vec<RecordedEvent>>,
}

impl RecordingEvents {
    pub fn events(&self) -> Vec<RecordedEvent> {
        self.events.lock().unwrap().clone()
    }
}

#[async_trait]
impl EventPublisher for RecordingEvents {
    async fn publish(
        &self,
        obj_ref: &ObjectReference,
        type_: EventType,
        reason: &str,
        action: &str,
        note: Option<String>,
    ) {
        self.events.lock().unwrap().push(RecordedEvent {
            warning: matches!(type_, EventType::Warning),
            reason: reason.to_string(),
            action: action.to_string(),
            note,
            object: obj_ref.name.clone(),
        });
    }
}

pub struct Harness {
    pub store: Arc<FakeStore>,
    pub events: Arc<RecordingEvents>,
    pub ctx: ControllerContext,
}

impl Harness {
    pub fn new() -> Self {
        Self::with_images(all_images())
    }

    pub fn with_images(images: ImageConfig) -> Self {
        let store = Arc::new(FakeStore::default());
        let events = Arc::new(RecordingEvents::default());
        let ctx = ControllerContext::new(
            store.clone(),
            events.clone(),
            test_config(images),
        );
        Self { store, events, ctx }
    }
}

pub fn new_deployer(name: &str, size: i32) -> Deployer {
    Deployer::new(
        name,
        DeployerSpec {
            size,
            container_port: Some(8080),
        },
    )
}
