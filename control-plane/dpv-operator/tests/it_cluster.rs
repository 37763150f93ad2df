// Requires a running cluster with the Deployer CRD applied and the
// DirectPV image env vars set. Run with:
// cargo test -p dpv-operator --test it_cluster -- --ignored

use std::time::Duration;

use dpv_operator::config::OperatorConfig;
use dpv_operator::controller::run_controller;
use dpv_operator::crd::{ConditionStatus, ConditionType, Deployer, DeployerSpec};
use dpv_operator::web::Health;
use envconfig::Envconfig;
use k8s_openapi::api::apps::v1::{DaemonSet, Deployment};
use kube::{
    Client,
    api::{Api, DeleteParams, PostParams},
};

#[test_log::test(tokio::test)]
#[ignore]
async fn controller_brings_up_directpv_workloads() {
    let client = Client::try_default().await.expect("kube client");
    let cfg = OperatorConfig::init_from_env().expect("operator config");
    let ns = cfg.namespace.clone();
    let name = format!("dpv-it-{}", chrono::Utc::now().timestamp());

    let api: Api<Deployer> = Api::all(client.clone());
    api.create(
        &PostParams::default(),
        &Deployer::new(
            &name,
            DeployerSpec {
                size: 1,
                container_port: None,
            },
        ),
    )
    .await
    .expect("create Deployer");

    let health = Health::new();
    let ctrl = tokio::spawn(run_controller(client.clone(), cfg, health.clone()));

    let mut available = false;
    for _ in 0..90 {
        let d = api.get(&name).await.expect("get Deployer");
        available = d
            .status
            .as_ref()
            .and_then(|s| s.condition(ConditionType::Available))
            .is_some_and(|c| c.status == ConditionStatus::True);
        if available {
            break;
        }
        tokio::time::sleep(Duration::from_secs(1)).await;
    }
    assert!(health.is_ready());
    assert!(available, "deployer never became available");

    let ds: Api<DaemonSet> = Api::namespaced(client.clone(), &ns);
    let deps: Api<Deployment> = Api::namespaced(client.clone(), &ns);
    assert!(ds.get_opt(&format!("{name}-node-server")).await.unwrap().is_some());
    assert!(deps.get_opt(&format!("{name}-controller")).await.unwrap().is_some());

    api.delete(&name, &DeleteParams::default())
        .await
        .expect("delete Deployer");
    let mut gone = false;
    for _ in 0..60 {
        if api.get_opt(&name).await.unwrap().is_none() {
            gone = true;
            break;
        }
        tokio::time::sleep(Duration::from_secs(1)).await;
    }
    ctrl.abort();
    assert!(gone, "finalizer was not released");
}
