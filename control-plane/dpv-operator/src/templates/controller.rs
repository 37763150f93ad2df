use k8s_openapi::api::apps::v1::{Deployment, DeploymentSpec};
use k8s_openapi::api::core::v1::{
    Container, ContainerPort, PodSecurityContext, PodSpec, PodTemplateSpec,
};
use k8s_openapi::apimachinery::pkg::apis::meta::v1::{
    LabelSelector, ObjectMeta,
};

use super::labels::{labels_for, selector_labels};
use super::manager::{
    CSI_ENDPOINT, RenderContext, TemplateError, args, controller_name, env,
    host_path_volume, mount, node_name_env, privileged,
};
use crate::config::Component;

const COMPONENT: &str = "controller";

/// Replica-scaled CSI control service: provisioner, controller, resizer.
pub fn render_controller(
    ctx: &RenderContext<'_>,
    replicas: i32,
) -> Result<Deployment, TemplateError> {
    let directpv_img = ctx.image(Component::DirectPv)?;
    let resizer_img = ctx.image(Component::Resizer)?;
    let provisioner_img = ctx.image(Component::Provisioner)?;

    let labels = labels_for(&ctx.name, COMPONENT, ctx.images.image_tag());
    let socket_mount = || Some(vec![mount("socket-dir", "/csi")]);

    let containers = vec![
        Container {
            name: "csi-provisioner".to_string(),
            image: Some(provisioner_img),
            args: args(&[
                "--v=3",
                "--timeout=300s",
                "--csi-address=$(CSI_ENDPOINT)",
                "--leader-election",
                "--feature-gates=Topology=true",
                "--strict-topology",
            ]),
            env: Some(vec![env("CSI_ENDPOINT", CSI_ENDPOINT)]),
            volume_mounts: socket_mount(),
            ..Default::default()
        },
        Container {
            name: "controller".to_string(),
            image: Some(directpv_img),
            image_pull_policy: Some("IfNotPresent".to_string()),
            security_context: privileged(),
            ports: Some(vec![
                ContainerPort {
                    name: Some("readinessport".to_string()),
                    container_port: 30443,
                    ..Default::default()
                },
                ContainerPort {
                    name: Some("healthz".to_string()),
                    container_port: 9898,
                    ..Default::default()
                },
            ]),
            args: args(&[
                "controller",
                "--identity=directpv-min-io",
                "-v=3",
                "--csi-endpoint=$(CSI_ENDPOINT)",
                "--kube-node-name=$(KUBE_NODE_NAME)",
                "--readiness-port=30443",
            ]),
            env: Some(vec![env("CSI_ENDPOINT", CSI_ENDPOINT), node_name_env()]),
            volume_mounts: socket_mount(),
            ..Default::default()
        },
        Container {
            name: "csi-resizer".to_string(),
            image: Some(resizer_img),
            args: args(&[
                "--v=3",
                "--timeout=300s",
                "--csi-address=$(CSI_ENDPOINT)",
                "--leader-election",
            ]),
            env: Some(vec![env("CSI_ENDPOINT", CSI_ENDPOINT)]),
            volume_mounts: socket_mount(),
            ..Default::default()
        },
    ];

    Ok(Deployment {
        metadata: ObjectMeta {
            name: Some(controller_name(&ctx.name)),
            namespace: Some(ctx.namespace.to_string()),
            labels: Some(labels.clone()),
            owner_references: Some(vec![ctx.owner.clone()]),
            ..Default::default()
        },
        spec: Some(DeploymentSpec {
            replicas: Some(replicas),
            selector: LabelSelector {
                match_labels: Some(selector_labels(&ctx.name, COMPONENT)),
                ..Default::default()
            },
            template: PodTemplateSpec {
                metadata: Some(ObjectMeta {
                    labels: Some(labels),
                    ..Default::default()
                }),
                spec: Some(PodSpec {
                    service_account_name: Some(
                        ctx.service_account.to_string(),
                    ),
                    security_context: Some(PodSecurityContext::default()),
                    volumes: Some(vec![host_path_volume(
                        "socket-dir",
                        "/var/lib/kubelet/plugins/controller-controller",
                    )]),
                    containers,
                    ..Default::default()
                }),
            },
            ..Default::default()
        }),
        ..Default::default()
    })
}

/// Observed replica count; the API server defaults an unset value to 1.
pub fn observed_replicas(dep: &Deployment) -> i32 {
    dep.spec.as_ref().and_then(|s| s.replicas).unwrap_or(1)
}
