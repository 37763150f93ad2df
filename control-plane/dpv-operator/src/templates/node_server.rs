use k8s_openapi::api::apps::v1::{DaemonSet, DaemonSetSpec};
use k8s_openapi::api::core::v1::{
    Container, ContainerPort, HTTPGetAction, PodSecurityContext, PodSpec,
    PodTemplateSpec, Probe,
};
use k8s_openapi::apimachinery::pkg::apis::meta::v1::{
    LabelSelector, ObjectMeta,
};
use k8s_openapi::apimachinery::pkg::util::intstr::IntOrString;

use super::labels::{labels_for, selector_labels};
use super::manager::{
    CSI_ENDPOINT, RenderContext, TemplateError, args, env, host_path_volume,
    mount, mount_no_propagation, node_name_env, node_server_name, privileged,
};
use crate::config::Component;

const COMPONENT: &str = "node-server";

/// Host paths shared by the node-server and node-controller containers.
const NODE_MOUNTS: &[(&str, &str)] = &[
    ("socket-dir", "/csi"),
    ("mountpoint-dir", "/var/lib/kubelet/pods"),
    ("plugins-dir", "/var/lib/kubelet/plugins"),
    ("directpv-common-root", "/var/lib/directpv/"),
    ("sysfs", "/sys"),
    ("devfs", "/dev"),
    ("run-udev-data-dir", "/run/udev/data"),
    ("direct-csi-common-root", "/var/lib/direct-csi/"),
];

const VOLUMES: &[(&str, &str)] = &[
    ("socket-dir", "/var/lib/kubelet/plugins/directpv-min-io"),
    ("mountpoint-dir", "/var/lib/kubelet/pods"),
    ("registration-dir", "/var/lib/kubelet/plugins_registry"),
    ("plugins-dir", "/var/lib/kubelet/plugins"),
    ("directpv-common-root", "/var/lib/directpv/"),
    ("sysfs", "/sys"),
    ("devfs", "/dev"),
    ("run-udev-data-dir", "/run/udev/data"),
    ("direct-csi-common-root", "/var/lib/direct-csi/"),
];

fn http_probe(path: &str, port: &str) -> Option<Probe> {
    Some(Probe {
        http_get: Some(HTTPGetAction {
            path: Some(path.to_string()),
            port: IntOrString::String(port.to_string()),
            scheme: Some("HTTP".to_string()),
            ..Default::default()
        }),
        initial_delay_seconds: Some(60),
        timeout_seconds: Some(10),
        period_seconds: Some(10),
        success_threshold: Some(1),
        failure_threshold: Some(5),
        ..Default::default()
    })
}

fn port(name: &str, number: i32) -> ContainerPort {
    ContainerPort {
        name: Some(name.to_string()),
        container_port: number,
        ..Default::default()
    }
}

/// Per-node DirectPV plugin: one pod on every eligible node.
pub fn render_node_server(
    ctx: &RenderContext<'_>,
) -> Result<DaemonSet, TemplateError> {
    let directpv_img = ctx.image(Component::DirectPv)?;
    let registrar_img = ctx.image(Component::NodeDriverRegistrar)?;
    let liveness_img = ctx.image(Component::LivenessProbe)?;

    let labels = labels_for(&ctx.name, COMPONENT, ctx.images.image_tag());
    let node_mounts: Vec<_> =
        NODE_MOUNTS.iter().map(|(n, p)| mount(n, p)).collect();

    let containers = vec![
        Container {
            name: "node-driver-registrar".to_string(),
            image: Some(registrar_img),
            image_pull_policy: Some("IfNotPresent".to_string()),
            security_context: privileged(),
            args: args(&[
                "--v=3",
                "--csi-address=unix:///csi/csi.sock",
                "--kubelet-registration-path=/var/lib/kubelet/plugins/directpv-min-io/csi.sock",
            ]),
            env: Some(vec![node_name_env()]),
            volume_mounts: Some(vec![
                mount_no_propagation("socket-dir", "/csi"),
                mount_no_propagation("registration-dir", "/registration"),
            ]),
            ..Default::default()
        },
        Container {
            name: "node-server".to_string(),
            image: Some(directpv_img.clone()),
            image_pull_policy: Some("IfNotPresent".to_string()),
            security_context: privileged(),
            ports: Some(vec![
                port("readinessport", 30443),
                port("healthz", 9898),
                port("metrics", 10443),
            ]),
            liveness_probe: http_probe("/healthz", "healthz"),
            readiness_probe: http_probe("/ready", "readinessport"),
            args: args(&[
                "node-server",
                "-v=3",
                "--identity=directpv-min-io",
                "--csi-endpoint=$(CSI_ENDPOINT)",
                "--kube-node-name=$(KUBE_NODE_NAME)",
                "--readiness-port=30443",
                "--metrics-port=10443",
            ]),
            env: Some(vec![env("CSI_ENDPOINT", CSI_ENDPOINT), node_name_env()]),
            volume_mounts: Some(node_mounts.clone()),
            ..Default::default()
        },
        Container {
            name: "node-controller".to_string(),
            image: Some(directpv_img),
            image_pull_policy: Some("IfNotPresent".to_string()),
            security_context: privileged(),
            args: args(&[
                "node-controller",
                "-v=3",
                "--kube-node-name=$(KUBE_NODE_NAME)",
            ]),
            env: Some(vec![node_name_env()]),
            volume_mounts: Some(node_mounts),
            ..Default::default()
        },
        Container {
            name: "liveness-probe".to_string(),
            image: Some(liveness_img),
            image_pull_policy: Some("IfNotPresent".to_string()),
            security_context: privileged(),
            args: args(&["--csi-address=/csi/csi.sock", "--health-port=9898"]),
            volume_mounts: Some(vec![mount("socket-dir", "/csi")]),
            ..Default::default()
        },
    ];

    Ok(DaemonSet {
        metadata: ObjectMeta {
            name: Some(node_server_name(&ctx.name)),
            namespace: Some(ctx.namespace.to_string()),
            labels: Some(labels.clone()),
            owner_references: Some(vec![ctx.owner.clone()]),
            ..Default::default()
        },
        spec: Some(DaemonSetSpec {
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
                    volumes: Some(
                        VOLUMES
                            .iter()
                            .map(|(n, p)| host_path_volume(n, p))
                            .collect(),
                    ),
                    containers,
                    ..Default::default()
                }),
            },
            ..Default::default()
        }),
        ..Default::default()
    })
}
