use k8s_openapi::api::core::v1::{
    EnvVar, EnvVarSource, HostPathVolumeSource, ObjectFieldSelector,
    SecurityContext, Volume, VolumeMount,
};
use k8s_openapi::apimachinery::pkg::apis::meta::v1::OwnerReference;
use kube::{Resource, ResourceExt};

use crate::config::{Component, ConfigError, ImageConfig, OperatorConfig};
use crate::crd::Deployer;

#[derive(thiserror::Error, Debug)]
pub enum TemplateError {
    #[error(transparent)]
    Config(#[from] ConfigError),
    #[error("cannot build owner reference for deployer {0}: missing uid")]
    OwnerReference(String),
}

/// Everything the child workload templates need from the owner and config.
#[derive(Clone, Debug)]
pub struct RenderContext<'a> {
    pub name: String,
    pub namespace: &'a str,
    pub service_account: &'a str,
    pub owner: OwnerReference,
    pub images: &'a ImageConfig,
}

impl<'a> RenderContext<'a> {
    pub fn for_deployer(
        deployer: &Deployer,
        cfg: &'a OperatorConfig,
    ) -> Result<Self, TemplateError> {
        let owner = deployer
            .controller_owner_ref(&())
            .ok_or_else(|| TemplateError::OwnerReference(deployer.name_any()))?;
        Ok(Self {
            name: deployer.name_any(),
            namespace: &cfg.namespace,
            service_account: &cfg.service_account,
            owner,
            images: &cfg.images,
        })
    }

    pub fn image(&self, component: Component) -> Result<String, TemplateError> {
        Ok(self.images.resolve(component)?.to_string())
    }
}

pub fn node_server_name(deployer: &str) -> String {
    format!("{}-node-server", deployer)
}

pub fn controller_name(deployer: &str) -> String {
    format!("{}-controller", deployer)
}

/// Whether `obj` carries a controller owner reference to `deployer`.
pub fn is_controlled_by<K: Resource>(obj: &K, deployer: &Deployer) -> bool {
    let Some(uid) = deployer.uid() else {
        return false;
    };
    obj.owner_references()
        .iter()
        .any(|o| o.controller == Some(true) && o.uid == uid)
}

pub(crate) const CSI_ENDPOINT: &str = "unix:///csi/csi.sock";

pub(crate) fn host_path_volume(name: &str, path: &str) -> Volume {
    Volume {
        name: name.to_string(),
        host_path: Some(HostPathVolumeSource {
            path: path.to_string(),
            type_: Some("DirectoryOrCreate".to_string()),
        }),
        ..Default::default()
    }
}

pub(crate) fn mount(name: &str, path: &str) -> VolumeMount {
    VolumeMount {
        name: name.to_string(),
        mount_path: path.to_string(),
        ..Default::default()
    }
}

pub(crate) fn mount_no_propagation(name: &str, path: &str) -> VolumeMount {
    VolumeMount {
        mount_propagation: Some("None".to_string()),
        ..mount(name, path)
    }
}

pub(crate) fn privileged() -> Option<SecurityContext> {
    Some(SecurityContext {
        privileged: Some(true),
        ..Default::default()
    })
}

pub(crate) fn env(name: &str, value: &str) -> EnvVar {
    EnvVar {
        name: name.to_string(),
        value: Some(value.to_string()),
        ..Default::default()
    }
}

pub(crate) fn node_name_env() -> EnvVar {
    EnvVar {
        name: "KUBE_NODE_NAME".to_string(),
        value_from: Some(EnvVarSource {
            field_ref: Some(ObjectFieldSelector {
                api_version: Some("v1".to_string()),
                field_path: "spec.nodeName".to_string(),
            }),
            ..Default::default()
        }),
        ..Default::default()
    }
}

pub(crate) fn args(list: &[&str]) -> Option<Vec<String>> {
    Some(list.iter().map(|a| a.to_string()).collect())
}
