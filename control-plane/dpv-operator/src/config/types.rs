use std::time::Duration;

use envconfig::Envconfig;

#[derive(Envconfig, Clone, Debug)]
pub struct OperatorConfig {
    /// Namespace the DirectPV workloads are deployed into.
    /// Env: DPV_OPERATOR_NAMESPACE
    #[envconfig(from = "DPV_OPERATOR_NAMESPACE", default = "directpv")]
    pub namespace: String,

    #[envconfig(
        from = "DPV_OPERATOR_SERVICE_ACCOUNT",
        default = "directpv-min-io"
    )]
    pub service_account: String,

    #[envconfig(from = "HTTP_PORT", default = "8081")]
    pub http_port: u16,

    /// Delay before re-checking a freshly created controller Deployment.
    /// Env: DPV_OPERATOR_CREATE_REQUEUE_SECS
    #[envconfig(from = "DPV_OPERATOR_CREATE_REQUEUE_SECS", default = "60")]
    pub create_requeue_secs: u64,

    /// Backoff applied by the error policy on retryable failures.
    /// Env: DPV_OPERATOR_ERROR_REQUEUE_SECS
    #[envconfig(from = "DPV_OPERATOR_ERROR_REQUEUE_SECS", default = "30")]
    pub error_requeue_secs: u64,

    #[envconfig(nested)]
    pub images: ImageConfig,
}

impl OperatorConfig {
    pub fn create_requeue(&self) -> Duration {
        Duration::from_secs(self.create_requeue_secs)
    }

    pub fn error_requeue(&self) -> Duration {
        Duration::from_secs(self.error_requeue_secs)
    }
}

/// Operand images. Each one is only required once a template needs it.
#[derive(Envconfig, Clone, Debug, Default)]
pub struct ImageConfig {
    #[envconfig(from = "DIRECTPV_IMAGE")]
    pub directpv: Option<String>,
    #[envconfig(from = "CSI_PROVISIONER")]
    pub provisioner: Option<String>,
    #[envconfig(from = "CSI_RESIZER")]
    pub resizer: Option<String>,
    #[envconfig(from = "CSI_NODE_DRIVER_REGISTRAR")]
    pub node_driver_registrar: Option<String>,
    #[envconfig(from = "LIVENESS_PROBE")]
    pub liveness_probe: Option<String>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Component {
    DirectPv,
    Provisioner,
    Resizer,
    NodeDriverRegistrar,
    LivenessProbe,
}

impl Component {
    pub fn env_var(&self) -> &'static str {
        match self {
            Component::DirectPv => "DIRECTPV_IMAGE",
            Component::Provisioner => "CSI_PROVISIONER",
            Component::Resizer => "CSI_RESIZER",
            Component::NodeDriverRegistrar => "CSI_NODE_DRIVER_REGISTRAR",
            Component::LivenessProbe => "LIVENESS_PROBE",
        }
    }
}

#[derive(thiserror::Error, Debug, Clone, PartialEq, Eq)]
pub enum ConfigError {
    #[error("unable to find {0} environment variable with the image")]
    MissingImage(&'static str),
}

impl ImageConfig {
    pub fn resolve(&self, component: Component) -> Result<&str, ConfigError> {
        let value = match component {
            Component::DirectPv => &self.directpv,
            Component::Provisioner => &self.provisioner,
            Component::Resizer => &self.resizer,
            Component::NodeDriverRegistrar => &self.node_driver_registrar,
            Component::LivenessProbe => &self.liveness_probe,
        };
        value
            .as_deref()
            .filter(|v| !v.trim().is_empty())
            .ok_or(ConfigError::MissingImage(component.env_var()))
    }

    /// Tag of the DirectPV image, used as the version label.
    pub fn image_tag(&self) -> Option<&str> {
        let image = self.resolve(Component::DirectPv).ok()?;
        // a ':' before the last '/' belongs to a registry port
        let last = image.rsplit('/').next()?;
        let last = last.split('@').next()?;
        last.split_once(':')
            .map(|(_, tag)| tag)
            .filter(|t| !t.is_empty())
    }
}
