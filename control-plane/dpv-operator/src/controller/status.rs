use crate::crd::{
    Condition, ConditionStatus, ConditionType, Deployer, DeployerStatus,
};

pub const REASON_RECONCILING: &str = "Reconciling";
pub const REASON_FINALIZING: &str = "Finalizing";
pub const REASON_RESIZING: &str = "Resizing";

/// Status as last observed, or an empty one.
pub fn current(deployer: &Deployer) -> DeployerStatus {
    deployer.status.clone().unwrap_or_default()
}

pub fn initial(now: &str) -> DeployerStatus {
    DeployerStatus::default().with_condition(
        Condition::new(
            ConditionType::Available,
            ConditionStatus::Unknown,
            REASON_RECONCILING,
            "Starting reconciliation",
        ),
        now,
    )
}

pub fn available(name: &str, replicas: i32) -> Condition {
    Condition::new(
        ConditionType::Available,
        ConditionStatus::True,
        REASON_RECONCILING,
        format!(
            "Deployment for custom resource ({}) with {} replicas created successfully",
            name, replicas
        ),
    )
}

pub fn unavailable(reason: &str, message: String) -> Condition {
    Condition::new(
        ConditionType::Available,
        ConditionStatus::False,
        reason,
        message,
    )
}

pub fn finalizing_started(name: &str) -> Condition {
    Condition::new(
        ConditionType::Degraded,
        ConditionStatus::Unknown,
        REASON_FINALIZING,
        format!(
            "Performing finalizer operations for the custom resource: {}",
            name
        ),
    )
}

pub fn finalizing_done(name: &str) -> Condition {
    Condition::new(
        ConditionType::Degraded,
        ConditionStatus::True,
        REASON_FINALIZING,
        format!(
            "Finalizer operations for custom resource {} name were successfully accomplished",
            name
        ),
    )
}
