use kube::ResourceExt;

use super::status::REASON_FINALIZING;
use crate::crd::{ConditionStatus, ConditionType, Deployer};

pub const FINALIZER: &str = "cache.example.com/finalizer";

/// Where a deployer stands in its deletion lifecycle.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FinalizerState {
    /// Live, finalizer not attached yet.
    NoFinalizer,
    /// Live, finalizer attached.
    FinalizerPresent,
    /// Deletion requested, cleanup not started.
    MarkedForDeletion,
    /// `Degraded=Unknown/Finalizing` recorded; cleanup side effects ran.
    FinalizingCleanup,
    /// `Degraded=True/Finalizing` recorded; only the finalizer is left.
    CleanupDone,
    /// Deletion requested and finalizer gone; nothing left for us to do.
    FinalizerRemoved,
}

impl FinalizerState {
    pub fn of(deployer: &Deployer) -> Self {
        let attached = has_finalizer(deployer);
        if deployer.metadata.deletion_timestamp.is_none() {
            return if attached {
                FinalizerState::FinalizerPresent
            } else {
                FinalizerState::NoFinalizer
            };
        }
        if !attached {
            return FinalizerState::FinalizerRemoved;
        }
        let finalizing = deployer
            .status
            .as_ref()
            .and_then(|s| s.condition(ConditionType::Degraded))
            .filter(|c| c.reason == REASON_FINALIZING);
        match finalizing.map(|c| c.status) {
            Some(ConditionStatus::True) => FinalizerState::CleanupDone,
            Some(ConditionStatus::Unknown) => FinalizerState::FinalizingCleanup,
            _ => FinalizerState::MarkedForDeletion,
        }
    }
}

pub fn has_finalizer(deployer: &Deployer) -> bool {
    deployer.finalizers().iter().any(|f| f == FINALIZER)
}

/// Copy of `deployer` with the finalizer attached.
pub fn with_finalizer(deployer: &Deployer) -> Deployer {
    let mut next = deployer.clone();
    if !has_finalizer(&next) {
        next.finalizers_mut().push(FINALIZER.to_string());
    }
    next
}

/// Copy of `deployer` with the finalizer removed, other finalizers kept.
pub fn without_finalizer(deployer: &Deployer) -> Deployer {
    let mut next = deployer.clone();
    next.finalizers_mut().retain(|f| f != FINALIZER);
    next
}
