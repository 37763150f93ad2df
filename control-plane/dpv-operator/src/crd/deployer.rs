use std::collections::BTreeMap;

use kube::CustomResource;
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};

#[derive(CustomResource, Deserialize, Serialize, Clone, Debug, Default, PartialEq, JsonSchema)]
#[kube(
    group = "cache.example.com",
    version = "v1alpha1",
    kind = "Deployer",
    plural = "deployers",
    status = "DeployerStatus",
    derive = "PartialEq",
    printcolumn = r#"{"name":"Size","type":"integer","jsonPath":".spec.size"}"#,
    printcolumn = r#"{"name":"Available","type":"string","jsonPath":".status.conditions[?(@.type==\"Available\")].status"}"#
)]
#[serde(rename_all = "camelCase")]
pub struct DeployerSpec {
    /// Desired replica count of the DirectPV controller Deployment
    #[serde(default)]
    #[schemars(range(min = 0))]
    pub size: i32,
    /// Container port of the operand (informational)
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub container_port: Option<i32>,
}

impl Deployer {
    /// Replica count the controller Deployment should converge to.
    pub fn desired_replicas(&self) -> i32 {
        self.spec.size.max(0)
    }
}

#[derive(Deserialize, Serialize, Clone, Debug, Default, PartialEq, JsonSchema)]
pub struct DeployerStatus {
    /// K8s-style conditions, unique per type
    #[serde(
        default,
        with = "condition_list",
        skip_serializing_if = "BTreeMap::is_empty"
    )]
    #[schemars(with = "Vec<Condition>")]
    pub conditions: BTreeMap<ConditionType, Condition>,
}

impl DeployerStatus {
    pub fn is_empty(&self) -> bool {
        self.conditions.is_empty()
    }

    pub fn condition(&self, type_: ConditionType) -> Option<&Condition> {
        self.conditions.get(&type_)
    }

    /// Returns a copy of this status with `cond` set for its type.
    ///
    /// `lastTransitionTime` only moves when the condition's status value
    /// changes; reason and message always follow `cond`.
    pub fn with_condition(&self, cond: Condition, now: &str) -> Self {
        let mut next = self.clone();
        let last_transition_time = match self.conditions.get(&cond.type_) {
            Some(prev) if prev.status == cond.status => prev
                .last_transition_time
                .clone()
                .or_else(|| Some(now.to_string())),
            _ => Some(now.to_string()),
        };
        next.conditions.insert(
            cond.type_,
            Condition {
                last_transition_time,
                ..cond
            },
        );
        next
    }
}

#[derive(Deserialize, Serialize, Clone, Debug, PartialEq, Eq, JsonSchema)]
pub struct Condition {
    #[serde(rename = "type")]
    pub type_: ConditionType,
    pub status: ConditionStatus,
    #[serde(default)]
    pub reason: String,
    #[serde(default)]
    pub message: String,
    #[serde(
        rename = "lastTransitionTime",
        default,
        skip_serializing_if = "Option::is_none"
    )]
    pub last_transition_time: Option<String>,
}

impl Condition {
    pub fn new(
        type_: ConditionType,
        status: ConditionStatus,
        reason: &str,
        message: impl Into<String>,
    ) -> Self {
        Self {
            type_,
            status,
            reason: reason.to_string(),
            message: message.into(),
            last_transition_time: None,
        }
    }
}

#[derive(
    Deserialize,
    Serialize,
    Clone,
    Copy,
    Debug,
    JsonSchema,
    PartialEq,
    Eq,
    PartialOrd,
    Ord,
    Hash,
)]
#[serde(rename_all = "PascalCase")]
pub enum ConditionType {
    Available,
    Degraded,
    #[serde(other)]
    Other,
}

#[derive(Deserialize, Serialize, Clone, Copy, Debug, JsonSchema, PartialEq, Eq)]
#[serde(rename_all = "PascalCase")]
pub enum ConditionStatus {
    True,
    False,
    Unknown,
}

/// Wire format of the condition map: the conventional list of conditions.
mod condition_list {
    use std::collections::BTreeMap;

    use serde::{Deserialize, Deserializer, Serializer};

    use super::{Condition, ConditionType};

    pub fn serialize<S: Serializer>(
        conditions: &BTreeMap<ConditionType, Condition>,
        serializer: S,
    ) -> Result<S::Ok, S::Error> {
        serializer.collect_seq(conditions.values())
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(
        deserializer: D,
    ) -> Result<BTreeMap<ConditionType, Condition>, D::Error> {
        let list = Option::<Vec<Condition>>::deserialize(deserializer)?
            .unwrap_or_default();
        Ok(list.into_iter().map(|c| (c.type_, c)).collect())
    }
}
