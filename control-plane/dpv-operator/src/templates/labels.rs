use std::collections::BTreeMap;

pub const LABEL_NAME: &str = "app.kubernetes.io/name";
pub const LABEL_INSTANCE: &str = "app.kubernetes.io/instance";
pub const LABEL_VERSION: &str = "app.kubernetes.io/version";
pub const LABEL_PART_OF: &str = "app.kubernetes.io/part-of";
pub const LABEL_CREATED_BY: &str = "app.kubernetes.io/created-by";

/// Stable subset used in immutable workload selectors.
pub fn selector_labels(name: &str, component: &str) -> BTreeMap<String, String> {
    BTreeMap::from([
        (LABEL_NAME.to_string(), "directpv".to_string()),
        (LABEL_INSTANCE.to_string(), format!("{}-{}", name, component)),
    ])
}

/// Full recommended label set for child workloads and their pods.
pub fn labels_for(
    name: &str,
    component: &str,
    version: Option<&str>,
) -> BTreeMap<String, String> {
    let mut labels = selector_labels(name, component);
    labels.insert(LABEL_PART_OF.to_string(), "directpv-operator".to_string());
    labels.insert(
        LABEL_CREATED_BY.to_string(),
        "controller-manager".to_string(),
    );
    if let Some(v) = version {
        labels.insert(LABEL_VERSION.to_string(), v.to_string());
    }
    labels
}
