pub mod deployer;

pub use deployer::{
    Condition, ConditionStatus, ConditionType, Deployer, DeployerSpec,
    DeployerStatus,
};
