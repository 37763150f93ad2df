use dpv_operator::crd::Deployer;
use kube::core::CustomResourceExt;

fn main() -> anyhow::Result<()> {
    let yaml = serde_yaml::to_string(&Deployer::crd())?;
    print!("{}", yaml);
    Ok(())
}
