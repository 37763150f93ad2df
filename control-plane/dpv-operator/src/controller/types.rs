use std::time::Duration;

use kube::runtime::controller::Action;

/// What the dispatcher should do after a successful pass.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Requeue {
    /// Wait for the next watch event.
    None,
    /// State is known to be transiently inconsistent; run again right away.
    Immediate,
    /// New objects need time to settle.
    After(Duration),
}

impl From<Requeue> for Action {
    fn from(r: Requeue) -> Self {
        match r {
            Requeue::None => Action::await_change(),
            Requeue::Immediate => Action::requeue(Duration::ZERO),
            Requeue::After(d) => Action::requeue(d),
        }
    }
}

impl std::fmt::Display for Requeue {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Requeue::None => write!(f, "none"),
            Requeue::Immediate => write!(f, "immediate"),
            Requeue::After(d) => write!(f, "after {}s", d.as_secs()),
        }
    }
}
