use std::{fmt, sync::Arc};

/// A per-cycle gate deciding whether a fetcher runs.
pub trait Condition: Send + Sync {
    fn is_satisfied(&self) -> bool;

    fn name(&self) -> &str;
}

/// Leadership status supplied by whatever election mechanism the agent runs.
pub trait LeaderElection: Send + Sync {
    fn is_leader(&self) -> bool;
}

/// Restricts a fetcher to the elected leader, for sources that would
/// otherwise be collected once per node (cluster API objects, registries).
pub struct LeaderCondition {
    election: Arc<dyn LeaderElection>,
}

impl LeaderCondition {
    pub const NAME: &'static str = "leader-election-condition";

    pub fn new(election: Arc<dyn LeaderElection>) -> Self {
        Self { election }
    }
}

impl Condition for LeaderCondition {
    fn is_satisfied(&self) -> bool {
        self.election.is_leader()
    }

    fn name(&self) -> &str {
        Self::NAME
    }
}

impl fmt::Debug for LeaderCondition {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("LeaderCondition")
            .field("leader", &self.election.is_leader())
            .finish()
    }
}

/// Closure-backed condition.
pub struct FnCondition {
    name: String,
    check: Box<dyn Fn() -> bool + Send + Sync>,
}

impl FnCondition {
    pub fn new<F>(name: impl Into<String>, check: F) -> Self
    where
        F: Fn() -> bool + Send + Sync + 'static,
    {
        Self {
            name: name.into(),
            check: Box::new(check),
        }
    }
}

impl Condition for FnCondition {
    fn is_satisfied(&self) -> bool {
        (self.check)()
    }

    fn name(&self) -> &str {
        &self.name
    }
}

impl fmt::Debug for FnCondition {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("FnCondition")
            .field("name", &self.name)
            .finish_non_exhaustive()
    }
}
