use std::{
    collections::HashMap,
    fmt,
    panic::{AssertUnwindSafe, catch_unwind},
    sync::Arc,
};

use futures::future::BoxFuture;
use parking_lot::RwLock;
use tracing::{info, warn};

use crate::error::{CollectorError, Result};

use super::{Condition, FetchContext, Fetcher};

/// A fetcher together with the conditions gating it.
#[derive(Clone)]
pub struct RegisteredFetcher {
    pub fetcher: Arc<dyn Fetcher>,
    pub conditions: Vec<Arc<dyn Condition>>,
}

impl RegisteredFetcher {
    pub fn new(fetcher: Arc<dyn Fetcher>) -> Self {
        Self {
            fetcher,
            conditions: Vec::new(),
        }
    }

    pub fn with_condition(mut self, condition: Arc<dyn Condition>) -> Self {
        self.conditions.push(condition);
        self
    }
}

impl fmt::Debug for RegisteredFetcher {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let conditions: Vec<&str> = self.conditions.iter().map(|c| c.name()).collect();
        f.debug_struct("RegisteredFetcher")
            .field("conditions", &conditions)
            .finish_non_exhaustive()
    }
}

/// Named entry produced by configuration parsing, registered in bulk.
#[derive(Clone, Debug)]
pub struct ParsedFetcher {
    pub name: String,
    pub registered: RegisteredFetcher,
}

impl ParsedFetcher {
    pub fn new(name: impl Into<String>, registered: RegisteredFetcher) -> Self {
        Self {
            name: name.into(),
            registered,
        }
    }
}

pub type FetchersMap = HashMap<String, RegisteredFetcher>;

/// Produces a complete replacement fetcher set, for deployments whose
/// sources change at runtime (accounts joining an organization).
pub type FetchersUpdater = Arc<dyn Fn() -> BoxFuture<'static, Result<FetchersMap>> + Send + Sync>;

/// Holds the named fetchers the orchestrator triggers every cycle.
///
/// Registration happens during setup. Afterwards the map is only replaced
/// wholesale by [`FetcherRegistry::update`], so lookups from concurrently
/// running fetcher tasks take a short read lock and clone an `Arc` out.
#[derive(Default)]
pub struct FetcherRegistry {
    fetchers: RwLock<HashMap<String, Arc<RegisteredFetcher>>>,
    updater: Option<FetchersUpdater>,
}

impl FetcherRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_updater(updater: FetchersUpdater) -> Self {
        Self {
            fetchers: RwLock::new(HashMap::new()),
            updater: Some(updater),
        }
    }

    pub fn register(
        &self,
        name: impl Into<String>,
        fetcher: Arc<dyn Fetcher>,
        conditions: Vec<Arc<dyn Condition>>,
    ) -> Result<()> {
        let name = name.into();
        info!(target: "canopy::registry", fetcher = %name, "registering new fetcher");

        let mut guard = self.fetchers.write();
        if guard.contains_key(&name) {
            return Err(CollectorError::DuplicateKey(name));
        }
        guard.insert(name, Arc::new(RegisteredFetcher { fetcher, conditions }));
        Ok(())
    }

    pub fn register_all<I>(&self, parsed: I) -> Result<()>
    where
        I: IntoIterator<Item = ParsedFetcher>,
    {
        for ParsedFetcher { name, registered } in parsed {
            self.register(name, registered.fetcher, registered.conditions)?;
        }
        Ok(())
    }

    pub fn keys(&self) -> Vec<String> {
        self.fetchers.read().keys().cloned().collect()
    }

    pub fn len(&self) -> usize {
        self.fetchers.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.fetchers.read().is_empty()
    }

    /// Evaluates the fetcher's conditions in registration order, stopping at
    /// the first one that does not hold. Unknown names never run.
    pub fn should_run(&self, name: &str) -> bool {
        let Some(registered) = self.lookup(name) else {
            return false;
        };

        for condition in &registered.conditions {
            if !condition.is_satisfied() {
                info!(
                    target: "canopy::registry",
                    fetcher = %name,
                    condition = condition.name(),
                    "conditional fetcher should not run"
                );
                return false;
            }
        }

        true
    }

    pub async fn run(&self, name: &str, ctx: FetchContext) -> Result<()> {
        let registered = self
            .lookup(name)
            .ok_or_else(|| CollectorError::NotFound(name.to_string()))?;

        registered.fetcher.fetch(ctx).await
    }

    /// Stops every registered fetcher. A failing or panicking `stop` is
    /// logged and the remaining fetchers are still stopped.
    pub fn stop(&self) {
        let snapshot: Vec<(String, Arc<RegisteredFetcher>)> = self
            .fetchers
            .read()
            .iter()
            .map(|(name, registered)| (name.clone(), Arc::clone(registered)))
            .collect();

        stop_all(snapshot);
    }

    /// Replaces the fetcher set with the updater's output.
    ///
    /// Without an updater this is a no-op. When the updater fails the current
    /// set is kept; on success the previous fetchers are stopped.
    pub async fn update(&self) {
        let Some(updater) = &self.updater else {
            return;
        };

        let fresh = match updater().await {
            Ok(fresh) => fresh,
            Err(err) => {
                warn!(target: "canopy::registry", error = %err, "failed to update fetchers, keeping current set");
                return;
            }
        };

        let fresh: HashMap<String, Arc<RegisteredFetcher>> = fresh
            .into_iter()
            .map(|(name, registered)| (name, Arc::new(registered)))
            .collect();
        let count = fresh.len();

        let previous = std::mem::replace(&mut *self.fetchers.write(), fresh);
        stop_all(previous);

        info!(target: "canopy::registry", fetchers = count, "fetcher set updated");
    }

    fn lookup(&self, name: &str) -> Option<Arc<RegisteredFetcher>> {
        self.fetchers.read().get(name).cloned()
    }
}

fn stop_all<I>(fetchers: I)
where
    I: IntoIterator<Item = (String, Arc<RegisteredFetcher>)>,
{
    for (name, registered) in fetchers {
        match catch_unwind(AssertUnwindSafe(|| registered.fetcher.stop())) {
            Ok(Ok(())) => {
                info!(target: "canopy::registry", fetcher = %name, "fetcher stopped");
            }
            Ok(Err(err)) => {
                warn!(target: "canopy::registry", fetcher = %name, error = %err, "fetcher failed to stop");
            }
            Err(_) => {
                warn!(target: "canopy::registry", fetcher = %name, "fetcher panicked while stopping");
            }
        }
    }
}

impl fmt::Debug for FetcherRegistry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let mut keys = self.keys();
        keys.sort();
        f.debug_struct("FetcherRegistry")
            .field("fetchers", &keys)
            .field("has_updater", &self.updater.is_some())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use std::sync::atomic::{AtomicUsize, Ordering};

    use async_trait::async_trait;
    use canopy_model::CycleMetadata;
    use futures::FutureExt;
    use tokio::sync::mpsc;
    use tokio_util::sync::CancellationToken;

    use super::*;
    use crate::fetching::{FnCondition, ResourcePublisher};

    #[derive(Default)]
    struct CountingFetcher {
        fetches: AtomicUsize,
        stops: AtomicUsize,
    }

    #[async_trait]
    impl Fetcher for CountingFetcher {
        async fn fetch(&self, _ctx: FetchContext) -> Result<()> {
            self.fetches.fetch_add(1, Ordering::SeqCst);
            Ok(())
        }

        fn stop(&self) -> Result<()> {
            self.stops.fetch_add(1, Ordering::SeqCst);
            Ok(())
        }
    }

    struct BrokenStop;

    #[async_trait]
    impl Fetcher for BrokenStop {
        async fn fetch(&self, _ctx: FetchContext) -> Result<()> {
            Ok(())
        }

        fn stop(&self) -> Result<()> {
            panic!("stop exploded");
        }
    }

    fn context() -> FetchContext {
        let (tx, _rx) = mpsc::channel(1);
        let cancel = CancellationToken::new();
        FetchContext::new(
            CycleMetadata::new(1),
            cancel.clone(),
            ResourcePublisher::new("test", CycleMetadata::new(1), tx, cancel),
        )
    }

    fn condition(name: &'static str, value: bool, calls: Arc<AtomicUsize>) -> Arc<dyn Condition> {
        Arc::new(FnCondition::new(name, move || {
            calls.fetch_add(1, Ordering::SeqCst);
            value
        }))
    }

    #[test]
    fn keys_lists_every_registration() {
        let registry = FetcherRegistry::new();
        for name in ["some_fetcher", "other_fetcher", "new_fetcher"] {
            registry
                .register(name, Arc::new(CountingFetcher::default()), vec![])
                .unwrap();
        }

        let mut keys = registry.keys();
        keys.sort();
        assert_eq!(keys, vec!["new_fetcher", "other_fetcher", "some_fetcher"]);
    }

    #[tokio::test]
    async fn duplicate_registration_keeps_first_entry() {
        let registry = FetcherRegistry::new();
        let first = Arc::new(CountingFetcher::default());
        let second = Arc::new(CountingFetcher::default());

        registry.register("aws-s3", first.clone(), vec![]).unwrap();
        let err = registry.register("aws-s3", second.clone(), vec![]).unwrap_err();
        assert!(matches!(err, CollectorError::DuplicateKey(ref name) if name == "aws-s3"));

        registry.run("aws-s3", context()).await.unwrap();
        assert_eq!(first.fetches.load(Ordering::SeqCst), 1);
        assert_eq!(second.fetches.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn run_unknown_fetcher_is_not_found() {
        let registry = FetcherRegistry::new();
        registry
            .register("some-key", Arc::new(CountingFetcher::default()), vec![])
            .unwrap();

        let err = registry.run("unknown", context()).await.unwrap_err();
        assert!(matches!(err, CollectorError::NotFound(ref name) if name == "unknown"));
    }

    #[test]
    fn should_run_unknown_is_false() {
        let registry = FetcherRegistry::new();
        assert!(!registry.should_run("unknown"));
    }

    #[test]
    fn should_run_without_conditions() {
        let registry = FetcherRegistry::new();
        registry
            .register("process", Arc::new(CountingFetcher::default()), vec![])
            .unwrap();

        assert!(registry.should_run("process"));
    }

    #[test]
    fn should_run_stops_at_first_unsatisfied_condition() {
        let registry = FetcherRegistry::new();
        let calls: Vec<Arc<AtomicUsize>> = (0..4).map(|_| Arc::new(AtomicUsize::new(0))).collect();
        let conditions = vec![
            condition("first", true, calls[0].clone()),
            condition("second", true, calls[1].clone()),
            condition("third", false, calls[2].clone()),
            condition("fourth", true, calls[3].clone()),
        ];
        registry
            .register("kube-api", Arc::new(CountingFetcher::default()), conditions)
            .unwrap();

        assert!(!registry.should_run("kube-api"));
        let counts: Vec<usize> = calls.iter().map(|c| c.load(Ordering::SeqCst)).collect();
        assert_eq!(counts, vec![1, 1, 1, 0]);
    }

    #[test]
    fn should_run_when_all_conditions_hold() {
        let registry = FetcherRegistry::new();
        let calls = Arc::new(AtomicUsize::new(0));
        registry
            .register(
                "aws-elb",
                Arc::new(CountingFetcher::default()),
                vec![
                    condition("a", true, calls.clone()),
                    condition("b", true, calls.clone()),
                ],
            )
            .unwrap();

        assert!(registry.should_run("aws-elb"));
        assert_eq!(calls.load(Ordering::SeqCst), 2);
    }

    #[test]
    fn stop_continues_past_panicking_fetcher() {
        let registry = FetcherRegistry::new();
        let healthy = Arc::new(CountingFetcher::default());
        registry.register("broken", Arc::new(BrokenStop), vec![]).unwrap();
        registry.register("healthy", healthy.clone(), vec![]).unwrap();

        registry.stop();

        assert_eq!(healthy.stops.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn register_all_fails_on_duplicate() {
        let registry = FetcherRegistry::new();
        let parsed = vec![
            ParsedFetcher::new("a", RegisteredFetcher::new(Arc::new(CountingFetcher::default()))),
            ParsedFetcher::new("a", RegisteredFetcher::new(Arc::new(CountingFetcher::default()))),
        ];

        let err = registry.register_all(parsed).unwrap_err();
        assert!(matches!(err, CollectorError::DuplicateKey(_)));
        assert_eq!(registry.len(), 1);
    }

    #[tokio::test]
    async fn update_without_updater_is_noop() {
        let registry = FetcherRegistry::new();
        registry.update().await;
        assert!(registry.is_empty());
        assert!(!registry.should_run("some-key"));
    }

    #[tokio::test]
    async fn failed_update_keeps_current_set() {
        let attempts = Arc::new(AtomicUsize::new(0));
        let original = Arc::new(CountingFetcher::default());
        let seed = Arc::clone(&original);
        let counter = Arc::clone(&attempts);

        let registry = FetcherRegistry::with_updater(Arc::new(move || {
            let attempt = counter.fetch_add(1, Ordering::SeqCst);
            let seed = Arc::clone(&seed);
            async move {
                if attempt == 0 {
                    let mut map = FetchersMap::new();
                    map.insert("fetcher".to_string(), RegisteredFetcher::new(seed));
                    Ok(map)
                } else {
                    Err(CollectorError::Fetcher(anyhow::anyhow!("some-error")))
                }
            }
            .boxed()
        }));

        registry.update().await;
        assert_eq!(registry.keys(), vec!["fetcher"]);

        registry.update().await;
        assert_eq!(registry.keys(), vec!["fetcher"]);
        registry.run("fetcher", context()).await.unwrap();
        assert_eq!(original.fetches.load(Ordering::SeqCst), 1);
        assert_eq!(original.stops.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn successful_update_stops_replaced_fetchers() {
        let old = Arc::new(CountingFetcher::default());
        let registry = FetcherRegistry::with_updater(Arc::new(|| {
            async {
                let mut map = FetchersMap::new();
                map.insert(
                    "replacement".to_string(),
                    RegisteredFetcher::new(Arc::new(CountingFetcher::default())),
                );
                Ok(map)
            }
            .boxed()
        }));
        registry.register("old", old.clone(), vec![]).unwrap();

        registry.update().await;

        assert_eq!(registry.keys(), vec!["replacement"]);
        assert_eq!(old.stops.load(Ordering::SeqCst), 1);
    }
}
