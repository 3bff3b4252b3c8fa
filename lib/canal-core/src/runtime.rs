//! Reconciler runtime
//!
//! Each registered [`Reconciler`] runs as a kube-runtime `Controller` over its
//! watched kind. The controller serializes reconciles per object key and runs
//! different keys concurrently; failed reconciles are requeued with a per-key
//! exponential backoff that resets on the next success.

use async_trait::async_trait;
use futures::future::{join_all, BoxFuture};
use futures::{FutureExt, StreamExt};
use kube::{Api, Client};
use kube_runtime::{controller::Action, watcher, Controller};
use std::collections::HashMap;
use std::sync::{Arc, Mutex};
use std::time::{Duration, Instant};
use tracing::{debug, info, warn};

use crate::metrics::Metrics;
use crate::store::{ObjectKey, StoreObject};
use crate::{CoreError, Result};

/// What the runtime should do after a successful reconcile
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum ReconcileOutcome {
    /// Wait for the next change to the object or anything it watches
    Done,
    /// Reconcile the same key again after the given delay
    RequeueAfter(Duration),
}

impl ReconcileOutcome {
    pub fn into_action(self) -> Action {
        match self {
            ReconcileOutcome::Done => Action::await_change(),
            ReconcileOutcome::RequeueAfter(delay) => Action::requeue(delay),
        }
    }
}

/// Brings the cluster in line with one object of the watched kind
#[async_trait]
pub trait Reconciler: Send + Sync + 'static {
    /// Kind whose changes trigger a reconcile
    type Object: StoreObject;

    /// Controller name used in logs and metrics
    fn name(&self) -> &'static str;

    /// Reconcile the object at `key`. The object may no longer exist.
    async fn reconcile(&self, key: &ObjectKey) -> Result<ReconcileOutcome>;

    /// Add secondary watches, e.g. `.owns(...)` for generated objects
    fn watches(&self, controller: Controller<Self::Object>, _client: &Client) -> Controller<Self::Object> {
        controller
    }
}

/// Per-key exponential retry delays
pub struct Backoff {
    initial: Duration,
    max: Duration,
    attempts: Mutex<HashMap<ObjectKey, u32>>,
}

impl Default for Backoff {
    fn default() -> Self {
        Self::new(Duration::from_secs(1), Duration::from_secs(300))
    }
}

impl Backoff {
    pub fn new(initial: Duration, max: Duration) -> Self {
        Self {
            initial,
            max,
            attempts: Mutex::new(HashMap::new()),
        }
    }

    /// Delay for the given retry count: `initial * 2^retry`, capped at `max`
    pub fn delay_for(&self, retry_count: u32) -> Duration {
        let base = self.initial.as_millis() as u64;
        let exponential = 2u64.checked_pow(retry_count).unwrap_or(u64::MAX);
        let backoff_ms = base
            .saturating_mul(exponential)
            .min(self.max.as_millis() as u64);
        Duration::from_millis(backoff_ms)
    }

    /// Record a failure for `key` and return how long to wait before retrying
    pub fn next_delay(&self, key: &ObjectKey) -> Duration {
        let mut attempts = self.attempts.lock().unwrap_or_else(|e| e.into_inner());
        let count = attempts.entry(key.clone()).or_insert(0);
        let delay = self.delay_for(*count);
        *count = count.saturating_add(1);
        delay
    }

    /// Forget past failures for `key`
    pub fn reset(&self, key: &ObjectKey) {
        self.attempts
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .remove(key);
    }
}

struct Context<R: Reconciler> {
    reconciler: Arc<R>,
    metrics: Metrics,
    backoff: Backoff,
}

async fn reconcile_object<R: Reconciler>(
    obj: Arc<R::Object>,
    ctx: Arc<Context<R>>,
) -> std::result::Result<Action, CoreError> {
    let key = ObjectKey::of(obj.as_ref());
    let controller = ctx.reconciler.name();
    debug!(controller, namespace = %key.namespace, name = %key.name, "Reconciling");

    let start = Instant::now();
    let result = ctx.reconciler.reconcile(&key).await;
    ctx.metrics
        .record_reconcile(controller, result.is_ok(), start.elapsed());

    let outcome = result?;
    ctx.backoff.reset(&key);
    Ok(outcome.into_action())
}

fn error_policy<R: Reconciler>(obj: Arc<R::Object>, err: &CoreError, ctx: Arc<Context<R>>) -> Action {
    let key = ObjectKey::of(obj.as_ref());
    let delay = ctx.backoff.next_delay(&key);
    warn!(
        controller = ctx.reconciler.name(),
        namespace = %key.namespace,
        name = %key.name,
        retryable = err.is_retryable(),
        "Reconcile failed, retrying in {:?}: {}",
        delay,
        err
    );
    Action::requeue(delay)
}

async fn run_controller<R: Reconciler>(reconciler: Arc<R>, client: Client, metrics: Metrics) {
    let api: Api<R::Object> = Api::all(client.clone());
    let controller = reconciler.watches(Controller::new(api, watcher::Config::default()), &client);
    let name = reconciler.name();
    let ctx = Arc::new(Context {
        reconciler,
        metrics,
        backoff: Backoff::default(),
    });

    info!(controller = name, "Starting controller");
    controller
        .shutdown_on_signal()
        .run(reconcile_object::<R>, error_policy::<R>, ctx)
        .for_each(|res| async move {
            match res {
                Ok((obj, _)) => debug!(controller = name, "Reconciled {}", obj),
                Err(e) => debug!(controller = name, "Reconcile stream error: {}", e),
            }
        })
        .await;
    info!(controller = name, "Controller stopped");
}

/// Runs a set of reconcilers until the process receives a shutdown signal
pub struct Manager {
    client: Client,
    metrics: Metrics,
    controllers: Vec<(&'static str, BoxFuture<'static, ()>)>,
}

impl Manager {
    pub fn new(client: Client, metrics: Metrics) -> Self {
        Self {
            client,
            metrics,
            controllers: Vec::new(),
        }
    }

    pub fn register<R: Reconciler>(mut self, reconciler: R) -> Self {
        let name = reconciler.name();
        let run = run_controller(Arc::new(reconciler), self.client.clone(), self.metrics.clone());
        self.controllers.push((name, run.boxed()));
        self
    }

    pub fn controller_names(&self) -> Vec<&'static str> {
        self.controllers.iter().map(|(name, _)| *name).collect()
    }

    /// Run every registered controller; returns once all have shut down
    pub async fn start(self) {
        info!("Starting {} controllers", self.controllers.len());
        join_all(self.controllers.into_iter().map(|(_, run)| run)).await;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_outcome_into_action() {
        assert_eq!(ReconcileOutcome::Done.into_action(), Action::await_change());
        assert_eq!(
            ReconcileOutcome::RequeueAfter(Duration::from_secs(5)).into_action(),
            Action::requeue(Duration::from_secs(5))
        );
    }

    #[test]
    fn test_backoff_grows_and_caps() {
        let backoff = Backoff::default();
        let key = ObjectKey::new("a", "s");
        let delays: Vec<u64> = (0..12).map(|_| backoff.next_delay(&key).as_secs()).collect();
        assert_eq!(delays, vec![1, 2, 4, 8, 16, 32, 64, 128, 256, 300, 300, 300]);
    }

    #[test]
    fn test_backoff_resets_per_key() {
        let backoff = Backoff::default();
        let a = ObjectKey::new("a", "s");
        let b = ObjectKey::new("b", "s");
        backoff.next_delay(&a);
        backoff.next_delay(&a);
        assert_eq!(backoff.next_delay(&b), Duration::from_secs(1));
        assert_eq!(backoff.next_delay(&a), Duration::from_secs(4));

        backoff.reset(&a);
        assert_eq!(backoff.next_delay(&a), Duration::from_secs(1));
    }

    #[test]
    fn test_backoff_does_not_overflow() {
        let backoff = Backoff::default();
        assert_eq!(backoff.delay_for(200), Duration::from_secs(300));
    }
}
