//! Best-effort reachability view of every configured integration endpoint.
//!
//! Rounds are triggered by connection transitions, by configuration changes
//! (debounced) and by explicit rechecks. Every write to the health map is
//! guarded by the cancellation token of the round that produced it, so
//! results from a superseded round or a closed session are dropped.

pub mod probe;

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::Duration;
use tokio::sync::watch;
use tokio::task::JoinSet;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info};

use crate::core::integrations::{IntegrationConfig, IntegrationRegistry};
use crate::core::scheduler::DelayedTask;
use probe::Prober;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum HealthStatus {
    Unchecked,
    Checking,
    Ok,
    Unreachable,
}

impl HealthStatus {
    pub fn as_str(self) -> &'static str {
        match self {
            HealthStatus::Unchecked => "unchecked",
            HealthStatus::Checking => "checking",
            HealthStatus::Ok => "ok",
            HealthStatus::Unreachable => "unreachable",
        }
    }
}

/// Integration id to status. Unconfigured integrations have no entry.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
#[serde(transparent)]
pub struct HealthMap(BTreeMap<String, HealthStatus>);

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct HealthSummary {
    pub ok: usize,
    pub unreachable: usize,
    pub checking: usize,
    pub unchecked: usize,
}

impl HealthMap {
    pub fn get(&self, id: &str) -> Option<HealthStatus> {
        self.0.get(id).copied()
    }

    #[cfg(test)]
    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    /// True once no entry is still being checked.
    pub fn is_settled(&self) -> bool {
        self.0.values().all(|s| *s != HealthStatus::Checking)
    }

    pub fn summary(&self) -> HealthSummary {
        let mut summary = HealthSummary::default();
        for status in self.0.values() {
            match status {
                HealthStatus::Ok => summary.ok += 1,
                HealthStatus::Unreachable => summary.unreachable += 1,
                HealthStatus::Checking => summary.checking += 1,
                HealthStatus::Unchecked => summary.unchecked += 1,
            }
        }
        summary
    }
}

#[derive(Debug, Clone)]
pub struct HealthSettings {
    /// Settle delay before a configuration change triggers a round.
    pub debounce: Duration,
    pub probe_timeout: Duration,
}

impl Default for HealthSettings {
    fn default() -> Self {
        Self {
            debounce: Duration::from_millis(500),
            probe_timeout: Duration::from_secs(5),
        }
    }
}

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(PoisonError::into_inner)
}

struct Inner {
    registry: Arc<IntegrationRegistry>,
    prober: Arc<dyn Prober>,
    settings: HealthSettings,
    config: Mutex<IntegrationConfig>,
    /// Present while connected; cancelled on disconnect.
    session: Mutex<Option<CancellationToken>>,
    /// Token of the most recent round, a child of the session token.
    round: Mutex<Option<CancellationToken>>,
    /// Bumped on every connection transition.
    epoch: AtomicU64,
    pending: Mutex<DelayedTask>,
    health: watch::Sender<HealthMap>,
}

impl Inner {
    fn schedule_round(self: &Arc<Self>, delay: Duration) {
        let inner = self.clone();
        lock(&self.pending).schedule(delay, async move {
            inner.run_round().await;
        });
    }

    /// Starts a round against the current configuration and waits until
    /// every probe has settled. A no-op while disconnected.
    async fn run_round(self: Arc<Self>) {
        let Some(session) = lock(&self.session).clone() else {
            debug!("Skipping health round, not connected");
            return;
        };
        let round = session.child_token();
        if let Some(previous) = lock(&self.round).replace(round.clone()) {
            previous.cancel();
        }

        let config = lock(&self.config).clone();
        let targets: Vec<(String, String)> = self
            .registry
            .configured(&config)
            .map(|d| (d.id.clone(), d.endpoint(&config).trim().to_string()))
            .collect();

        // One write marks the whole round as checking.
        let checking: BTreeMap<_, _> = targets
            .iter()
            .map(|(id, _)| (id.clone(), HealthStatus::Checking))
            .collect();
        self.health.send_if_modified(|map| {
            if round.is_cancelled() {
                return false;
            }
            *map = HealthMap(checking);
            true
        });
        if targets.is_empty() {
            debug!("No configured integrations to check");
            return;
        }
        info!("Checking {} integration endpoint(s)", targets.len());

        let mut probes = JoinSet::new();
        for (id, url) in targets {
            let inner = self.clone();
            let round = round.clone();
            probes.spawn(async move {
                let timeout = inner.settings.probe_timeout;
                let reachable = tokio::time::timeout(timeout, inner.prober.ping(&url, timeout))
                    .await
                    .unwrap_or(false);
                let status = if reachable {
                    HealthStatus::Ok
                } else {
                    HealthStatus::Unreachable
                };
                debug!("{} ({}) is {}", id, url, status.as_str());
                inner.health.send_if_modified(|map| {
                    if round.is_cancelled() {
                        return false;
                    }
                    map.0.insert(id, status);
                    true
                });
            });
        }
        while probes.join_next().await.is_some() {}
    }
}

/// Owns the health map and the polling schedule. Dropping it cancels the
/// session and any pending round.
pub struct HealthMonitor {
    inner: Arc<Inner>,
}

impl HealthMonitor {
    pub fn new(
        registry: Arc<IntegrationRegistry>,
        prober: Arc<dyn Prober>,
        settings: HealthSettings,
    ) -> Self {
        let (health, _) = watch::channel(HealthMap::default());
        Self {
            inner: Arc::new(Inner {
                registry,
                prober,
                settings,
                config: Mutex::new(IntegrationConfig::default()),
                session: Mutex::new(None),
                round: Mutex::new(None),
                epoch: AtomicU64::new(0),
                pending: Mutex::new(DelayedTask::new()),
                health,
            }),
        }
    }

    pub fn is_connected(&self) -> bool {
        lock(&self.inner.session).is_some()
    }

    /// Reacts to the connection becoming active or inactive. Going active
    /// schedules an immediate round; going inactive drops the session and
    /// schedules the map to be cleared. Repeated calls with the same state
    /// do nothing.
    pub fn set_connected(&self, connected: bool) {
        let mut session = lock(&self.inner.session);
        match (connected, session.is_some()) {
            (true, false) => {
                *session = Some(CancellationToken::new());
                drop(session);
                self.inner.epoch.fetch_add(1, Ordering::SeqCst);
                info!("Health monitor connected");
                self.inner.schedule_round(Duration::ZERO);
            }
            (false, true) => {
                if let Some(token) = session.take() {
                    token.cancel();
                }
                drop(session);
                let epoch = self.inner.epoch.fetch_add(1, Ordering::SeqCst) + 1;
                lock(&self.inner.pending).cancel();
                info!("Health monitor disconnected");

                let inner = self.inner.clone();
                tokio::spawn(async move {
                    inner.health.send_if_modified(|map| {
                        // A reconnect in the meantime owns the map now.
                        if inner.epoch.load(Ordering::SeqCst) != epoch || map.is_empty() {
                            return false;
                        }
                        *map = HealthMap::default();
                        true
                    });
                });
            }
            _ => {}
        }
    }

    /// Replaces the configuration snapshot. While connected, a round is
    /// scheduled after the debounce delay, replacing any round still waiting
    /// from an earlier change.
    pub fn update_config(&self, config: IntegrationConfig) {
        {
            let mut current = lock(&self.inner.config);
            if *current == config {
                return;
            }
            *current = config;
        }
        if self.is_connected() {
            self.inner.schedule_round(self.inner.settings.debounce);
        }
    }

    /// Starts a round right away. A no-op while disconnected.
    pub fn recheck(&self) {
        if self.is_connected() {
            self.inner.schedule_round(Duration::ZERO);
        }
    }

    /// Runs a round inline, replacing any scheduled one, and returns once no
    /// entry is still checking.
    pub async fn check_now(&self) -> HealthMap {
        lock(&self.inner.pending).cancel();
        self.inner.clone().run_round().await;
        let mut rx = self.subscribe();
        let _ = rx.wait_for(HealthMap::is_settled).await;
        self.snapshot()
    }

    pub fn snapshot(&self) -> HealthMap {
        self.inner.health.borrow().clone()
    }

    pub fn subscribe(&self) -> watch::Receiver<HealthMap> {
        self.inner.health.subscribe()
    }
}

impl Drop for HealthMonitor {
    fn drop(&mut self) {
        lock(&self.inner.pending).cancel();
        if let Some(token) = lock(&self.inner.session).take() {
            token.cancel();
        }
    }
}
