use std::{
    collections::BTreeMap,
    panic::{catch_unwind, AssertUnwindSafe},
    sync::{
        atomic::{AtomicBool, Ordering},
        Arc,
    },
};

use anyhow::{Context, Result};
use chrono::{DateTime, Utc};
use futures::future::BoxFuture;
use parking_lot::Mutex;
use serde::Serialize;
use tokio::task::JoinHandle;

use crate::{
    alerts::{self, alert_from_hit, fingerprint, AlertBuffer, SeenHits},
    config::MonitorConfig,
    domain::{Alert, MonitoringRule, RawHit, RuleError, RuleUpdate, Severity},
    infrastructure::shutdown::{Shutdown, ShutdownListener},
    monitor::sources::HitSource,
};

pub type AlertCallback = Arc<dyn Fn(&Alert) + Send + Sync>;

pub trait AlertSink: Send + Sync {
    fn record<'a>(&'a self, alert: &'a Alert, fingerprint: &'a str) -> BoxFuture<'a, Result<()>>;
}

/// Outcome of one pass over the due rules. A failed rule keeps its previous `last_run`.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct DuePass {
    pub executed: usize,
    pub failed: usize,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct MonitorStatistics {
    pub total_rules: usize,
    pub active_rules: usize,
    pub is_monitoring: bool,
    pub buffered_alerts: usize,
    pub seen_hits: usize,
    pub rules_by_frequency: BTreeMap<u32, usize>,
}

struct Inner {
    source: Arc<dyn HitSource>,
    config: MonitorConfig,
    rules: Mutex<BTreeMap<String, MonitoringRule>>,
    buffer: Mutex<AlertBuffer>,
    seen: Mutex<SeenHits>,
    callbacks: Mutex<Vec<AlertCallback>>,
    sink: Option<Arc<dyn AlertSink>>,
    monitoring: AtomicBool,
}

pub struct Scheduler {
    inner: Arc<Inner>,
    stop: Mutex<Option<Shutdown>>,
    handle: Mutex<Option<JoinHandle<()>>>,
}

impl Scheduler {
    pub fn new(source: Arc<dyn HitSource>, config: MonitorConfig) -> Self {
        let inner = Inner {
            source,
            buffer: Mutex::new(AlertBuffer::new(config.alert_capacity)),
            seen: Mutex::new(SeenHits::new(config.dedup_capacity)),
            config,
            rules: Mutex::new(BTreeMap::new()),
            callbacks: Mutex::new(Vec::new()),
            sink: None,
            monitoring: AtomicBool::new(false),
        };
        Self {
            inner: Arc::new(inner),
            stop: Mutex::new(None),
            handle: Mutex::new(None),
        }
    }

    /// Must be called before the scheduler is shared or started.
    pub fn with_sink(mut self, sink: Arc<dyn AlertSink>) -> Self {
        if let Some(inner) = Arc::get_mut(&mut self.inner) {
            inner.sink = Some(sink);
        }
        self
    }

    pub fn preload_seen(&self, fingerprints: impl IntoIterator<Item = String>) {
        self.inner.seen.lock().preload(fingerprints);
    }

    pub fn add_rule(&self, rule: MonitoringRule) -> Result<(), RuleError> {
        rule.validate()?;
        tracing::info!(
            target: "monitor",
            rule = %rule.id,
            keywords = rule.keywords.len(),
            sources = rule.sources.len(),
            every_minutes = rule.frequency_minutes,
            "rule added"
        );
        self.inner.rules.lock().insert(rule.id.clone(), rule);
        Ok(())
    }

    pub fn remove_rule(&self, id: &str) -> bool {
        let removed = self.inner.rules.lock().remove(id).is_some();
        if removed {
            tracing::info!(target: "monitor", rule = id, "rule removed");
        }
        removed
    }

    pub fn update_rule(&self, id: &str, update: &RuleUpdate) -> Result<MonitoringRule, RuleError> {
        let mut rules = self.inner.rules.lock();
        let current = rules
            .get(id)
            .ok_or_else(|| RuleError::UnknownRule(id.to_string()))?;
        let updated = update.applied_to(current)?;
        rules.insert(id.to_string(), updated.clone());
        tracing::info!(target: "monitor", rule = id, "rule updated");
        Ok(updated)
    }

    pub fn rules(&self) -> Vec<MonitoringRule> {
        self.inner.rules.lock().values().cloned().collect()
    }

    pub fn on_alert(&self, callback: AlertCallback) {
        self.inner.callbacks.lock().push(callback);
    }

    pub fn start(&self) -> bool {
        if self.inner.monitoring.swap(true, Ordering::SeqCst) {
            tracing::warn!(target: "monitor", "monitoring already running; start rejected");
            return false;
        }
        let (shutdown, listener) = Shutdown::new();
        *self.stop.lock() = Some(shutdown);

        let inner = self.inner.clone();
        let handle = tokio::spawn(async move {
            inner.run_loop(listener).await;
            inner.monitoring.store(false, Ordering::SeqCst);
        });
        *self.handle.lock() = Some(handle);
        tracing::info!(target: "monitor", "monitoring started");
        true
    }

    /// Signals the loop and waits a bounded time for it to exit. A loop still inside a
    /// dispatch after the timeout is left to finish on its own.
    pub async fn stop(&self) {
        if let Some(shutdown) = self.stop.lock().take() {
            shutdown.trigger();
        }
        let handle = self.handle.lock().take();
        let Some(handle) = handle else {
            return;
        };
        match tokio::time::timeout(self.inner.config.stop_timeout, handle).await {
            Ok(Ok(())) => tracing::info!(target: "monitor", "monitoring stopped"),
            Ok(Err(err)) => {
                tracing::error!(target: "monitor", error = %err, "monitoring task failed");
                self.inner.monitoring.store(false, Ordering::SeqCst);
            }
            Err(_) => tracing::warn!(
                target: "monitor",
                timeout_secs = self.inner.config.stop_timeout.as_secs(),
                "monitoring loop did not stop in time"
            ),
        }
    }

    pub fn is_monitoring(&self) -> bool {
        self.inner.monitoring.load(Ordering::SeqCst)
    }

    pub async fn run_due_rules(&self, now: DateTime<Utc>) -> DuePass {
        let (_guard, mut listener) = Shutdown::new();
        self.inner.run_due_rules(now, &mut listener).await
    }

    pub fn recent_alerts(&self, hours: u32) -> Vec<Alert> {
        self.inner.buffer.lock().recent(hours, Utc::now())
    }

    pub fn alerts_by_severity(&self, severity: Severity) -> Vec<Alert> {
        self.inner.buffer.lock().by_severity(severity, Utc::now())
    }

    pub fn export_alerts_json(&self, hours: u32) -> Result<String> {
        alerts::export_json(&self.recent_alerts(hours))
    }

    pub fn statistics(&self) -> MonitorStatistics {
        let rules = self.inner.rules.lock();
        let mut rules_by_frequency = BTreeMap::new();
        for rule in rules.values() {
            *rules_by_frequency.entry(rule.frequency_minutes).or_insert(0) += 1;
        }
        MonitorStatistics {
            total_rules: rules.len(),
            active_rules: rules.values().filter(|rule| rule.enabled).count(),
            is_monitoring: self.is_monitoring(),
            buffered_alerts: self.inner.buffer.lock().len(),
            seen_hits: self.inner.seen.lock().len(),
            rules_by_frequency,
        }
    }
}

impl Inner {
    async fn run_loop(&self, mut listener: ShutdownListener) {
        loop {
            if listener.is_triggered() {
                break;
            }
            let pass = self.run_due_rules(Utc::now(), &mut listener).await;
            let pause = if pass.failed > 0 {
                tracing::warn!(
                    target: "monitor",
                    failed = pass.failed,
                    backoff_secs = self.config.error_backoff.as_secs(),
                    "backing off after failed rules"
                );
                self.config.error_backoff
            } else {
                self.config.poll_interval
            };
            if !listener.sleep(pause).await {
                break;
            }
        }
        tracing::info!(target: "monitor", "monitoring loop exited");
    }

    async fn run_due_rules(&self, now: DateTime<Utc>, listener: &mut ShutdownListener) -> DuePass {
        let due: Vec<MonitoringRule> = self
            .rules
            .lock()
            .values()
            .filter(|rule| rule.is_due(now))
            .cloned()
            .collect();

        let mut pass = DuePass::default();
        for rule in due {
            if listener.is_triggered() {
                break;
            }
            match self.execute_rule(&rule, listener).await {
                Ok(emitted) => {
                    if let Some(stored) = self.rules.lock().get_mut(&rule.id) {
                        stored.last_run = now;
                    }
                    pass.executed += 1;
                    tracing::info!(target: "monitor", rule = %rule.id, alerts = emitted, "rule executed");
                }
                Err(err) => {
                    pass.failed += 1;
                    tracing::error!(
                        target: "monitor",
                        rule = %rule.id,
                        error = %format!("{err:#}"),
                        "rule execution failed"
                    );
                }
            }
        }
        pass
    }

    async fn execute_rule(&self, rule: &MonitoringRule, listener: &mut ShutdownListener) -> Result<usize> {
        let mut emitted = 0;
        let mut first = true;
        for keyword in rule.keywords.iter().map(|k| k.trim()).filter(|k| !k.is_empty()) {
            for source in &rule.sources {
                if !first && !listener.sleep(self.config.dispatch_delay).await {
                    return Ok(emitted);
                }
                first = false;
                if listener.is_triggered() {
                    return Ok(emitted);
                }

                let hits = self
                    .source
                    .search(*source, keyword, &rule.filters, listener)
                    .await
                    .with_context(|| format!("searching {source} for {keyword}"))?;
                for hit in hits {
                    if self.ingest(keyword, hit).await {
                        emitted += 1;
                    }
                }
            }
        }
        Ok(emitted)
    }

    async fn ingest(&self, keyword: &str, hit: RawHit) -> bool {
        let print = fingerprint(&hit);
        if !self.seen.lock().insert(print.clone()) {
            return false;
        }

        let alert = alert_from_hit(keyword, &hit, Utc::now());
        self.buffer.lock().push(alert.clone());
        tracing::info!(
            target: "monitor",
            id = %alert.id,
            keyword,
            source = %alert.source,
            severity = %alert.severity,
            confidence = alert.confidence,
            "alert raised"
        );

        if let Some(sink) = &self.sink {
            if let Err(err) = sink.record(&alert, &print).await {
                tracing::warn!(target: "monitor", id = %alert.id, error = %err, "failed to persist alert");
            }
        }

        let callbacks = self.callbacks.lock().clone();
        for callback in callbacks {
            if catch_unwind(AssertUnwindSafe(|| callback(&alert))).is_err() {
                tracing::error!(target: "monitor", id = %alert.id, "alert callback panicked");
            }
        }
        true
    }
}
