//! Run statistics aggregated from the session event stream.
//!
//! Requests are grouped by statistics name, not concrete path. Correctness
//! violations are kept apart from request failures: a run passes if and only
//! if no violation was recorded, however many requests failed.

use std::collections::BTreeMap;
use std::time::Duration;

use hdrhistogram::Histogram;
use serde::Serialize;

use crate::event::{LoadEvent, ReplayViolation, RequestRecord, SkipReason};
use crate::profile::{Role, TaskKind};
use crate::transport::Method;

/// Latency percentiles in microseconds.
#[derive(Debug, Clone)]
pub struct LatencyTracker {
    histogram: Histogram<u64>,
}

impl LatencyTracker {
    /// Tracks latencies with 3 significant digits, resizing as needed.
    pub fn new() -> Self {
        Self {
            histogram: Histogram::new(3).expect("valid histogram config"),
        }
    }

    pub fn record(&mut self, latency: Duration) {
        let micros = u64::try_from(latency.as_micros()).unwrap_or(u64::MAX);
        self.histogram.record(micros).ok();
    }

    pub fn count(&self) -> u64 {
        self.histogram.len()
    }

    pub fn percentile_us(&self, quantile: f64) -> u64 {
        self.histogram.value_at_quantile(quantile)
    }

    pub fn max_us(&self) -> u64 {
        self.histogram.max()
    }

    pub fn mean_us(&self) -> f64 {
        self.histogram.mean()
    }
}

impl Default for LatencyTracker {
    fn default() -> Self {
        Self::new()
    }
}

/// Counters for one statistics name.
#[derive(Debug, Clone)]
pub struct EndpointStats {
    pub method: Method,
    pub requests: u64,
    /// Non-2xx statuses plus transport errors.
    pub failures: u64,
    pub transport_errors: u64,
    pub statuses: BTreeMap<u16, u64>,
    pub latency: LatencyTracker,
}

impl EndpointStats {
    fn new(method: Method) -> Self {
        Self {
            method,
            requests: 0,
            failures: 0,
            transport_errors: 0,
            statuses: BTreeMap::new(),
            latency: LatencyTracker::new(),
        }
    }

    fn observe(&mut self, record: &RequestRecord) {
        self.requests += 1;
        if !record.ok {
            self.failures += 1;
        }
        match record.status {
            Some(status) => *self.statuses.entry(status).or_default() += 1,
            None => self.transport_errors += 1,
        }
        self.latency.record(record.latency);
    }
}

#[derive(Debug, Clone, Default)]
pub struct RunStats {
    endpoints: BTreeMap<&'static str, EndpointStats>,
    skips: BTreeMap<(TaskKind, SkipReason), u64>,
    violations: Vec<ReplayViolation>,
    sessions: BTreeMap<Role, SessionCounts>,
}

/// Start-up results per role.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct SessionCounts {
    pub started: u64,
    pub authenticated: u64,
    pub with_account: u64,
}

impl RunStats {
    pub fn new() -> Self {
        Self::default()
    }

    /// Folds one event into the statistics.
    pub fn observe(&mut self, event: &LoadEvent) {
        match event {
            LoadEvent::Request(record) => self
                .endpoints
                .entry(record.name)
                .or_insert_with(|| EndpointStats::new(record.method))
                .observe(record),
            LoadEvent::Skipped { task, reason, .. } => {
                *self.skips.entry((*task, *reason)).or_default() += 1;
            }
            LoadEvent::Violation(violation) => self.violations.push(violation.clone()),
            LoadEvent::SessionStarted {
                role,
                authenticated,
                has_account,
                ..
            } => {
                let counts = self.sessions.entry(*role).or_default();
                counts.started += 1;
                counts.authenticated += u64::from(*authenticated);
                counts.with_account += u64::from(*has_account);
            }
        }
    }

    pub fn endpoint(&self, name: &str) -> Option<&EndpointStats> {
        self.endpoints.get(name)
    }

    pub fn total_requests(&self) -> u64 {
        self.endpoints.values().map(|e| e.requests).sum()
    }

    pub fn total_failures(&self) -> u64 {
        self.endpoints.values().map(|e| e.failures).sum()
    }

    pub fn total_skips(&self) -> u64 {
        self.skips.values().sum()
    }

    pub fn violations(&self) -> &[ReplayViolation] {
        &self.violations
    }

    pub fn sessions(&self, role: Role) -> SessionCounts {
        self.sessions.get(&role).copied().unwrap_or_default()
    }

    /// Serializable per-endpoint rows, ordered by name.
    pub fn endpoint_summaries(&self) -> Vec<EndpointSummary> {
        self.endpoints
            .iter()
            .map(|(name, stats)| EndpointSummary {
                name: (*name).to_string(),
                method: stats.method,
                requests: stats.requests,
                failures: stats.failures,
                transport_errors: stats.transport_errors,
                statuses: stats.statuses.clone(),
                p50_us: stats.latency.percentile_us(0.50),
                p95_us: stats.latency.percentile_us(0.95),
                p99_us: stats.latency.percentile_us(0.99),
                max_us: stats.latency.max_us(),
                mean_us: stats.latency.mean_us(),
            })
            .collect()
    }

    pub fn skip_summaries(&self) -> Vec<SkipSummary> {
        self.skips
            .iter()
            .map(|(&(task, reason), &count)| SkipSummary {
                task,
                reason,
                count,
            })
            .collect()
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct EndpointSummary {
    pub name: String,
    pub method: Method,
    pub requests: u64,
    pub failures: u64,
    pub transport_errors: u64,
    pub statuses: BTreeMap<u16, u64>,
    pub p50_us: u64,
    pub p95_us: u64,
    pub p99_us: u64,
    pub max_us: u64,
    pub mean_us: f64,
}

#[derive(Debug, Clone, Serialize)]
pub struct SkipSummary {
    pub task: TaskKind,
    pub reason: SkipReason,
    pub count: u64,
}

/// Outcome of a whole run.
#[derive(Debug, Clone)]
pub struct RunReport {
    pub stats: RunStats,
    pub users_spawned: u64,
    pub elapsed: Duration,
    pub seed: u64,
}

impl RunReport {
    /// True iff no correctness violation was recorded.
    pub fn passed(&self) -> bool {
        self.stats.violations().is_empty()
    }

    /// Requests per second over the whole run.
    pub fn throughput(&self) -> f64 {
        let secs = self.elapsed.as_secs_f64();
        if secs <= 0.0 {
            return 0.0;
        }
        self.stats.total_requests() as f64 / secs
    }

    pub fn summary(&self) -> RunSummary {
        RunSummary {
            passed: self.passed(),
            seed: self.seed,
            users_spawned: self.users_spawned,
            elapsed_secs: self.elapsed.as_secs_f64(),
            total_requests: self.stats.total_requests(),
            total_failures: self.stats.total_failures(),
            throughput: self.throughput(),
            sessions: Role::ALL
                .iter()
                .map(|role| (*role, self.stats.sessions(*role)))
                .filter(|(_, counts)| counts.started > 0)
                .collect(),
            endpoints: self.stats.endpoint_summaries(),
            skips: self.stats.skip_summaries(),
            violations: self.stats.violations().to_vec(),
        }
    }
}

/// JSON shape of a run report.
#[derive(Debug, Clone, Serialize)]
pub struct RunSummary {
    pub passed: bool,
    pub seed: u64,
    pub users_spawned: u64,
    pub elapsed_secs: f64,
    pub total_requests: u64,
    pub total_failures: u64,
    pub throughput: f64,
    pub sessions: BTreeMap<Role, SessionCounts>,
    pub endpoints: Vec<EndpointSummary>,
    pub skips: Vec<SkipSummary>,
    pub violations: Vec<ReplayViolation>,
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::api::names;

    fn request(name: &'static str, status: Option<u16>, millis: u64) -> LoadEvent {
        LoadEvent::Request(RequestRecord {
            name,
            method: Method::Get,
            status,
            latency: Duration::from_millis(millis),
            ok: status.is_some_and(|s| (200..300).contains(&s)),
            error: status.is_none().then(|| "connection refused".to_string()),
        })
    }

    #[test]
    fn requests_are_grouped_by_name() {
        let mut stats = RunStats::new();
        stats.observe(&request(names::ACCOUNT, Some(200), 10));
        stats.observe(&request(names::ACCOUNT, Some(500), 20));
        stats.observe(&request(names::ACCOUNT, None, 30));
        stats.observe(&request(names::ACCOUNTS, Some(200), 5));

        let account = stats.endpoint(names::ACCOUNT).unwrap();
        assert_eq!(account.requests, 3);
        assert_eq!(account.failures, 2);
        assert_eq!(account.transport_errors, 1);
        assert_eq!(account.statuses.get(&200), Some(&1));
        assert_eq!(account.statuses.get(&500), Some(&1));
        assert_eq!(stats.total_requests(), 4);
    }

    #[test]
    fn latency_percentiles_are_in_microseconds() {
        let mut stats = RunStats::new();
        for millis in 1..=100 {
            stats.observe(&request(names::ACCOUNTS, Some(200), millis));
        }
        let summary = &stats.endpoint_summaries()[0];
        assert!(summary.p50_us >= 49_000 && summary.p50_us <= 51_000);
        assert!(summary.max_us >= 99_900);
    }

    #[test]
    fn failures_do_not_fail_the_run() {
        let mut stats = RunStats::new();
        stats.observe(&request(names::TRANSFERS, Some(503), 1));
        let report = RunReport {
            stats,
            users_spawned: 1,
            elapsed: Duration::from_secs(1),
            seed: 0,
        };
        assert!(report.passed());
    }

    #[test]
    fn a_violation_fails_the_run() {
        let mut stats = RunStats::new();
        stats.observe(&LoadEvent::Violation(ReplayViolation {
            owner: "idem_x".to_string(),
            key: "stress-k".to_string(),
            attempts: 5,
            created: 5,
            replayed: 0,
            unexpected: 0,
        }));
        let report = RunReport {
            stats,
            users_spawned: 1,
            elapsed: Duration::from_secs(1),
            seed: 0,
        };
        assert!(!report.passed());
        let json = serde_json::to_value(report.summary()).unwrap();
        assert_eq!(json["passed"], false);
        assert_eq!(json["violations"][0]["created"], 5);
    }

    #[test]
    fn session_starts_are_counted_per_role() {
        let mut stats = RunStats::new();
        for (authenticated, has_account) in [(true, true), (true, false), (false, false)] {
            stats.observe(&LoadEvent::SessionStarted {
                role: Role::Payment,
                username: "load_x".to_string(),
                authenticated,
                has_account,
            });
        }
        assert_eq!(
            stats.sessions(Role::Payment),
            SessionCounts {
                started: 3,
                authenticated: 2,
                with_account: 1,
            }
        );
        assert_eq!(stats.sessions(Role::Burst), SessionCounts::default());
    }

    #[test]
    fn skips_are_counted_per_task_and_reason() {
        let mut stats = RunStats::new();
        for _ in 0..2 {
            stats.observe(&LoadEvent::Skipped {
                role: Role::Payment,
                task: TaskKind::Transfer,
                reason: SkipReason::NoAccount,
            });
        }
        assert_eq!(stats.total_skips(), 2);
        assert_eq!(stats.skip_summaries()[0].count, 2);
    }
}
