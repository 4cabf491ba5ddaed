//! Run-level orchestration: spawns virtual users at a fixed rate, hands each
//! one a forked random source and a role drawn by class weight, and drains
//! their events into [`RunStats`] until the run is stopped.
//!
//! Stopping is cooperative. Run-time expiry or an external [`StopHandle`]
//! flips a watch channel; sessions abandon their think-time wait at once and
//! otherwise stop after the call in flight returns.

use std::sync::Arc;
use std::time::Duration;

use tokio::sync::{mpsc, watch};
use tokio::task::JoinSet;
use tokio::time::Instant;
use tracing::{debug, info, warn};

use crate::error::{LoadgenError, Result};
use crate::event::{EventSink, LoadEvent};
use crate::profile::SessionProfile;
use crate::session::VirtualUserSession;
use crate::stats::{RunReport, RunStats};
use crate::transport::Transport;
use crate::LoadRng;

// ============================================================================
// Stop signal
// ============================================================================

/// Creates a linked stop handle and signal.
pub fn stop_signal() -> (StopHandle, StopSignal) {
    let (tx, rx) = watch::channel(false);
    (StopHandle { tx: Arc::new(tx) }, StopSignal { rx })
}

/// Flips every linked [`StopSignal`].
#[derive(Debug, Clone)]
pub struct StopHandle {
    tx: Arc<watch::Sender<bool>>,
}

impl StopHandle {
    pub fn stop(&self) {
        self.tx.send_replace(true);
    }

    pub fn signal(&self) -> StopSignal {
        StopSignal {
            rx: self.tx.subscribe(),
        }
    }
}

#[derive(Debug, Clone)]
pub struct StopSignal {
    rx: watch::Receiver<bool>,
}

impl StopSignal {
    pub fn is_stopped(&self) -> bool {
        *self.rx.borrow()
    }

    /// Completes once stop is requested. Never completes if every handle
    /// was dropped without stopping.
    pub async fn stopped(&mut self) {
        if self.rx.wait_for(|stopped| *stopped).await.is_err() {
            std::future::pending::<()>().await;
        }
    }
}

// ============================================================================
// Run configuration
// ============================================================================

#[derive(Debug, Clone)]
pub struct RunConfig {
    /// Virtual users to spawn.
    pub users: u64,
    /// Users spawned per second.
    pub spawn_rate: f64,
    /// Wall-clock limit; `None` runs until stopped externally.
    pub run_time: Option<Duration>,
    /// Root seed every session's random source is forked from.
    pub seed: u64,
    pub profiles: Vec<Arc<SessionProfile>>,
}

impl Default for RunConfig {
    fn default() -> Self {
        Self {
            users: 10,
            spawn_rate: 1.0,
            run_time: Some(Duration::from_secs(60)),
            seed: 0,
            profiles: vec![
                Arc::new(SessionProfile::payment()),
                Arc::new(SessionProfile::idempotency()),
                Arc::new(SessionProfile::burst()),
            ],
        }
    }
}

impl RunConfig {
    pub fn validate(&self) -> Result<()> {
        if self.users == 0 {
            return Err(LoadgenError::InvalidRun("users must be at least 1".to_string()));
        }
        if !self.spawn_rate.is_finite() || self.spawn_rate <= 0.0 {
            return Err(LoadgenError::InvalidRun(format!(
                "spawn rate {} must be positive",
                self.spawn_rate
            )));
        }
        if Duration::try_from_secs_f64(1.0 / self.spawn_rate).is_err() {
            return Err(LoadgenError::InvalidRun(format!(
                "spawn rate {} is too small to schedule",
                self.spawn_rate
            )));
        }
        if self.run_time.is_some_and(|t| t.is_zero()) {
            return Err(LoadgenError::InvalidRun("run time must be positive".to_string()));
        }
        if self.profiles.is_empty() {
            return Err(LoadgenError::InvalidRun("no role profiles selected".to_string()));
        }
        for profile in &self.profiles {
            profile.validate()?;
        }
        if self.total_class_weight() == 0 {
            return Err(LoadgenError::InvalidRun(
                "role class weights sum to zero".to_string(),
            ));
        }
        Ok(())
    }

    fn total_class_weight(&self) -> u64 {
        self.profiles.iter().map(|p| u64::from(p.class_weight)).sum()
    }

    /// Picks a role profile with probability proportional to its class weight.
    fn pick_profile(&self, rng: &mut LoadRng) -> Arc<SessionProfile> {
        let mut ticket = rng.range_inclusive(0, self.total_class_weight().saturating_sub(1));
        for profile in &self.profiles {
            let weight = u64::from(profile.class_weight);
            if ticket < weight {
                return Arc::clone(profile);
            }
            ticket -= weight;
        }
        Arc::clone(&self.profiles[self.profiles.len() - 1])
    }

    /// Pause between spawns. Saturates for rates `validate` rejects.
    fn spawn_interval(&self) -> Duration {
        Duration::try_from_secs_f64(1.0 / self.spawn_rate).unwrap_or(Duration::MAX)
    }
}

// ============================================================================
// Scheduler
// ============================================================================

pub struct LoadScheduler<T> {
    transport: Arc<T>,
    config: RunConfig,
}

impl<T: Transport> LoadScheduler<T> {
    pub fn new(transport: Arc<T>, config: RunConfig) -> Result<Self> {
        config.validate()?;
        Ok(Self { transport, config })
    }

    pub fn config(&self) -> &RunConfig {
        &self.config
    }

    /// Runs until the run time elapses or `stop` fires, then waits for every
    /// session to wind down and returns the aggregated report.
    pub async fn run(self, stop: StopSignal) -> RunReport {
        let started = Instant::now();
        let config = self.config;

        let (events_tx, mut events_rx) = mpsc::unbounded_channel::<LoadEvent>();
        let aggregator = tokio::spawn(async move {
            let mut stats = RunStats::new();
            while let Some(event) = events_rx.recv().await {
                stats.observe(&event);
            }
            stats
        });

        let (run_handle, run_signal) = stop_signal();
        let timer = {
            let mut external = stop.clone();
            let run_time = config.run_time;
            let run_handle = run_handle.clone();
            tokio::spawn(async move {
                match run_time {
                    Some(limit) => {
                        tokio::select! {
                            () = tokio::time::sleep(limit) => info!("run time elapsed"),
                            () = external.stopped() => info!("stop requested"),
                        }
                    }
                    None => {
                        external.stopped().await;
                        info!("stop requested");
                    }
                }
                run_handle.stop();
            })
        };

        info!(
            users = config.users,
            spawn_rate = config.spawn_rate,
            seed = config.seed,
            "starting load run"
        );

        let sink: Arc<dyn EventSink> = Arc::new(events_tx);
        let mut root = LoadRng::new(config.seed);
        let mut sessions = JoinSet::new();
        let mut spawn_wait = run_signal.clone();
        let interval = config.spawn_interval();
        let mut spawned = 0u64;

        for id in 0..config.users {
            if run_signal.is_stopped() {
                break;
            }
            if id > 0 {
                tokio::select! {
                    () = tokio::time::sleep(interval) => {}
                    () = spawn_wait.stopped() => break,
                }
            }

            let profile = config.pick_profile(&mut root);
            let rng = root.fork();
            debug!(session = id, role = %profile.role, "spawning user");
            let session = VirtualUserSession::new(
                id,
                profile,
                Arc::clone(&self.transport),
                Arc::clone(&sink),
                rng,
            );
            sessions.spawn(session.run(run_signal.clone()));
            spawned += 1;
        }
        info!(spawned, "spawning finished");

        // Sessions hold the remaining senders; the aggregator ends with them.
        drop(sink);
        while let Some(joined) = sessions.join_next().await {
            if let Err(err) = joined {
                warn!(error = %err, "session task failed");
            }
        }
        timer.abort();

        let stats = match aggregator.await {
            Ok(stats) => stats,
            Err(err) => {
                warn!(error = %err, "statistics aggregator failed");
                RunStats::new()
            }
        };

        let report = RunReport {
            stats,
            users_spawned: spawned,
            elapsed: started.elapsed(),
            seed: config.seed,
        };
        info!(
            requests = report.stats.total_requests(),
            failures = report.stats.total_failures(),
            violations = report.stats.violations().len(),
            elapsed_ms = report.elapsed.as_millis() as u64,
            "load run finished"
        );
        report
    }
}
