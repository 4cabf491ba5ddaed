//! Full load test run.

use std::fs;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

use anyhow::{Context, Result, bail};
use clap::Args;
use omnibus_loadgen::{LoadScheduler, RunConfig, RunReport, SimGateway, Transport, stop_signal};
use omnibus_loadgen_config::LoadgenConfig;
use tracing::info;

use crate::http::ReqwestTransport;
use crate::profiles;
use crate::style::{print_report, print_success, print_warn};

#[derive(Debug, Args)]
pub struct RunArgs {
    /// Gateway base URL.
    #[arg(long)]
    pub host: Option<String>,

    /// Virtual users to spawn.
    #[arg(short, long)]
    pub users: Option<u32>,

    /// Users started per second.
    #[arg(short = 'r', long)]
    pub spawn_rate: Option<f64>,

    /// Stop after this many seconds (0 runs until Ctrl-C).
    #[arg(short = 't', long)]
    pub run_time: Option<u64>,

    /// Root seed for every random decision.
    #[arg(long)]
    pub seed: Option<u64>,

    /// Roles to mix, comma separated (payment, idempotency, burst).
    #[arg(long, value_delimiter = ',')]
    pub roles: Option<Vec<String>>,

    /// Use the in-memory gateway instead of the network.
    #[arg(long)]
    pub simulate: bool,

    /// Also write the report as JSON to this path.
    #[arg(long)]
    pub report_json: Option<PathBuf>,
}

impl RunArgs {
    /// CLI flags take precedence over every configuration source.
    fn apply(&self, config: &mut LoadgenConfig) {
        if let Some(host) = &self.host {
            config.target.host.clone_from(host);
        }
        if let Some(users) = self.users {
            config.run.users = users;
        }
        if let Some(rate) = self.spawn_rate {
            config.run.spawn_rate = rate;
        }
        if let Some(secs) = self.run_time {
            config.run.run_time_secs = secs;
        }
        if let Some(seed) = self.seed {
            config.run.seed = Some(seed);
        }
        if let Some(roles) = &self.roles {
            config.run.roles = roles.iter().map(|r| r.trim().to_ascii_lowercase()).collect();
        }
    }
}

pub async fn run(project_dir: Option<&Path>, args: RunArgs) -> Result<()> {
    let mut config = super::load_config(project_dir)?;
    args.apply(&mut config);
    config.validate().context("Invalid run settings")?;

    let run_config = profiles::run_config(&config)?;
    let host = if args.simulate { "simulated" } else { config.target.host.as_str() };
    info!(
        host,
        users = run_config.users,
        spawn_rate = run_config.spawn_rate,
        seed = run_config.seed,
        roles = ?config.run.roles,
        "starting run"
    );

    let report = if args.simulate {
        execute(Arc::new(SimGateway::new()), run_config).await?
    } else {
        let transport = ReqwestTransport::new(
            &config.target.host,
            Duration::from_secs(config.target.timeout_secs),
        )?;
        execute(Arc::new(transport), run_config).await?
    };

    let summary = report.summary();
    print_report(&summary);

    if let Some(path) = &args.report_json {
        let json = serde_json::to_string_pretty(&summary)?;
        fs::write(path, json)
            .with_context(|| format!("Failed to write report to {}", path.display()))?;
        print_success(&format!("Report written to {}", path.display()));
    }

    if !summary.passed {
        bail!(
            "run recorded {} exactly-once violation(s)",
            summary.violations.len()
        );
    }
    Ok(())
}

/// Runs the scheduler until its run time expires or Ctrl-C is pressed.
async fn execute<T: Transport>(transport: Arc<T>, config: RunConfig) -> Result<RunReport> {
    let scheduler = LoadScheduler::new(transport, config)?;
    let (handle, signal) = stop_signal();

    let interrupt = tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            print_warn("Interrupted, waiting for in-flight requests");
            handle.stop();
        }
    });

    let report = scheduler.run(signal).await;
    interrupt.abort();
    Ok(report)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn args() -> RunArgs {
        RunArgs {
            host: None,
            users: None,
            spawn_rate: None,
            run_time: None,
            seed: None,
            roles: None,
            simulate: false,
            report_json: None,
        }
    }

    #[test]
    fn unset_flags_keep_configuration() {
        let mut config = LoadgenConfig::default();
        config.run.users = 42;
        args().apply(&mut config);
        assert_eq!(config.run.users, 42);
        assert_eq!(config, {
            let mut expected = LoadgenConfig::default();
            expected.run.users = 42;
            expected
        });
    }

    #[test]
    fn flags_override_configuration() {
        let mut config = LoadgenConfig::default();
        let mut flags = args();
        flags.host = Some("http://10.1.1.1:8080".to_string());
        flags.users = Some(3);
        flags.run_time = Some(0);
        flags.roles = Some(vec!["Burst".to_string(), " payment".to_string()]);
        flags.apply(&mut config);

        assert_eq!(config.target.host, "http://10.1.1.1:8080");
        assert_eq!(config.run.users, 3);
        assert_eq!(config.run.run_time_secs, 0);
        assert_eq!(config.run.roles, vec!["burst", "payment"]);
    }

    #[tokio::test(start_paused = true)]
    async fn simulated_run_passes() {
        let mut config = LoadgenConfig::default();
        config.run.users = 6;
        config.run.spawn_rate = 6.0;
        config.run.run_time_secs = 10;
        config.run.seed = Some(3);

        let run_config = profiles::run_config(&config).unwrap();
        let report = execute(Arc::new(SimGateway::new()), run_config).await.unwrap();
        assert!(report.passed());
        assert_eq!(report.users_spawned, 6);
        assert!(report.stats.total_requests() > 0);
    }
}
