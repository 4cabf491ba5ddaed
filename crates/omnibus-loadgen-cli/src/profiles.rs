//! Converts loaded configuration into core run settings.

use std::sync::Arc;
use std::time::Duration;

use anyhow::{Context, Result};
use omnibus_loadgen::{
    LoadRng, LoadgenError, Role, RunConfig, SessionProfile, TaskKind, TaskWeight,
};
use omnibus_loadgen_config::{LoadgenConfig, RoleSettings};

/// Applies a role section on top of the role's built-in profile.
pub fn session_profile(
    role: Role,
    settings: &RoleSettings,
) -> omnibus_loadgen::Result<SessionProfile> {
    let mut profile = SessionProfile::builtin(role);
    profile.class_weight = settings.class_weight;

    if let Some(ms) = settings.think_time_min_ms {
        profile.think_time_min = Duration::from_millis(ms);
    }
    if let Some(ms) = settings.think_time_max_ms {
        profile.think_time_max = Duration::from_millis(ms);
    }
    if let Some(p) = settings.peer_reuse_probability {
        profile.peer_reuse_probability = p;
    }
    if let Some(attempts) = settings.replay_attempts {
        profile.replay_attempts = attempts;
    }
    if let Some(currency) = &settings.currency {
        profile.currency.clone_from(currency);
    }
    if !settings.tasks.is_empty() {
        profile.tasks = settings
            .tasks
            .iter()
            .map(|(name, weight)| -> omnibus_loadgen::Result<TaskWeight> {
                let task = name
                    .parse::<TaskKind>()
                    .map_err(|e| LoadgenError::invalid_profile(role.as_str(), e.to_string()))?;
                Ok(TaskWeight::new(task, *weight))
            })
            .collect::<omnibus_loadgen::Result<Vec<_>>>()?;
    }

    profile.validate()?;
    Ok(profile)
}

/// Profile for one role as configured.
pub fn profile_for(config: &LoadgenConfig, role: Role) -> Result<SessionProfile> {
    let settings = config
        .roles
        .get(role.as_str())
        .with_context(|| format!("no settings for role '{role}'"))?;
    session_profile(role, settings).with_context(|| format!("invalid [roles.{role}] section"))
}

/// Builds the scheduler configuration. A missing seed is drawn from entropy.
pub fn run_config(config: &LoadgenConfig) -> Result<RunConfig> {
    let profiles = config
        .run
        .roles
        .iter()
        .map(|name| -> Result<Arc<SessionProfile>> {
            let role: Role = name.parse()?;
            profile_for(config, role).map(Arc::new)
        })
        .collect::<Result<Vec<_>>>()?;

    let run_config = RunConfig {
        users: u64::from(config.run.users),
        spawn_rate: config.run.spawn_rate,
        run_time: match config.run.run_time_secs {
            0 => None,
            secs => Some(Duration::from_secs(secs)),
        },
        seed: config.run.seed.unwrap_or_else(|| LoadRng::from_entropy().seed()),
        profiles,
    };
    run_config.validate().context("invalid run settings")?;
    Ok(run_config)
}
