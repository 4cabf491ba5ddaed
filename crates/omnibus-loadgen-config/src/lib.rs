//! Configuration management for the Omnibus load generator
//!
//! Provides hierarchical configuration loading from multiple sources:
//! 1. CLI arguments (highest precedence)
//! 2. Environment variables (OLG_* prefix, `__` between nested keys)
//! 3. loadgen.local.toml (gitignored, local overrides)
//! 4. loadgen.toml (git-tracked, project config)
//! 5. ~/.config/omnibus-loadgen/config.toml (user defaults)
//! 6. Built-in defaults (lowest precedence)
//!
//! Role sections only carry overrides. Anything left unset keeps the
//! built-in profile of that role.

use anyhow::Result;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::path::Path;
use std::time::Duration;

mod error;
mod loader;
mod paths;

pub use error::ConfigError;
pub use loader::{ConfigLoader, ENV_PREFIX};
pub use paths::{LOCAL_CONFIG_FILE, PROJECT_CONFIG_FILE, Paths};

/// Role names accepted in `run.roles` and `[roles.*]`.
pub const KNOWN_ROLES: [&str; 3] = ["payment", "idempotency", "burst"];

/// Task names accepted as keys of `[roles.<role>.tasks]`.
pub const KNOWN_TASKS: [&str; 5] = [
    "transfer",
    "check-balance",
    "list-accounts",
    "replay-transfer",
    "burst-transfer",
];

/// Main load generator configuration
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct LoadgenConfig {
    pub target: TargetConfig,
    pub run: RunSettings,
    pub roles: RolesConfig,
}

/// Gateway under test.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct TargetConfig {
    pub host: String,
    pub timeout_secs: u64,
}

impl Default for TargetConfig {
    fn default() -> Self {
        Self {
            host: "http://localhost:8080".to_string(),
            timeout_secs: 30,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct RunSettings {
    pub users: u32,
    /// Users started per second.
    pub spawn_rate: f64,
    /// Wall-clock limit. Zero runs until interrupted.
    pub run_time_secs: u64,
    /// Root seed. A fresh one is drawn when unset.
    pub seed: Option<u64>,
    /// Roles mixed into the run.
    pub roles: Vec<String>,
}

impl Default for RunSettings {
    fn default() -> Self {
        Self {
            users: 10,
            spawn_rate: 1.0,
            run_time_secs: 60,
            seed: None,
            roles: KNOWN_ROLES.iter().map(|r| (*r).to_string()).collect(),
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct RolesConfig {
    pub payment: RoleSettings,
    pub idempotency: RoleSettings,
    pub burst: RoleSettings,
}

impl RolesConfig {
    /// Settings for a role by name.
    pub fn get(&self, role: &str) -> Option<&RoleSettings> {
        match role {
            "payment" => Some(&self.payment),
            "idempotency" => Some(&self.idempotency),
            "burst" => Some(&self.burst),
            _ => None,
        }
    }
}

/// Per-role overrides on top of the built-in profile.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct RoleSettings {
    pub class_weight: u32,
    pub think_time_min_ms: Option<u64>,
    pub think_time_max_ms: Option<u64>,
    pub peer_reuse_probability: Option<f64>,
    pub replay_attempts: Option<u32>,
    pub currency: Option<String>,
    /// Task weights by task name. Empty keeps the built-in mix.
    pub tasks: BTreeMap<String, u32>,
}

impl Default for RoleSettings {
    fn default() -> Self {
        Self {
            class_weight: 1,
            think_time_min_ms: None,
            think_time_max_ms: None,
            peer_reuse_probability: None,
            replay_attempts: None,
            currency: None,
            tasks: BTreeMap::new(),
        }
    }
}

impl RoleSettings {
    fn validate(&self, role: &str) -> Result<(), ConfigError> {
        let fail = |reason: String| Err(ConfigError::ValidationError(format!("roles.{role}: {reason}")));

        if let (Some(min), Some(max)) = (self.think_time_min_ms, self.think_time_max_ms) {
            if min > max {
                return fail(format!("think_time_min_ms {min} exceeds think_time_max_ms {max}"));
            }
        }
        if let Some(p) = self.peer_reuse_probability {
            if !(0.0..=1.0).contains(&p) {
                return fail(format!("peer_reuse_probability {p} outside [0, 1]"));
            }
        }
        if self.replay_attempts == Some(0) {
            return fail("replay_attempts must be at least 1".to_string());
        }
        for task in self.tasks.keys() {
            if !KNOWN_TASKS.contains(&task.as_str()) {
                return fail(format!("unknown task '{task}'"));
            }
        }
        if !self.tasks.is_empty() && self.tasks.values().all(|w| *w == 0) {
            return fail("task weights sum to zero".to_string());
        }
        Ok(())
    }
}

impl LoadgenConfig {
    /// Load configuration from all sources
    pub fn load() -> Result<Self> {
        ConfigLoader::new().load()
    }

    /// Load configuration from a specific directory
    pub fn load_from_dir(project_dir: impl AsRef<Path>) -> Result<Self> {
        ConfigLoader::new().with_project_dir(project_dir).load()
    }

    /// Checks values the type system cannot.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.target.host.trim().is_empty() {
            return Err(ConfigError::ValidationError("target.host is empty".to_string()));
        }
        if self.target.timeout_secs == 0 {
            return Err(ConfigError::ValidationError(
                "target.timeout_secs must be positive".to_string(),
            ));
        }
        if !(self.run.spawn_rate.is_finite() && self.run.spawn_rate > 0.0) {
            return Err(ConfigError::ValidationError(format!(
                "run.spawn_rate {} must be positive",
                self.run.spawn_rate
            )));
        }
        if Duration::try_from_secs_f64(1.0 / self.run.spawn_rate).is_err() {
            return Err(ConfigError::ValidationError(format!(
                "run.spawn_rate {} is too small to schedule",
                self.run.spawn_rate
            )));
        }
        if self.run.roles.is_empty() {
            return Err(ConfigError::ValidationError("run.roles is empty".to_string()));
        }

        let mut weight = 0u64;
        for role in &self.run.roles {
            let settings = self.roles.get(role).ok_or_else(|| {
                ConfigError::ValidationError(format!("unknown role '{role}' in run.roles"))
            })?;
            settings.validate(role)?;
            weight += u64::from(settings.class_weight);
        }
        if weight == 0 {
            return Err(ConfigError::ValidationError(
                "every selected role has class_weight 0".to_string(),
            ));
        }
        Ok(())
    }

    /// Renders the effective configuration as TOML.
    pub fn to_toml(&self) -> Result<String, ConfigError> {
        Ok(toml::to_string_pretty(self)?)
    }
}
