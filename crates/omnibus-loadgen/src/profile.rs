//! Session profiles: everything that distinguishes one kind of virtual user
//! from another.
//!
//! A profile is passed to each session at construction, so several roles
//! with different weights and pacing can run side by side in one run.

use std::fmt;
use std::str::FromStr;
use std::time::Duration;

use rust_decimal::{Decimal, RoundingStrategy};
use serde::{Deserialize, Serialize};

use crate::error::{LoadgenError, Result};
use crate::identity::IdentityTemplate;
use crate::LoadRng;

/// Built-in virtual-user roles.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum Role {
    /// Mixed read/write traffic: transfers, balance checks, listings.
    Payment,
    /// Repeats one transfer under one key and checks exactly-once creation.
    Idempotency,
    /// Minimal-amount transfers with almost no think time.
    Burst,
}

impl Role {
    pub const ALL: [Role; 3] = [Role::Payment, Role::Idempotency, Role::Burst];

    pub fn as_str(self) -> &'static str {
        match self {
            Role::Payment => "payment",
            Role::Idempotency => "idempotency",
            Role::Burst => "burst",
        }
    }
}

impl fmt::Display for Role {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Role {
    type Err = LoadgenError;

    fn from_str(s: &str) -> Result<Self> {
        match s.trim().to_ascii_lowercase().as_str() {
            "payment" => Ok(Role::Payment),
            "idempotency" => Ok(Role::Idempotency),
            "burst" => Ok(Role::Burst),
            other => Err(LoadgenError::InvalidRun(format!("unknown role '{other}'"))),
        }
    }
}

/// Tasks a session can be asked to perform.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum TaskKind {
    Transfer,
    CheckBalance,
    ListAccounts,
    ReplayTransfer,
    BurstTransfer,
}

impl TaskKind {
    pub fn as_str(self) -> &'static str {
        match self {
            TaskKind::Transfer => "transfer",
            TaskKind::CheckBalance => "check-balance",
            TaskKind::ListAccounts => "list-accounts",
            TaskKind::ReplayTransfer => "replay-transfer",
            TaskKind::BurstTransfer => "burst-transfer",
        }
    }

    /// Whether the task needs the session's own account id.
    pub fn needs_account(self) -> bool {
        !matches!(self, TaskKind::ListAccounts)
    }
}

impl fmt::Display for TaskKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for TaskKind {
    type Err = LoadgenError;

    fn from_str(s: &str) -> Result<Self> {
        match s.trim().to_ascii_lowercase().replace('_', "-").as_str() {
            "transfer" => Ok(TaskKind::Transfer),
            "check-balance" => Ok(TaskKind::CheckBalance),
            "list-accounts" => Ok(TaskKind::ListAccounts),
            "replay-transfer" => Ok(TaskKind::ReplayTransfer),
            "burst-transfer" => Ok(TaskKind::BurstTransfer),
            other => Err(LoadgenError::InvalidRun(format!("unknown task '{other}'"))),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct TaskWeight {
    pub task: TaskKind,
    pub weight: u32,
}

impl TaskWeight {
    pub fn new(task: TaskKind, weight: u32) -> Self {
        Self { task, weight }
    }
}

/// How transfer amounts are drawn.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case", tag = "kind")]
pub enum AmountPolicy {
    /// Uniform over `(min, max]` in steps of `10^-scale`.
    Uniform { min: Decimal, max: Decimal, scale: u32 },
    /// Always the same amount.
    Fixed { amount: Decimal },
}

impl AmountPolicy {
    /// Largest fractional precision the gateway accepts.
    pub const MAX_SCALE: u32 = 4;

    pub fn validate(&self) -> std::result::Result<(), String> {
        match *self {
            AmountPolicy::Uniform { min, max, scale } => {
                if scale > Self::MAX_SCALE {
                    return Err(format!("amount scale {scale} exceeds {}", Self::MAX_SCALE));
                }
                if min.is_sign_negative() {
                    return Err(format!("amount minimum {min} is negative"));
                }
                if max <= min {
                    return Err(format!("amount range ({min}, {max}] is empty"));
                }
                if to_units(max, scale) <= to_units(min, scale) {
                    return Err(format!(
                        "amount range ({min}, {max}] holds no value at scale {scale}"
                    ));
                }
                Ok(())
            }
            AmountPolicy::Fixed { amount } => {
                if amount <= Decimal::ZERO {
                    return Err(format!("fixed amount {amount} must be positive"));
                }
                Ok(())
            }
        }
    }

    /// Draws an amount. Always strictly positive for a valid policy.
    pub fn draw(&self, rng: &mut LoadRng) -> Decimal {
        match *self {
            AmountPolicy::Uniform { min, max, scale } => {
                let low = to_units(min, scale).saturating_add(1);
                let high = to_units(max, scale);
                let units = rng.range_inclusive(low, high.max(low));
                Decimal::new(i64::try_from(units).unwrap_or(i64::MAX), scale)
            }
            AmountPolicy::Fixed { amount } => amount,
        }
    }
}

/// Converts a decimal to an integer count of `10^-scale` units, rounding down.
fn to_units(value: Decimal, scale: u32) -> u64 {
    let mut truncated = value.round_dp_with_strategy(scale, RoundingStrategy::ToZero);
    truncated.rescale(scale);
    u64::try_from(truncated.mantissa()).unwrap_or(0)
}

/// Static configuration of one virtual-user role.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SessionProfile {
    pub role: Role,
    /// Credentials the virtual user registers with.
    pub identity: IdentityTemplate,
    /// Credentials minted for provisioned peers.
    pub peer_identity: IdentityTemplate,
    pub tasks: Vec<TaskWeight>,
    pub think_time_min: Duration,
    pub think_time_max: Duration,
    pub amount: AmountPolicy,
    pub currency: String,
    /// Probability of reusing an existing peer instead of provisioning one.
    pub peer_reuse_probability: f64,
    /// Provision one peer during start-up, right after the own account.
    pub provision_peer_on_start: bool,
    /// Identical submissions per replay verification.
    pub replay_attempts: u32,
    /// Relative share of spawned users that get this profile.
    pub class_weight: u32,
}

impl SessionProfile {
    /// Transfers, balance checks and listings at 6:3:1.
    pub fn payment() -> Self {
        Self {
            role: Role::Payment,
            identity: IdentityTemplate::new("load", "L0adP@ss!2026"),
            peer_identity: IdentityTemplate::new("peer", "P33rP@ss!2026"),
            tasks: vec![
                TaskWeight::new(TaskKind::Transfer, 6),
                TaskWeight::new(TaskKind::CheckBalance, 3),
                TaskWeight::new(TaskKind::ListAccounts, 1),
            ],
            think_time_min: Duration::from_millis(500),
            think_time_max: Duration::from_millis(2000),
            amount: AmountPolicy::Uniform {
                min: Decimal::new(1, 2),
                max: Decimal::new(5000, 2),
                scale: 4,
            },
            currency: "USD".to_string(),
            peer_reuse_probability: 0.8,
            provision_peer_on_start: false,
            replay_attempts: 5,
            class_weight: 1,
        }
    }

    /// Replay verification only.
    pub fn idempotency() -> Self {
        Self {
            role: Role::Idempotency,
            identity: IdentityTemplate::new("idem", "Id3mP@ss!2026"),
            peer_identity: IdentityTemplate::new("idempeer", "Id3mP33r!2026"),
            tasks: vec![TaskWeight::new(TaskKind::ReplayTransfer, 1)],
            think_time_min: Duration::from_secs(1),
            think_time_max: Duration::from_secs(3),
            amount: AmountPolicy::Uniform {
                min: Decimal::new(100, 2),
                max: Decimal::new(1000, 2),
                scale: 2,
            },
            currency: "USD".to_string(),
            peer_reuse_probability: 0.8,
            provision_peer_on_start: true,
            replay_attempts: 5,
            class_weight: 1,
        }
    }

    /// Minimal transfers as fast as the gateway answers.
    pub fn burst() -> Self {
        Self {
            role: Role::Burst,
            identity: IdentityTemplate::new("burst", "Bur5tP@ss!2026"),
            peer_identity: IdentityTemplate::new("bpeer", "Bur5tP33r!2026"),
            tasks: vec![TaskWeight::new(TaskKind::BurstTransfer, 1)],
            think_time_min: Duration::ZERO,
            think_time_max: Duration::from_millis(100),
            amount: AmountPolicy::Fixed {
                amount: Decimal::new(1, 2),
            },
            currency: "USD".to_string(),
            peer_reuse_probability: 0.8,
            provision_peer_on_start: true,
            replay_attempts: 5,
            class_weight: 1,
        }
    }

    /// Built-in profile for a role.
    pub fn builtin(role: Role) -> Self {
        match role {
            Role::Payment => Self::payment(),
            Role::Idempotency => Self::idempotency(),
            Role::Burst => Self::burst(),
        }
    }

    /// Checks that the profile can drive a session.
    pub fn validate(&self) -> Result<()> {
        let fail = |reason: String| Err(LoadgenError::invalid_profile(self.role.as_str(), reason));

        if self.total_weight() == 0 {
            return fail("task weights sum to zero".to_string());
        }
        if self.think_time_min > self.think_time_max {
            return fail(format!(
                "think time minimum {:?} exceeds maximum {:?}",
                self.think_time_min, self.think_time_max
            ));
        }
        if !(0.0..=1.0).contains(&self.peer_reuse_probability) {
            return fail(format!(
                "peer reuse probability {} outside [0, 1]",
                self.peer_reuse_probability
            ));
        }
        if self.currency.len() != 3 || !self.currency.chars().all(|c| c.is_ascii_uppercase()) {
            return fail(format!("currency '{}' is not an ISO 4217 code", self.currency));
        }
        if self.identity.prefix == self.peer_identity.prefix {
            return fail("user and peer prefixes must differ".to_string());
        }
        if self.replay_attempts == 0 && self.has_task(TaskKind::ReplayTransfer) {
            return fail("replay attempts must be at least 1".to_string());
        }
        if let Err(reason) = self.amount.validate() {
            return fail(reason);
        }
        Ok(())
    }

    pub fn total_weight(&self) -> u64 {
        self.tasks.iter().map(|t| u64::from(t.weight)).sum()
    }

    pub fn has_task(&self, task: TaskKind) -> bool {
        self.tasks.iter().any(|t| t.task == task && t.weight > 0)
    }

    /// Picks a task with probability proportional to its weight.
    ///
    /// Falls back to the first task if every weight is zero, which
    /// [`SessionProfile::validate`] rejects.
    pub fn choose_task(&self, rng: &mut LoadRng) -> TaskKind {
        let total = self.total_weight();
        if total == 0 {
            return self.tasks.first().map_or(TaskKind::ListAccounts, |t| t.task);
        }
        let mut ticket = rng.range_inclusive(0, total - 1);
        for entry in &self.tasks {
            let weight = u64::from(entry.weight);
            if ticket < weight {
                return entry.task;
            }
            ticket -= weight;
        }
        self.tasks[self.tasks.len() - 1].task
    }

    /// Draws the pause before the next task.
    pub fn think_time(&self, rng: &mut LoadRng) -> Duration {
        rng.duration_between(self.think_time_min, self.think_time_max)
    }
}
