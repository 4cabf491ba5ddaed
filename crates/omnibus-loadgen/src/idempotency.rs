//! Idempotency keys.
//!
//! Keys have the form `{owner}-{sequence}-{suffix}`: the owning username, a
//! per-owner counter starting at 1, and 8 random lowercase hex characters.
//! The username prefix keeps keys from different owners apart; the counter
//! keeps keys from one owner apart; the suffix keeps restarted owners apart.
//!
//! Burst transfers use the shorter `burst-{owner}-{sequence}` form.

use std::fmt;
use std::str::FromStr;

use crate::LoadRng;
use crate::error::KeyParseError;

/// Length of the random hex suffix.
pub const SUFFIX_LEN: usize = 8;

/// Prefix of burst keys.
pub const BURST_PREFIX: &str = "burst-";

/// A single idempotency key.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct IdempotencyKey {
    owner: String,
    sequence: u64,
    suffix: String,
}

impl IdempotencyKey {
    /// Username of the session that issued the key.
    pub fn owner(&self) -> &str {
        &self.owner
    }

    /// Position of this key in its owner's sequence (1-based).
    pub fn sequence(&self) -> u64 {
        self.sequence
    }

    /// Random hex suffix.
    pub fn suffix(&self) -> &str {
        &self.suffix
    }

    /// Parses a key previously produced by [`IdempotencyKeyGenerator`].
    ///
    /// The owner may itself contain `-`; the sequence and suffix are split
    /// from the right.
    pub fn parse(value: &str) -> Result<Self, KeyParseError> {
        let mut parts = value.rsplitn(3, '-');
        let (Some(suffix), Some(sequence), Some(owner)) = (parts.next(), parts.next(), parts.next())
        else {
            return Err(KeyParseError::Malformed(value.to_string()));
        };

        if owner.is_empty() {
            return Err(KeyParseError::Malformed(value.to_string()));
        }

        let sequence = match sequence.parse::<u64>() {
            Ok(n) if n > 0 => n,
            _ => return Err(KeyParseError::InvalidSequence(sequence.to_string())),
        };

        let suffix_ok = suffix.len() == SUFFIX_LEN
            && suffix
                .chars()
                .all(|c| c.is_ascii_digit() || ('a'..='f').contains(&c));
        if !suffix_ok {
            return Err(KeyParseError::InvalidSuffix(suffix.to_string()));
        }

        Ok(Self {
            owner: owner.to_string(),
            sequence,
            suffix: suffix.to_string(),
        })
    }
}

impl fmt::Display for IdempotencyKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}-{}-{}", self.owner, self.sequence, self.suffix)
    }
}

impl FromStr for IdempotencyKey {
    type Err = KeyParseError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::parse(s)
    }
}

/// Per-session generator of strictly increasing idempotency keys.
#[derive(Debug, Clone)]
pub struct IdempotencyKeyGenerator {
    owner: String,
    counter: u64,
}

impl IdempotencyKeyGenerator {
    /// Creates a generator for the given owner with its counter at 0.
    pub fn new(owner: impl Into<String>) -> Self {
        Self {
            owner: owner.into(),
            counter: 0,
        }
    }

    /// Issues the next key. The counter is incremented before use, so the
    /// first key has sequence 1.
    pub fn next_key(&mut self, rng: &mut LoadRng) -> IdempotencyKey {
        self.counter += 1;
        IdempotencyKey {
            owner: self.owner.clone(),
            sequence: self.counter,
            suffix: rng.hex(SUFFIX_LEN),
        }
    }

    /// Issues the next burst key, `burst-{owner}-{sequence}`. Draws on the
    /// same counter as [`Self::next_key`].
    pub fn next_burst_key(&mut self) -> String {
        self.counter += 1;
        format!("{BURST_PREFIX}{}-{}", self.owner, self.counter)
    }

    /// Number of keys issued so far.
    pub fn issued(&self) -> u64 {
        self.counter
    }

    pub fn owner(&self) -> &str {
        &self.owner
    }
}
