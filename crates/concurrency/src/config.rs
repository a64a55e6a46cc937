//! Engine configuration
//!
//! ```toml
//! lock_policy = { kind = "spin", attempts = 8 }
//! commit_backoff = { kind = "exponential", max_spins = 128 }
//! conflict_backoff = { kind = "none" }
//! max_conflict_retries = 100
//! initial_version = 0
//! ```
//!
//! Every key is optional.

use crate::lock::LockPolicy;
use serde::{Deserialize, Serialize};
use strata_core::{Error, Result, Version};
use strata_storage::Backoff;

/// Tunables for a transaction manager
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct StmConfig {
    /// Version of the empty heap
    pub initial_version: Version,
    /// Conflict restarts `atomically` allows, `None` for unbounded
    pub max_conflict_retries: Option<u32>,
    /// Behaviour when a commit lock is held by another transaction
    pub lock_policy: LockPolicy,
    /// Pause between lost snapshot CAS attempts
    pub commit_backoff: Backoff,
    /// Pause before `atomically` re-runs a body after a conflict
    pub conflict_backoff: Backoff,
}

impl Default for StmConfig {
    fn default() -> Self {
        StmConfig {
            initial_version: 0,
            max_conflict_retries: None,
            lock_policy: LockPolicy::FailFast,
            commit_backoff: Backoff::None,
            conflict_backoff: Backoff::Exponential { max_spins: 1024 },
        }
    }
}

impl StmConfig {
    /// Parse from TOML text
    pub fn from_toml_str(text: &str) -> Result<Self> {
        let config: Self = toml::from_str(text)
            .map_err(|e| Error::Config(format!("failed to parse STM config: {}", e)))?;
        config.validate()?;
        Ok(config)
    }

    /// Render as TOML text
    pub fn to_toml_string(&self) -> Result<String> {
        toml::to_string(self)
            .map_err(|e| Error::Config(format!("failed to render STM config: {}", e)))
    }

    /// Reject inconsistent settings
    pub fn validate(&self) -> Result<()> {
        for (name, backoff) in [
            ("commit_backoff", self.commit_backoff),
            ("conflict_backoff", self.conflict_backoff),
        ] {
            if let Backoff::Exponential { max_spins: 0 } = backoff {
                return Err(Error::Config(format!("{}: max_spins must be positive", name)));
            }
        }
        Ok(())
    }
}
