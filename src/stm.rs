//! Main entry point for stratastm.
//!
//! This module provides the `Stm` struct, a cheaply cloneable handle to one
//! transactional heap, and `StmBuilder` for configuring it.

use std::sync::Arc;
use strata_concurrency::{
    LockPolicy, StatisticsSnapshot, StmConfig, Transaction, TransactionManager,
    TransactionObserver,
};
use strata_core::{Error, Result, Transactable, TxRef, Version};
use strata_storage::Backoff;
use tracing::debug;

/// A software transactional memory instance.
///
/// Every clone shares the same heap. Create one with [`Stm::new`] or
/// [`Stm::builder`].
///
/// # Example
///
/// ```
/// use stratastm::prelude::*;
///
/// #[derive(Debug)]
/// struct Counter(i64);
///
/// impl Transactable for Counter {
///     fn dematerialize(&self) -> Fields {
///         Fields::new().int(self.0)
///     }
///
///     fn rematerialize(reader: &mut FieldReader<'_>) -> Result<Self> {
///         Ok(Counter(reader.next_int()?))
///     }
/// }
///
/// let stm = Stm::new();
/// let counter = stm.atomically(|txn| txn.attach(Counter(0)))?;
/// stm.atomically(|txn| {
///     txn.write(&counter)?.0 += 1;
///     Ok(())
/// })?;
/// assert_eq!(stm.read_at(&counter, stm.current_version())?.map(|c| c.0), Some(1));
/// # Ok::<(), stratastm::Error>(())
/// ```
#[derive(Clone)]
pub struct Stm {
    inner: Arc<TransactionManager>,
}

impl Stm {
    /// Create an instance over an empty heap with default settings.
    pub fn new() -> Self {
        Stm {
            inner: TransactionManager::new(),
        }
    }

    /// Create a builder for configuration.
    ///
    /// # Example
    ///
    /// ```
    /// use stratastm::{LockPolicy, Stm};
    ///
    /// let stm = Stm::builder()
    ///     .lock_policy(LockPolicy::Spin { attempts: 16 })
    ///     .max_conflict_retries(10)
    ///     .build()?;
    /// assert_eq!(stm.current_version(), 0);
    /// # Ok::<(), stratastm::Error>(())
    /// ```
    pub fn builder() -> StmBuilder {
        StmBuilder::new()
    }

    /// Create an instance from a TOML configuration document.
    pub fn from_toml(text: &str) -> Result<Self> {
        StmBuilder::new().config(StmConfig::from_toml_str(text)?).build()
    }

    /// Start a transaction on the newest snapshot.
    pub fn begin(&self) -> Transaction {
        self.inner.begin()
    }

    /// Start a transaction on the snapshot that was current at `version`.
    pub fn begin_at(&self, version: Version) -> Result<Transaction> {
        self.inner.begin_at(version)
    }

    /// Run `body` until it commits. See [`TransactionManager::atomically`].
    pub fn atomically<R, F>(&self, body: F) -> Result<R>
    where
        F: FnMut(&mut Transaction) -> Result<R>,
    {
        self.inner.atomically(body)
    }

    /// Version of the newest snapshot.
    pub fn current_version(&self) -> Version {
        self.inner.current_version()
    }

    /// Copy of the object behind `r` as of `version`.
    ///
    /// Returns `Ok(None)` if it had not been committed yet at that version.
    pub fn read_at<T: Transactable>(&self, r: &TxRef<T>, version: Version) -> Result<Option<T>> {
        if version > self.current_version() {
            return Err(Error::InvalidOperation(format!(
                "version {} is newer than the heap",
                version
            )));
        }
        self.inner
            .heap()
            .read_at(r.handle(), version)?
            .map(|record| record.rematerialize_as::<T>())
            .transpose()
    }

    /// Get transaction counters.
    pub fn statistics(&self) -> StatisticsSnapshot {
        self.inner.statistics()
    }

    /// Start version of the oldest running transaction.
    pub fn oldest_live_version(&self) -> Option<Version> {
        self.inner.oldest_live_version()
    }

    /// Number of running transactions.
    pub fn live_transactions(&self) -> usize {
        self.inner.live_transactions()
    }

    /// Settings this instance was built with.
    pub fn config(&self) -> &StmConfig {
        self.inner.config()
    }

    /// The underlying transaction manager.
    pub fn manager(&self) -> &Arc<TransactionManager> {
        &self.inner
    }
}

impl Default for Stm {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Debug for Stm {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Stm")
            .field("version", &self.current_version())
            .field("live_transactions", &self.live_transactions())
            .finish()
    }
}

/// Builder for [`Stm`] configuration.
///
/// # Example
///
/// ```
/// use stratastm::{Backoff, Stm};
///
/// let stm = Stm::builder()
///     .initial_version(100)
///     .commit_backoff(Backoff::Exponential { max_spins: 64 })
///     .build()?;
/// assert_eq!(stm.current_version(), 100);
/// # Ok::<(), stratastm::Error>(())
/// ```
#[derive(Default)]
pub struct StmBuilder {
    config: StmConfig,
    observer: Option<Arc<dyn TransactionObserver>>,
}

impl StmBuilder {
    /// Create a builder with default settings.
    pub fn new() -> Self {
        Self::default()
    }

    /// Replace every setting at once.
    pub fn config(mut self, config: StmConfig) -> Self {
        self.config = config;
        self
    }

    /// Behaviour when a commit lock is held by another transaction.
    pub fn lock_policy(mut self, policy: LockPolicy) -> Self {
        self.config.lock_policy = policy;
        self
    }

    /// Pause between lost snapshot CAS attempts.
    pub fn commit_backoff(mut self, backoff: Backoff) -> Self {
        self.config.commit_backoff = backoff;
        self
    }

    /// Pause before `atomically` re-runs a conflicting body.
    pub fn conflict_backoff(mut self, backoff: Backoff) -> Self {
        self.config.conflict_backoff = backoff;
        self
    }

    /// Bound the conflict restarts of `atomically`.
    pub fn max_conflict_retries(mut self, max: u32) -> Self {
        self.config.max_conflict_retries = Some(max);
        self
    }

    /// Version of the empty heap.
    pub fn initial_version(mut self, version: Version) -> Self {
        self.config.initial_version = version;
        self
    }

    /// Install a lifecycle observer.
    pub fn observer(mut self, observer: Arc<dyn TransactionObserver>) -> Self {
        self.observer = Some(observer);
        self
    }

    /// Validate the settings and create the instance.
    pub fn build(self) -> Result<Stm> {
        self.config.validate()?;
        debug!(config = ?self.config, "Creating STM instance");
        let inner = match self.observer {
            Some(observer) => TransactionManager::with_config(self.config, observer),
            None => TransactionManager::with_config(
                self.config,
                Arc::new(strata_concurrency::NoopObserver),
            ),
        };
        Ok(Stm { inner })
    }
}

impl std::fmt::Debug for StmBuilder {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("StmBuilder")
            .field("config", &self.config)
            .field("observer", &self.observer.is_some())
            .finish()
    }
}
