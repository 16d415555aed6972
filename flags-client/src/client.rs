use std::sync::{Arc, RwLock, RwLockReadGuard, RwLockWriteGuard};
use std::time::Duration;

use tokio::sync::watch;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};
use uuid::Uuid;

use crate::api::{FlagError, SecretMenuConfig, ServerResponse};
use crate::config::Config;
use crate::fetch::{FetchOutcome, Fetcher};
use crate::flag_models::{Flag, FlagDetails, FlagSet};
use crate::overrides::{FileOverrideStore, FlagOverride, OverrideSet, OverrideStore};
use crate::reconcile::{compute_effective, should_publish};

/// Retry period used before the first successful response has supplied a
/// server-dictated interval.
pub const INITIAL_REFRESH_INTERVAL: Duration = Duration::from_secs(60);

struct FlagState {
    /// Server-driven flags as last applied; overrides are not folded in.
    flags: FlagSet,
    /// In-memory mirror of the persisted override set.
    overrides: OverrideSet,
    /// Derived view. The `Arc` is swapped only when an input changed, so
    /// consumers can use pointer equality to skip downstream work.
    effective: Arc<FlagSet>,
    refresh_interval: Duration,
    secret_menu: SecretMenuConfig,
}

struct ClientInner {
    config: Config,
    state: RwLock<FlagState>,
    store: Arc<dyn OverrideStore>,
    updates: watch::Sender<Arc<FlagSet>>,
    cancel: CancellationToken,
}

impl ClientInner {
    fn read_state(&self) -> RwLockReadGuard<'_, FlagState> {
        match self.state.read() {
            Ok(guard) => guard,
            Err(poisoned) => poisoned.into_inner(),
        }
    }

    fn write_state(&self) -> RwLockWriteGuard<'_, FlagState> {
        match self.state.write() {
            Ok(guard) => guard,
            Err(poisoned) => poisoned.into_inner(),
        }
    }

    /// Recomputes the effective view and notifies subscribers. Only called
    /// after an input actually changed.
    fn republish(&self, state: &mut FlagState) {
        state.effective = Arc::new(compute_effective(&state.flags, &state.overrides));
        self.updates.send_replace(state.effective.clone());
    }

    fn apply_outcome(&self, outcome: FetchOutcome) {
        match outcome {
            FetchOutcome::Fetched(response) => self.apply_response(response),
            FetchOutcome::ServedFromCache(flags) => self.apply_flags(flags),
            FetchOutcome::Unchanged | FetchOutcome::Skipped | FetchOutcome::Failed => {}
        }
    }

    /// Interval and overlay parameters move on every success; the flag set
    /// is only republished when a server-driven value actually changed.
    fn apply_response(&self, response: ServerResponse) {
        let mut state = self.write_state();
        state.refresh_interval = Duration::from_secs(response.interval_allowed);
        state.secret_menu = response.secret_menu;
        if should_publish(&state.flags, &response.flags) {
            state.flags = response.flags;
            self.republish(&mut state);
        }
    }

    fn apply_flags(&self, flags: FlagSet) {
        let mut state = self.write_state();
        if should_publish(&state.flags, &flags) {
            state.flags = flags;
            self.republish(&mut state);
        }
    }

    fn toggle(&self, name: &str) {
        let mut state = self.write_state();
        let current = state
            .overrides
            .get(name)
            .map(|ov| ov.enabled)
            .or_else(|| state.flags.get(name).map(|flag| flag.enabled))
            .unwrap_or(false);
        let next = !current;
        match self.store.set(name, next) {
            // The store merged against the latest persisted state; adopt
            // its view wholesale so concurrent writers converge.
            Ok(persisted) => state.overrides = persisted,
            Err(err) => {
                warn!(
                    error = %err,
                    flag = name,
                    store = %self.store.report_location(),
                    "failed to persist override, keeping it in memory"
                );
                state
                    .overrides
                    .insert(name.to_string(), FlagOverride { enabled: next });
            }
        }
        self.republish(&mut state);
    }

    fn reset_flags(&self) {
        if let Err(err) = self.store.reset_all() {
            warn!(
                error = %err,
                store = %self.store.report_location(),
                "failed to reset persisted overrides"
            );
        }
        let mut state = self.write_state();
        if state.overrides.is_empty() {
            return;
        }
        state.overrides.clear();
        self.republish(&mut state);
    }

    fn initialize(&self, name: &str, default_value: bool) {
        let mut state = self.write_state();
        if state.flags.contains_key(name) {
            return;
        }
        let flag = Flag::new(name, Uuid::new_v4().simple().to_string(), default_value);
        state.flags.insert(name.to_string(), flag);
        self.republish(&mut state);
    }
}

/// The flag engine: owns the applied state, the override store, the fetch
/// scheduler, and the read/toggle surface handed to application code.
///
/// Cheap to clone; clones share one state. Created once at the application
/// root and torn down with [`FlagsClient::shutdown`].
#[derive(Clone)]
pub struct FlagsClient {
    inner: Arc<ClientInner>,
    fetcher: Arc<tokio::sync::Mutex<Fetcher>>,
}

impl FlagsClient {
    /// Client with the default file-backed override store.
    pub fn new(config: Config) -> Result<FlagsClient, FlagError> {
        FlagsClient::with_store(config, Arc::new(FileOverrideStore::new()))
    }

    pub fn with_store(
        config: Config,
        store: Arc<dyn OverrideStore>,
    ) -> Result<FlagsClient, FlagError> {
        let fetcher = Fetcher::new(config.clone())?;

        // Persisted overrides apply from the first read, before any fetch
        // completes. A store failure reads as empty, never as a crash.
        let overrides = match store.load() {
            Ok(set) => set,
            Err(err) => {
                warn!(
                    error = %err,
                    store = %store.report_location(),
                    "failed to load persisted overrides, starting empty"
                );
                OverrideSet::new()
            }
        };

        let effective = Arc::new(FlagSet::new());
        let (updates, seed_rx) = watch::channel(effective.clone());
        drop(seed_rx);

        let state = FlagState {
            flags: FlagSet::new(),
            overrides,
            effective,
            refresh_interval: INITIAL_REFRESH_INTERVAL,
            secret_menu: SecretMenuConfig::default(),
        };

        Ok(FlagsClient {
            inner: Arc::new(ClientInner {
                config,
                state: RwLock::new(state),
                store,
                updates,
                cancel: CancellationToken::new(),
            }),
            fetcher: Arc::new(tokio::sync::Mutex::new(fetcher)),
        })
    }

    /// The refresh loop: one initial fetch on activation, then a repeating
    /// timer at the current refresh interval. A changed interval governs the
    /// next scheduling decision, not a sleep already in flight.
    ///
    /// Runs until [`FlagsClient::shutdown`] cancels it; no failure inside a
    /// cycle breaks the loop. A response that races cancellation is
    /// discarded, not applied.
    pub async fn run_refresh_loop(&self) {
        let mut fetcher = self.fetcher.lock().await;
        let cancel = self.inner.cancel.clone();
        loop {
            let applied = self.inner.read_state().flags.clone();
            let outcome = tokio::select! {
                _ = cancel.cancelled() => break,
                outcome = fetcher.fetch_once(&applied) => outcome,
            };
            if cancel.is_cancelled() {
                break;
            }
            self.inner.apply_outcome(outcome);

            let interval = self.refresh_interval();
            tokio::select! {
                _ = cancel.cancelled() => break,
                _ = tokio::time::sleep(interval) => {}
            }
        }
        if self.inner.config.enable_logs {
            info!("flags refresh loop stopped");
        }
    }

    /// Spawns the refresh loop onto the current runtime.
    pub fn start(&self) -> JoinHandle<()> {
        let client = self.clone();
        tokio::spawn(async move { client.run_refresh_loop().await })
    }

    /// Cancels the refresh loop and any in-flight request as a unit. No
    /// callback fires after this returns. Idempotent.
    pub fn shutdown(&self) {
        self.inner.cancel.cancel();
    }

    /// Read handle for one flag name.
    pub fn is(&self, name: impl Into<String>) -> FlagChecker {
        FlagChecker {
            name: name.into(),
            inner: self.inner.clone(),
        }
    }

    /// Flips the effective value for `name` by recording an override equal
    /// to the negation of the current effective value (override if present,
    /// else server value, else false), persisted via the override store.
    ///
    /// A name with no known flag still records an override; call
    /// [`FlagsClient::initialize`] first if a concrete flag record is
    /// wanted.
    pub fn toggle(&self, name: &str) {
        self.inner.toggle(name);
    }

    /// Clears the entire override set, reverting every flag to its
    /// server-driven value.
    pub fn reset_flags(&self) {
        self.inner.reset_flags();
    }

    /// Idempotently creates `name` in the applied set with `default_value`
    /// and a locally synthesized id. A no-op when the flag already exists;
    /// overrides are never consulted or modified here.
    pub fn initialize(&self, name: &str, default_value: bool) {
        self.inner.initialize(name, default_value);
    }

    /// Snapshot of the current effective view. The same `Arc` is returned
    /// until an input changes.
    pub fn effective_flags(&self) -> Arc<FlagSet> {
        self.inner.read_state().effective.clone()
    }

    /// Activation sequence and style overrides for the debug overlay
    /// collaborator; read-only.
    pub fn secret_menu(&self) -> SecretMenuConfig {
        self.inner.read_state().secret_menu.clone()
    }

    /// Change notifications: receivers observe a new `Arc<FlagSet>` only
    /// when the effective view actually changed.
    pub fn subscribe(&self) -> watch::Receiver<Arc<FlagSet>> {
        self.inner.updates.subscribe()
    }

    /// The period governing the next scheduling decision.
    pub fn refresh_interval(&self) -> Duration {
        self.inner.read_state().refresh_interval
    }
}

/// Read surface for one flag name, resolved against the live effective view
/// at call time, so a checker can be held across refreshes. Cheap to clone;
/// `is(name)` twice observes the same shared state.
#[derive(Clone)]
pub struct FlagChecker {
    name: String,
    inner: Arc<ClientInner>,
}

impl FlagChecker {
    /// Effective value; unknown flags read as disabled.
    pub fn enabled(&self) -> bool {
        self.inner
            .read_state()
            .effective
            .get(&self.name)
            .map(|flag| flag.enabled)
            .unwrap_or(false)
    }

    pub fn disabled(&self) -> bool {
        !self.enabled()
    }

    /// Name and id; unknown flags synthesize `{name, id: ""}`.
    pub fn details(&self) -> FlagDetails {
        self.inner
            .read_state()
            .effective
            .get(&self.name)
            .map(|flag| flag.details.clone())
            .unwrap_or_else(|| FlagDetails {
                name: self.name.clone(),
                id: String::new(),
            })
    }

    /// See [`FlagsClient::initialize`].
    pub fn initialize(&self, default_value: bool) {
        self.inner.initialize(&self.name, default_value);
    }
}
