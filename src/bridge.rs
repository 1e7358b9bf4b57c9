// MIT License - Copyright (c) 2026 Peter Wright
// Shared bridge context and the operations exposed to the UI/API layer

use tokio::sync::{Mutex, MutexGuard, Notify, RwLock, watch};
use tracing::{info, warn};

use crate::config::{BridgeConfig, ConfigStore, ConfigUpdate};
use crate::error::Result;
use crate::session::{CloudSession, LoginOutcome};
use crate::state::BridgeState;
use crate::status::Snapshot;

/// Configuration, session and state, always mutated together.
///
/// Holding the lock gives exclusive access to the whole triple, so a reader
/// never sees a new session paired with an old token or state.
pub struct Core {
    /// Call [`Core::sync_config`] after changing it so readers outside the
    /// lock see the edit.
    pub config: BridgeConfig,
    pub session: Option<CloudSession>,
    state: BridgeState,
    /// A fresh token was installed; discovery must be sent again.
    pub discovery_pending: bool,
    state_tx: watch::Sender<BridgeState>,
    config_tx: watch::Sender<BridgeConfig>,
}

impl Core {
    pub fn state(&self) -> BridgeState {
        self.state
    }

    pub fn set_state(&mut self, next: BridgeState) {
        if self.state != next {
            info!("Bridge state {} -> {}", self.state, next);
            self.state = next;
        }
        self.state_tx.send_replace(next);
    }

    /// Publish the current configuration to lock-free readers.
    pub fn sync_config(&self) {
        self.config_tx.send_replace(self.config.clone());
    }

    /// Build the session from the current configuration if there is none.
    pub fn ensure_session(&mut self) -> &mut CloudSession {
        let config = &self.config;
        self.session
            .get_or_insert_with(|| CloudSession::from_config(config))
    }

    /// Close and discard the session.
    pub fn drop_session(&mut self) {
        if let Some(mut session) = self.session.take() {
            session.close();
        }
    }
}

/// The context shared by the reconciler, the MQTT command path and the web
/// UI.
pub struct Bridge {
    core: Mutex<Core>,
    state_rx: watch::Receiver<BridgeState>,
    config_rx: watch::Receiver<BridgeConfig>,
    snapshot: RwLock<Snapshot>,
    store: ConfigStore,
    wake: Notify,
    reconnect_tx: watch::Sender<u64>,
}

impl Bridge {
    pub fn new(config: BridgeConfig, store: ConfigStore) -> Self {
        let (state_tx, state_rx) = watch::channel(BridgeState::Starting);
        let (config_tx, config_rx) = watch::channel(config.clone());
        let (reconnect_tx, _) = watch::channel(0);
        Self {
            core: Mutex::new(Core {
                config,
                session: None,
                state: BridgeState::Starting,
                discovery_pending: true,
                state_tx,
                config_tx,
            }),
            state_rx,
            config_rx,
            snapshot: RwLock::new(Snapshot::default()),
            store,
            wake: Notify::new(),
            reconnect_tx,
        }
    }

    /// Load the configuration from `store` and build the context.
    pub fn load(store: ConfigStore) -> Result<Self> {
        let config = store.load()?;
        Ok(Self::new(config, store))
    }

    /// Exclusive access to config, session and state.
    pub async fn lock(&self) -> MutexGuard<'_, Core> {
        self.core.lock().await
    }

    /// Current state. Never waits for an in-flight poll.
    pub fn state(&self) -> BridgeState {
        *self.state_rx.borrow()
    }

    pub async fn snapshot(&self) -> Snapshot {
        self.snapshot.read().await.clone()
    }

    pub async fn replace_snapshot(&self, snapshot: Snapshot) {
        *self.snapshot.write().await = snapshot;
    }

    /// Copy of the configuration. Never waits for an in-flight poll.
    pub fn config(&self) -> BridgeConfig {
        self.config_rx.borrow().clone()
    }

    pub fn store(&self) -> &ConfigStore {
        &self.store
    }

    /// Cut the reconciler's current wait short.
    pub fn wake(&self) {
        self.wake.notify_one();
    }

    pub async fn woken(&self) {
        self.wake.notified().await;
    }

    /// Fires whenever the MQTT connection must be rebuilt.
    pub fn subscribe_reconnect(&self) -> watch::Receiver<u64> {
        self.reconnect_tx.subscribe()
    }

    /// Store a freshly obtained token in the configuration and persist it.
    pub fn persist_token(&self, core: &mut Core, token: &str) {
        core.config.cloud.token = token.to_string();
        core.discovery_pending = true;
        core.sync_config();
        if let Err(e) = self.store.save(&core.config) {
            warn!("Failed to persist token: {e}");
        }
    }

    /// Run a login on demand (normally to have a new SMS code sent).
    pub async fn trigger_two_factor(&self, force: bool) -> BridgeState {
        let mut core = self.core.lock().await;
        if !core.config.is_complete() {
            core.set_state(BridgeState::ConfigRequired);
            return core.state();
        }

        let outcome = core.ensure_session().login(force).await;
        if let LoginOutcome::Success(token) = &outcome {
            self.persist_token(&mut core, token);
        }
        core.set_state(BridgeState::after_login(&outcome));
        let state = core.state();
        drop(core);
        self.wake();
        state
    }

    /// Submit the one-time code the user received. Returns whether it was
    /// accepted; a rejected code leaves the state untouched.
    pub async fn submit_two_factor_code(&self, code: &str) -> bool {
        let mut core = self.core.lock().await;
        let Some(session) = core.session.as_mut() else {
            warn!("2FA code submitted but there is no session");
            return false;
        };

        let accepted = session.validate_two_factor_code(code).await;
        let token = session.token().map(str::to_string);
        if accepted {
            if let Some(token) = token {
                self.persist_token(&mut core, &token);
            }
        }
        let next = core.state().after_two_factor(accepted);
        core.set_state(next);
        drop(core);
        if accepted {
            self.wake();
        }
        accepted
    }

    /// Apply and persist a configuration edit, then force a full re-init:
    /// the session is discarded, the state returns to STARTING and the MQTT
    /// connection is rebuilt.
    pub async fn apply_new_configuration(&self, update: ConfigUpdate) -> Result<()> {
        let mut core = self.core.lock().await;
        if core.config.apply(update) {
            info!("Credentials changed, stored token cleared");
        }
        core.sync_config();
        let saved = self.store.save(&core.config);
        core.drop_session();
        core.set_state(BridgeState::Starting);
        drop(core);

        self.reconnect_tx.send_modify(|generation| *generation += 1);
        self.wake();
        saved
    }

    /// Re-read the configuration file (SIGHUP). On failure the previous
    /// configuration and session stay in place.
    pub async fn reload_configuration(&self) -> Result<()> {
        let config = self.store.load()?;
        let mut core = self.core.lock().await;
        core.config = config;
        core.sync_config();
        core.drop_session();
        core.set_state(BridgeState::Starting);
        Ok(())
    }

    /// Close the session for process shutdown.
    pub async fn close(&self) {
        self.core.lock().await.drop_session();
    }
}
