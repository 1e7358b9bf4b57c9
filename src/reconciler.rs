// MIT License - Copyright (c) 2026 Peter Wright
// Poll loop: keep the session authenticated, fetch state, publish to MQTT

use std::sync::Arc;
use std::time::Duration;

use chrono::Utc;
use tokio::sync::watch;
use tokio::time::{Instant, sleep_until};
use tracing::{debug, info, warn};

use crate::bridge::{Bridge, Core};
use crate::mqtt::command::CommandReceiver;
use crate::mqtt::{MqttBridge, Publisher, Topics};
use crate::session::{ArmMode, CloudSession, LoginOutcome};
use crate::state::BridgeState;
use crate::status::{AlarmStatus, SensorMerge, Snapshot, latest_event_type};

/// Wait between ticks while not connected.
pub const RETRY_INTERVAL: Duration = Duration::from_secs(5);
/// Wait before re-polling after an accepted arm/disarm command.
pub const COMMAND_SETTLE: Duration = Duration::from_secs(3);

/// Drives the poll cycle and executes MQTT commands.
///
/// Runs as a single task: ticks never overlap, and commands are executed
/// between ticks on the same task so the session has one writer.
pub struct Reconciler<P> {
    bridge: Arc<Bridge>,
    mqtt: MqttBridge<P>,
    commands: CommandReceiver,
}

impl<P: Publisher> Reconciler<P> {
    pub fn new(bridge: Arc<Bridge>, mqtt: MqttBridge<P>, commands: CommandReceiver) -> Self {
        Self {
            bridge,
            mqtt,
            commands,
        }
    }

    /// Run until `shutdown` flips to `true`. An in-flight tick always
    /// completes first.
    pub async fn run(mut self, mut shutdown: watch::Receiver<bool>) {
        info!("Reconciler started");
        loop {
            let wait = self.tick().await;
            let mut deadline = Instant::now() + wait;

            loop {
                tokio::select! {
                    () = sleep_until(deadline) => break,
                    () = self.bridge.woken() => {
                        debug!("Reconciler woken early");
                        break;
                    }
                    Some(mode) = self.commands.recv() => {
                        if self.execute_command(mode).await {
                            deadline = deadline.min(Instant::now() + COMMAND_SETTLE);
                        }
                    }
                    result = shutdown.changed() => {
                        if result.is_err() || *shutdown.borrow() {
                            info!("Reconciler stopped");
                            return;
                        }
                    }
                }
            }
        }
    }

    /// One reconciliation pass. Returns how long to wait before the next.
    pub async fn tick(&self) -> Duration {
        let mut core = self.bridge.lock().await;

        if !core.config.is_complete() {
            core.set_state(BridgeState::ConfigRequired);
            return RETRY_INTERVAL;
        }

        core.ensure_session();
        if core.state() != BridgeState::Waiting2fa {
            self.authenticate(&mut core).await;
        }

        if core.state().polls() {
            let topics = Topics::new(&core.config.mqtt, &core.config.cloud.panel_id);
            if core.discovery_pending {
                self.mqtt.forget_discovery();
                core.discovery_pending = false;
            }
            self.mqtt.announce_panel(&topics).await;
            if let Some(session) = core.session.as_mut() {
                self.poll(session, &topics).await;
            }
            return core.config.poll_interval();
        }
        RETRY_INTERVAL
    }

    /// Make sure the session holds a valid token, logging in if needed.
    async fn authenticate(&self, core: &mut Core) {
        let Some(session) = core.session.as_mut() else {
            return;
        };

        if session.has_token() && session.validate_token().await {
            core.set_state(BridgeState::Connected);
            return;
        }

        info!("Token missing or rejected, logging in");
        let outcome = session.login(false).await;
        if let LoginOutcome::Success(token) = &outcome {
            self.bridge.persist_token(core, token);
        }
        if outcome == LoginOutcome::TwoFactorRequired {
            warn!("Two-factor code required; polling paused until it is submitted");
        }
        core.set_state(BridgeState::after_login(&outcome));
    }

    /// Fetch log and sensor data and publish it. Fetch failures are logged
    /// and leave the state alone; whatever could not be fetched keeps its
    /// previous value.
    async fn poll(&self, session: &mut CloudSession, topics: &Topics) {
        let previous = self.bridge.snapshot().await;

        let logs = session.get_event_log().await;
        let temperatures = session.get_temperatures().await;
        let humidity = session.get_humidity().await;

        if logs.is_none() && temperatures.is_none() && humidity.is_none() {
            warn!("Poll produced no data; keeping previous snapshot");
            return;
        }

        let status = match logs.as_ref().map(|l| (l, latest_event_type(l))) {
            Some((_, Some(event_type))) => {
                let status = AlarmStatus::from_event_type(event_type);
                debug!("Latest event {event_type:?} -> {status}");
                status
            }
            Some((logs, None)) => {
                warn!("Event log has no usable entry: {logs}");
                previous.status
            }
            None => previous.status,
        };
        if logs.is_some() && status != AlarmStatus::Unknown {
            self.mqtt.publish_status(topics, status).await;
        }

        let mut merge = SensorMerge::new();
        let mut sensors_ok = false;
        if let Some(tree) = &temperatures {
            match merge.add_temperatures(tree) {
                Ok(_) => sensors_ok = true,
                Err(e) => warn!("Unusable temperature data: {e}"),
            }
        }
        if let Some(tree) = &humidity {
            match merge.add_humidity(tree) {
                Ok(_) => sensors_ok = true,
                Err(e) => warn!("Unusable humidity data: {e}"),
            }
        }

        let sensors = if sensors_ok {
            let sensors = merge.finish();
            for reading in &sensors {
                self.mqtt.announce_sensor(topics, reading).await;
                self.mqtt.publish_sensor(topics, reading).await;
            }
            sensors
        } else {
            previous.sensors
        };

        debug!("Poll complete: status {status}, {} sensors", sensors.len());
        self.bridge
            .replace_snapshot(Snapshot {
                status,
                sensors,
                last_update: Some(Utc::now()),
            })
            .await;
    }

    /// Execute an arm/disarm command from MQTT. Returns whether the API
    /// accepted it.
    pub async fn execute_command(&self, mode: ArmMode) -> bool {
        let mut core = self.bridge.lock().await;
        let code = core.config.cloud.panel_code.clone();
        if code.is_empty() {
            warn!("Ignoring {mode:?}: no panel code configured");
            return false;
        }
        let Some(session) = core.session.as_mut() else {
            warn!("Ignoring {mode:?}: no active session");
            return false;
        };
        session.arm_system(&code, mode).await
    }
}
