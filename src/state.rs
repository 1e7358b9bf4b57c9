// MIT License - Copyright (c) 2026 Peter Wright
// Coarse bridge state machine

use serde::Serialize;

use crate::session::LoginOutcome;

/// The coarse state of the bridge, surfaced to the UI as the only error
/// signal.
///
/// ```text
/// STARTING --(missing config)--> CONFIG_REQUIRED
/// STARTING/CONFIG_REQUIRED/ERROR --(login ok)--> CONNECTED
/// any --(2FA required)--> WAITING_2FA
/// WAITING_2FA --(code accepted)--> CONNECTED
/// CONNECTED --(re-check fails)--> ERROR
/// any --(configuration saved)--> STARTING
/// ```
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum BridgeState {
    #[default]
    Starting,
    ConfigRequired,
    #[serde(rename = "WAITING_2FA")]
    Waiting2fa,
    Connected,
    Error,
}

impl BridgeState {
    /// State reached after a login attempt.
    pub fn after_login(outcome: &LoginOutcome) -> Self {
        match outcome {
            LoginOutcome::Success(_) => BridgeState::Connected,
            LoginOutcome::TwoFactorRequired => BridgeState::Waiting2fa,
            LoginOutcome::Failed => BridgeState::Error,
        }
    }

    /// State reached after submitting a 2FA code. A rejected code leaves the
    /// bridge waiting.
    pub fn after_two_factor(self, accepted: bool) -> Self {
        if accepted { BridgeState::Connected } else { self }
    }

    /// Whether the poll loop may fetch data in this state.
    pub fn polls(self) -> bool {
        self == BridgeState::Connected
    }

    pub fn as_str(self) -> &'static str {
        match self {
            BridgeState::Starting => "STARTING",
            BridgeState::ConfigRequired => "CONFIG_REQUIRED",
            BridgeState::Waiting2fa => "WAITING_2FA",
            BridgeState::Connected => "CONNECTED",
            BridgeState::Error => "ERROR",
        }
    }
}

impl std::fmt::Display for BridgeState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}
