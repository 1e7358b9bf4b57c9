// MIT License - Copyright (c) 2026 Peter Wright
// Configuration and 2FA web UI plus the JSON status endpoint

use std::fmt::Write as _;
use std::sync::Arc;

use axum::extract::{Form, State};
use axum::response::{Html, Redirect};
use axum::routing::{get, post};
use axum::{Json, Router};
use serde::{Deserialize, Serialize};
use tracing::{error, info, warn};

use crate::bridge::Bridge;
use crate::config::{BridgeConfig, ConfigUpdate};
use crate::state::BridgeState;
use crate::status::Snapshot;

/// Routes served on the listen address.
pub fn router(bridge: Arc<Bridge>) -> Router {
    Router::new()
        .route("/", get(index))
        .route("/api/status", get(status))
        .route("/trigger_2fa", post(trigger_2fa))
        .route("/submit_2fa", post(submit_2fa))
        .route("/save_config", post(save_config))
        .with_state(bridge)
}

#[derive(Debug, Serialize)]
pub struct StatusResponse {
    pub state: BridgeState,
    pub snapshot: Snapshot,
}

async fn status(State(bridge): State<Arc<Bridge>>) -> Json<StatusResponse> {
    Json(StatusResponse {
        state: bridge.state(),
        snapshot: bridge.snapshot().await,
    })
}

#[derive(Debug, Default, Deserialize)]
struct TriggerForm {
    /// Checkbox; any value means "force a new code".
    #[serde(default)]
    force: Option<String>,
}

async fn trigger_2fa(State(bridge): State<Arc<Bridge>>, Form(form): Form<TriggerForm>) -> Redirect {
    let force = form.force.is_some_and(|v| !v.is_empty() && v != "false");
    let state = bridge.trigger_two_factor(force).await;
    info!("Login triggered from UI (force={force}): {state}");
    Redirect::to("/")
}

#[derive(Debug, Deserialize)]
struct CodeForm {
    #[serde(default)]
    code: String,
}

async fn submit_2fa(State(bridge): State<Arc<Bridge>>, Form(form): Form<CodeForm>) -> Redirect {
    let code = form.code.trim();
    if code.is_empty() {
        warn!("Empty 2FA code submitted");
    } else if !bridge.submit_two_factor_code(code).await {
        warn!("2FA code was not accepted");
    }
    Redirect::to("/")
}

/// HTML form fields. Empty optional fields mean "leave unchanged".
#[derive(Default, Deserialize)]
struct ConfigForm {
    #[serde(default)]
    email: String,
    #[serde(default)]
    password: String,
    #[serde(default)]
    panel_id: String,
    #[serde(default)]
    panel_code: String,
    #[serde(default)]
    mqtt_broker: String,
    #[serde(default)]
    mqtt_port: String,
}

impl From<ConfigForm> for ConfigUpdate {
    fn from(form: ConfigForm) -> Self {
        ConfigUpdate {
            email: form.email,
            password: form.password,
            panel_id: form.panel_id,
            panel_code: form.panel_code,
            mqtt_broker: Some(form.mqtt_broker).filter(|b| !b.trim().is_empty()),
            mqtt_port: form.mqtt_port.trim().parse().ok(),
        }
    }
}

async fn save_config(State(bridge): State<Arc<Bridge>>, Form(form): Form<ConfigForm>) -> Redirect {
    if let Err(e) = bridge.apply_new_configuration(form.into()).await {
        error!("Failed to save configuration: {e}");
    }
    Redirect::to("/")
}

async fn index(State(bridge): State<Arc<Bridge>>) -> Html<String> {
    let state = bridge.state();
    let snapshot = bridge.snapshot().await;
    let config = bridge.config();
    Html(render_index(state, &snapshot, &config))
}

fn render_index(state: BridgeState, snapshot: &Snapshot, config: &BridgeConfig) -> String {
    let mut html = String::from(
        "<!DOCTYPE html><html><head><meta charset=\"utf-8\"><title>Sector Alarm Bridge</title></head><body>",
    );
    let _ = write!(
        html,
        "<h1>Sector Alarm Bridge</h1><p>State: <strong>{state}</strong></p><p>Alarm: {}</p>",
        snapshot.status
    );
    match snapshot.last_update {
        Some(at) => {
            let _ = write!(html, "<p>Last update: {}</p>", at.format("%Y-%m-%d %H:%M:%S UTC"));
        }
        None => html.push_str("<p>Last update: never</p>"),
    }

    if !snapshot.sensors.is_empty() {
        html.push_str("<table><tr><th>Sensor</th><th>Temperature</th><th>Humidity</th></tr>");
        for sensor in &snapshot.sensors {
            let temperature = sensor.temperature.map(|t| format!("{t} °C")).unwrap_or_default();
            let humidity = sensor.humidity.map(|h| format!("{h} %")).unwrap_or_default();
            let _ = write!(
                html,
                "<tr><td>{}</td><td>{temperature}</td><td>{humidity}</td></tr>",
                escape(&sensor.name)
            );
        }
        html.push_str("</table>");
    }

    if state == BridgeState::Waiting2fa {
        html.push_str(
            "<h2>Verification code</h2><form method=\"post\" action=\"/submit_2fa\">\
             <input name=\"code\" autocomplete=\"one-time-code\"><button>Submit</button></form>",
        );
    }
    html.push_str(
        "<form method=\"post\" action=\"/trigger_2fa\">\
         <label><input type=\"checkbox\" name=\"force\" value=\"true\"> request new code</label>\
         <button>Log in</button></form>",
    );

    let _ = write!(
        html,
        "<h2>Configuration</h2><form method=\"post\" action=\"/save_config\">\
         <p><label>Email <input name=\"email\" value=\"{}\"></label></p>\
         <p><label>Password <input type=\"password\" name=\"password\" placeholder=\"unchanged\"></label></p>\
         <p><label>Panel ID <input name=\"panel_id\" value=\"{}\"></label></p>\
         <p><label>Panel code <input type=\"password\" name=\"panel_code\" value=\"{}\"></label></p>\
         <p><label>MQTT broker <input name=\"mqtt_broker\" value=\"{}\"></label></p>\
         <p><label>MQTT port <input name=\"mqtt_port\" value=\"{}\"></label></p>\
         <button>Save</button></form></body></html>",
        escape(&config.cloud.email),
        escape(&config.cloud.panel_id),
        escape(&config.cloud.panel_code),
        escape(&config.mqtt.broker),
        config.mqtt.port,
    );
    html
}

fn escape(text: &str) -> String {
    let mut out = String::with_capacity(text.len());
    for c in text.chars() {
        match c {
            '&' => out.push_str("&amp;"),
            '<' => out.push_str("&lt;"),
            '>' => out.push_str("&gt;"),
            '"' => out.push_str("&quot;"),
            '\'' => out.push_str("&#39;"),
            c => out.push(c),
        }
    }
    out
}
