// MIT License - Copyright (c) 2026 Peter Wright
// Inbound MQTT command decoding

use tokio::sync::mpsc;

use crate::mqtt::Topics;
use crate::session::ArmMode;

/// Queue depth between the MQTT event loop and the reconciler.
pub const COMMAND_QUEUE_SIZE: usize = 16;

pub type CommandSender = mpsc::Sender<ArmMode>;
pub type CommandReceiver = mpsc::Receiver<ArmMode>;

pub fn command_channel() -> (CommandSender, CommandReceiver) {
    mpsc::channel(COMMAND_QUEUE_SIZE)
}

/// Decode a command payload (case-insensitive). Unknown payloads yield `None`.
pub fn decode_command(payload: &[u8]) -> Option<ArmMode> {
    let text = String::from_utf8_lossy(payload);
    match text.trim().to_uppercase().as_str() {
        "ARM_AWAY" | "ON" => Some(ArmMode::Total),
        "ARM_HOME" => Some(ArmMode::Partial),
        "DISARM" | "OFF" => Some(ArmMode::Disarm),
        _ => None,
    }
}

/// Decode a publish received on one of the panel's command topics. Messages
/// on any other topic are ignored.
pub fn route_publish(topics: &Topics, topic: &str, payload: &[u8]) -> Option<ArmMode> {
    if topic != topics.command() && topic != topics.switch_command() {
        return None;
    }
    decode_command(payload)
}
