//! Inbound transport — newline-delimited JSON from the host process.
//!
//! Each line is either a service call `{"service": ..., "data": {...}}`,
//! answered with one JSON line on the output, or an event
//! `{"topic": ..., "payload": {...}}` published onto the bus.

use serde::Deserialize;
use serde_json::{json, Value};
use tokio::io::{AsyncBufRead, AsyncBufReadExt, AsyncWrite, AsyncWriteExt};

use super::bus::EventBus;
use crate::commands;
use crate::core_state::CoreState;

#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(untagged)]
pub enum InboundMessage {
    Service {
        service: String,
        #[serde(default)]
        data: Value,
    },
    Event {
        #[serde(alias = "event_type")]
        topic: String,
        #[serde(default, alias = "data")]
        payload: Value,
    },
}

/// Parse one line. Blank and malformed lines yield `None`.
pub fn parse_line(line: &str) -> Option<InboundMessage> {
    let line = line.trim();
    if line.is_empty() {
        return None;
    }
    match serde_json::from_str(line) {
        Ok(message) => Some(message),
        Err(e) => {
            tracing::warn!(error = %e, "Ignoring malformed inbound line");
            None
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct PumpStats {
    pub services: usize,
    pub events: usize,
    pub ignored: usize,
}

/// Read messages until EOF. Service responses are written as
/// `{"service": ..., "response": ...}` lines.
pub async fn pump<R, W>(reader: R, mut writer: W, state: &CoreState, bus: &EventBus) -> std::io::Result<PumpStats>
where
    R: AsyncBufRead + Unpin,
    W: AsyncWrite + Unpin,
{
    let mut stats = PumpStats::default();
    let mut lines = reader.lines();
    while let Some(line) = lines.next_line().await? {
        match parse_line(&line) {
            Some(InboundMessage::Service { service, data }) => {
                stats.services += 1;
                let response = commands::call_service(state, &service, data).await;
                let mut out = json!({ "service": service, "response": response }).to_string();
                out.push('\n');
                writer.write_all(out.as_bytes()).await?;
                writer.flush().await?;
            }
            Some(InboundMessage::Event { topic, payload }) => {
                stats.events += 1;
                let delivered = bus.publish(topic.as_str(), payload);
                tracing::debug!(topic = %topic, delivered, "Inbound event published");
            }
            None => stats.ignored += 1,
        }
    }
    tracing::info!(services = stats.services, events = stats.events, "Inbound stream closed");
    Ok(stats)
}
