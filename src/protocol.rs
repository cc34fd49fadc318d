//! Engine.IO v4 / Socket.IO v4 text packet codec.
//!
//! Only the text subset the panel needs is handled: no binary attachments,
//! no acknowledgements, default namespace only.

use crate::error::{PanelError, Result};
use serde::Deserialize;
use serde_json::Value;
use std::time::Duration;

/// Handshake carried by the Engine.IO `open` packet.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct OpenHandshake {
    pub sid: String,
    #[serde(default)]
    pub upgrades: Vec<String>,
    pub ping_interval: u64,
    pub ping_timeout: u64,
    #[serde(default)]
    pub max_payload: Option<u64>,
}

impl OpenHandshake {
    /// Longest silence tolerated before the server is considered gone.
    pub fn liveness_window(&self) -> Duration {
        Duration::from_millis(self.ping_interval + self.ping_timeout)
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum EnginePacket {
    Open(OpenHandshake),
    Close,
    Ping(String),
    Pong(String),
    Message(String),
    Upgrade,
    Noop,
}

#[derive(Debug, Clone, PartialEq)]
pub enum SocketPacket {
    Connect(Option<Value>),
    Disconnect,
    Event { name: String, data: Option<Value> },
    Ack,
    ConnectError(Option<Value>),
}

pub fn decode_engine(text: &str) -> Result<EnginePacket> {
    let mut chars = text.chars();
    let kind = chars
        .next()
        .ok_or_else(|| PanelError::Protocol("empty engine.io packet".into()))?;
    let body = chars.as_str();
    let packet = match kind {
        '0' => EnginePacket::Open(serde_json::from_str(body)?),
        '1' => EnginePacket::Close,
        '2' => EnginePacket::Ping(body.to_string()),
        '3' => EnginePacket::Pong(body.to_string()),
        '4' => EnginePacket::Message(body.to_string()),
        '5' => EnginePacket::Upgrade,
        '6' => EnginePacket::Noop,
        other => {
            return Err(PanelError::Protocol(format!(
                "unknown engine.io packet type `{other}`"
            )))
        }
    };
    Ok(packet)
}

pub fn encode_engine(packet: &EnginePacket) -> String {
    match packet {
        EnginePacket::Open(_) => "0".to_string(),
        EnginePacket::Close => "1".to_string(),
        EnginePacket::Ping(data) => format!("2{data}"),
        EnginePacket::Pong(data) => format!("3{data}"),
        EnginePacket::Message(data) => format!("4{data}"),
        EnginePacket::Upgrade => "5".to_string(),
        EnginePacket::Noop => "6".to_string(),
    }
}

/// Decode the payload of an Engine.IO `message` packet.
pub fn decode_socket(payload: &str) -> Result<SocketPacket> {
    let mut chars = payload.chars();
    let kind = chars
        .next()
        .ok_or_else(|| PanelError::Protocol("empty socket.io packet".into()))?;
    let mut rest = chars.as_str();

    if rest.starts_with('/') {
        let (nsp, tail) = rest.split_once(',').unwrap_or((rest, ""));
        if nsp != "/" {
            return Err(PanelError::Protocol(format!(
                "unsupported namespace `{nsp}`"
            )));
        }
        rest = tail;
    }
    // Ack ids are not used by the panel; skip them.
    rest = rest.trim_start_matches(|c: char| c.is_ascii_digit());

    let json = if rest.is_empty() {
        None
    } else {
        Some(serde_json::from_str::<Value>(rest)?)
    };

    match kind {
        '0' => Ok(SocketPacket::Connect(json)),
        '1' => Ok(SocketPacket::Disconnect),
        '2' => decode_event(json),
        '3' => Ok(SocketPacket::Ack),
        '4' => Ok(SocketPacket::ConnectError(json)),
        '5' | '6' => Err(PanelError::Protocol(
            "binary socket.io packets are not supported".into(),
        )),
        other => Err(PanelError::Protocol(format!(
            "unknown socket.io packet type `{other}`"
        ))),
    }
}

fn decode_event(json: Option<Value>) -> Result<SocketPacket> {
    let Some(Value::Array(mut items)) = json else {
        return Err(PanelError::Protocol("event packet must carry an array".into()));
    };
    if items.is_empty() {
        return Err(PanelError::Protocol("event packet has no name".into()));
    }
    let name = match items.remove(0) {
        Value::String(s) => s,
        _ => return Err(PanelError::Protocol("event name must be a string".into())),
    };
    let data = if items.is_empty() {
        None
    } else {
        Some(items.remove(0))
    };
    Ok(SocketPacket::Event { name, data })
}

/// Encode a Socket.IO packet wrapped in an Engine.IO `message` frame.
pub fn encode_socket(packet: &SocketPacket) -> Result<String> {
    let body = match packet {
        SocketPacket::Connect(None) => "0".to_string(),
        SocketPacket::Connect(Some(auth)) => format!("0{}", serde_json::to_string(auth)?),
        SocketPacket::Disconnect => "1".to_string(),
        SocketPacket::Event { name, data } => {
            let mut items = vec![Value::String(name.clone())];
            if let Some(d) = data {
                items.push(d.clone());
            }
            format!("2{}", serde_json::to_string(&items)?)
        }
        SocketPacket::Ack | SocketPacket::ConnectError(_) => {
            return Err(PanelError::Protocol(
                "client does not send ack or connect-error packets".into(),
            ))
        }
    };
    Ok(encode_engine(&EnginePacket::Message(body)))
}
