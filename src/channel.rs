//! Real-time channel to the cycle runner server.
//!
//! One tokio task owns the WebSocket. The panel talks to it through two
//! unbounded channels: outbound messages in, [`ChannelEvent`]s out. Dropping
//! the outbound sender is the teardown signal.

use crate::error::{PanelError, Result};
use crate::model::{InboundMessage, OutboundMessage};
use crate::protocol::{self, EnginePacket, OpenHandshake, SocketPacket};
use futures::{SinkExt, StreamExt};
use std::collections::VecDeque;
use std::sync::Once;
use std::time::Duration;
use tokio::net::TcpStream;
use tokio::sync::mpsc::{self, UnboundedReceiver, UnboundedSender};
use tokio::time::{timeout, Instant};
use tokio_tungstenite::{connect_async, tungstenite::Message, MaybeTlsStream, WebSocketStream};
use tracing::{debug, info, warn};
use url::Url;

type WsStream = WebSocketStream<MaybeTlsStream<TcpStream>>;

/// Events delivered from the channel task to the panel owner.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ChannelEvent {
    Inbound(InboundMessage),
    /// The connection ended without a local dispose. No reconnect follows.
    Disconnected(String),
}

#[derive(Debug, Clone)]
pub struct ChannelConfig {
    pub server: Url,
    pub connect_timeout: Duration,
}

/// Derive the Socket.IO WebSocket endpoint from a server base URL.
pub fn endpoint_url(server: &Url) -> Result<Url> {
    let mut url = server.clone();
    let scheme = match server.scheme() {
        "http" | "ws" => "ws",
        "https" | "wss" => "wss",
        other => {
            return Err(PanelError::Transport(format!(
                "unsupported server scheme `{other}`"
            )))
        }
    };
    url.set_scheme(scheme)
        .map_err(|_| PanelError::Transport(format!("cannot use scheme `{scheme}` for {server}")))?;
    let base = server.path().trim_end_matches('/').to_string();
    url.set_path(&format!("{base}/socket.io/"));
    url.set_query(Some("EIO=4&transport=websocket"));
    url.set_fragment(None);
    Ok(url)
}

/// rustls needs a process-wide crypto provider before the first `wss://` connect.
fn install_crypto_provider() {
    static INSTALL: Once = Once::new();
    INSTALL.call_once(|| {
        let _ = rustls::crypto::ring::default_provider().install_default();
    });
}

/// Spawn the channel task. Returns the outbound sender and the task handle.
pub fn spawn_channel(
    cfg: ChannelConfig,
    event_tx: UnboundedSender<ChannelEvent>,
) -> (
    UnboundedSender<OutboundMessage>,
    tokio::task::JoinHandle<()>,
) {
    install_crypto_provider();
    let (out_tx, out_rx) = mpsc::unbounded_channel::<OutboundMessage>();
    let handle = tokio::spawn(async move {
        if let Err(e) = run_channel(&cfg, &event_tx, out_rx).await {
            warn!("channel to {} failed: {e}", cfg.server);
            let _ = event_tx.send(ChannelEvent::Disconnected(e.to_string()));
        }
    });
    (out_tx, handle)
}

async fn run_channel(
    cfg: &ChannelConfig,
    event_tx: &UnboundedSender<ChannelEvent>,
    mut out_rx: UnboundedReceiver<OutboundMessage>,
) -> Result<()> {
    let url = endpoint_url(&cfg.server)?;
    debug!("connecting to {url}");
    let (mut ws, _) = timeout(cfg.connect_timeout, connect_async(url.as_str()))
        .await
        .map_err(|_| {
            PanelError::Transport(format!(
                "timed out after {} connecting to {}",
                humantime::format_duration(cfg.connect_timeout),
                cfg.server
            ))
        })??;

    let handshake = timeout(cfg.connect_timeout, await_open(&mut ws))
        .await
        .map_err(|_| PanelError::Transport("no engine.io handshake from server".into()))??;
    info!(
        "engine.io session {} open (upgrades {:?}, max payload {:?})",
        handshake.sid, handshake.upgrades, handshake.max_payload
    );
    send_frame(&mut ws, protocol::encode_socket(&SocketPacket::Connect(None))?).await?;

    let liveness = handshake.liveness_window();
    let mut last_seen = Instant::now();
    let mut connected = false;
    // Emits made before the namespace connect completes wait here.
    let mut pending: VecDeque<OutboundMessage> = VecDeque::new();

    loop {
        tokio::select! {
            out = out_rx.recv() => {
                match out {
                    Some(msg) if connected => send_event(&mut ws, &msg).await?,
                    Some(msg) => pending.push_back(msg),
                    None => {
                        debug!("outbound side dropped; closing channel");
                        for msg in pending.drain(..) {
                            warn!("discarding `{}`: namespace never connected", msg.event_name());
                        }
                        let _ = send_frame(&mut ws, protocol::encode_socket(&SocketPacket::Disconnect)?).await;
                        let _ = ws.close(None).await;
                        return Ok(());
                    }
                }
            }
            frame = ws.next() => {
                last_seen = Instant::now();
                let text = match frame {
                    Some(Ok(Message::Text(text))) => text,
                    Some(Ok(Message::Close(reason))) => {
                        let reason = reason
                            .map(|f| f.reason.as_str().to_string())
                            .filter(|r| !r.is_empty())
                            .unwrap_or_else(|| "server closed the connection".into());
                        let _ = event_tx.send(ChannelEvent::Disconnected(reason));
                        return Ok(());
                    }
                    Some(Ok(_)) => continue,
                    Some(Err(e)) => return Err(e.into()),
                    None => {
                        let _ = event_tx.send(ChannelEvent::Disconnected("connection lost".into()));
                        return Ok(());
                    }
                };
                match protocol::decode_engine(text.as_str())? {
                    EnginePacket::Ping(data) => {
                        send_frame(&mut ws, protocol::encode_engine(&EnginePacket::Pong(data))).await?;
                    }
                    EnginePacket::Close => {
                        let _ = event_tx.send(ChannelEvent::Disconnected("server closed the session".into()));
                        return Ok(());
                    }
                    EnginePacket::Message(payload) => {
                        match handle_socket_packet(&payload, event_tx)? {
                            SocketFlow::Continue => {}
                            SocketFlow::Connected => {
                                connected = true;
                                while let Some(msg) = pending.pop_front() {
                                    send_event(&mut ws, &msg).await?;
                                }
                            }
                            SocketFlow::Disconnected => {
                                let _ = event_tx.send(ChannelEvent::Disconnected("server disconnected the client".into()));
                                let _ = ws.close(None).await;
                                return Ok(());
                            }
                        }
                    }
                    other => debug!("ignoring engine.io packet {other:?}"),
                }
            }
            _ = tokio::time::sleep_until(last_seen + liveness) => {
                return Err(PanelError::Transport(format!(
                    "no traffic from server for {}",
                    humantime::format_duration(liveness)
                )));
            }
        }
    }
}

enum SocketFlow {
    Continue,
    Connected,
    Disconnected,
}

fn handle_socket_packet(
    payload: &str,
    event_tx: &UnboundedSender<ChannelEvent>,
) -> Result<SocketFlow> {
    let packet = match protocol::decode_socket(payload) {
        Ok(p) => p,
        Err(e) => {
            warn!("dropping socket.io packet: {e}");
            return Ok(SocketFlow::Continue);
        }
    };
    match packet {
        SocketPacket::Connect(_) => {
            info!("socket.io namespace connected");
            let _ = event_tx.send(ChannelEvent::Inbound(InboundMessage::Connected));
            Ok(SocketFlow::Connected)
        }
        SocketPacket::Disconnect => Ok(SocketFlow::Disconnected),
        SocketPacket::ConnectError(data) => Err(PanelError::Transport(format!(
            "server refused connection: {}",
            data.map(|d| d.to_string()).unwrap_or_default()
        ))),
        SocketPacket::Event { name, data } => {
            match InboundMessage::from_event(&name, data) {
                Ok(Some(msg)) => {
                    debug!("inbound `{name}`");
                    let _ = event_tx.send(ChannelEvent::Inbound(msg));
                }
                Ok(None) => debug!("ignoring unknown event `{name}`"),
                Err(e) => warn!("{e}"),
            }
            Ok(SocketFlow::Continue)
        }
        SocketPacket::Ack => Ok(SocketFlow::Continue),
    }
}

async fn await_open(ws: &mut WsStream) -> Result<OpenHandshake> {
    while let Some(frame) = ws.next().await {
        if let Message::Text(text) = frame? {
            if let EnginePacket::Open(hs) = protocol::decode_engine(text.as_str())? {
                return Ok(hs);
            }
        }
    }
    Err(PanelError::Transport(
        "connection closed during handshake".into(),
    ))
}

async fn send_event(ws: &mut WsStream, msg: &OutboundMessage) -> Result<()> {
    let frame = protocol::encode_socket(&SocketPacket::Event {
        name: msg.event_name().to_string(),
        data: msg.payload()?,
    })?;
    info!("emit `{}`", msg.event_name());
    send_frame(ws, frame).await
}

async fn send_frame(ws: &mut WsStream, frame: String) -> Result<()> {
    ws.send(Message::text(frame)).await?;
    Ok(())
}
