//! Socket.IO client transport over a websocket
//!
//! Runs as its own task. The control loop talks to it only through a
//! [`TransportHandle`]: [`TransportCommand`]s go in, [`TransportMessage`]s
//! come out. Engine-level housekeeping (the open handshake, namespace join,
//! ping/pong) is answered here and never reaches the control loop.
//!
//! A failed or timed out connect is reported as `Disconnected`, same as a
//! dropped link, so the session always has something to retry from.

use std::net::SocketAddr;
use std::time::Duration;

use futures::{SinkExt, StreamExt};
use tallyproto::frame::{self, DEFAULT_NAMESPACE};
use tallyproto::{decode_frame, EnginePacket, SocketPacket};
use tokio::net::TcpStream;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tokio_tungstenite::tungstenite::Message;
use tokio_tungstenite::{connect_async, MaybeTlsStream, WebSocketStream};
use tracing::{debug, info, warn};

use crate::dispatch::{TransportCommand, TransportMessage};

type WsStream = WebSocketStream<MaybeTlsStream<TcpStream>>;

/// Queue depth between the control loop and the transport task.
pub const CHANNEL_CAPACITY: usize = 64;

/// Control loop side of the transport.
pub struct TransportHandle {
    pub commands: mpsc::Sender<TransportCommand>,
    pub messages: mpsc::Receiver<TransportMessage>,
}

/// Transport side: receives commands, reports messages.
pub struct TransportPeer {
    pub commands: mpsc::Receiver<TransportCommand>,
    pub messages: mpsc::Sender<TransportMessage>,
}

impl TransportHandle {
    /// A connected handle/peer pair with no task behind it.
    pub fn pair(capacity: usize) -> (TransportHandle, TransportPeer) {
        let (cmd_tx, cmd_rx) = mpsc::channel(capacity);
        let (msg_tx, msg_rx) = mpsc::channel(capacity);
        (
            TransportHandle {
                commands: cmd_tx,
                messages: msg_rx,
            },
            TransportPeer {
                commands: cmd_rx,
                messages: msg_tx,
            },
        )
    }
}

/// Spawn the websocket transport for `url`. It idles until told to connect;
/// each attempt is abandoned after `connect_timeout`.
pub fn spawn(url: String, connect_timeout: Duration) -> (TransportHandle, JoinHandle<()>) {
    let (handle, peer) = TransportHandle::pair(CHANNEL_CAPACITY);
    let task = tokio::spawn(websocket_loop(url, connect_timeout, peer));
    (handle, task)
}

async fn websocket_loop(url: String, connect_timeout: Duration, mut peer: TransportPeer) {
    while let Some(cmd) = peer.commands.recv().await {
        match cmd {
            TransportCommand::Connect => {
                info!("Connecting to {}", url);
                match tokio::time::timeout(connect_timeout, connect_async(url.as_str())).await {
                    Ok(Ok((ws, _))) => {
                        debug!("websocket open");
                        if let Some(local_address) = local_address(&ws) {
                            let opened = TransportMessage::Opened { local_address };
                            if peer.messages.send(opened).await.is_err() {
                                break;
                            }
                        }
                        if let ConnectionEnd::OwnerGone = run_connection(ws, &mut peer).await {
                            break;
                        }
                    }
                    Ok(Err(e)) => warn!("Connect to {} failed: {}", url, e),
                    Err(_) => warn!("Connect to {} timed out after {:?}", url, connect_timeout),
                }
                if peer.messages.send(TransportMessage::Disconnected).await.is_err() {
                    break;
                }
            }
            TransportCommand::Send(envelope) => {
                debug!("not connected, dropping outbound {}", envelope);
            }
        }
    }
    debug!("transport task exiting");
}

fn local_address(ws: &WsStream) -> Option<SocketAddr> {
    match ws.get_ref() {
        MaybeTlsStream::Plain(tcp) => tcp.local_addr().ok(),
        _ => None,
    }
}

enum ConnectionEnd {
    Closed,
    OwnerGone,
}

async fn run_connection(ws: WsStream, peer: &mut TransportPeer) -> ConnectionEnd {
    let (mut ws_tx, mut ws_rx) = ws.split();

    loop {
        tokio::select! {
            cmd = peer.commands.recv() => {
                let Some(cmd) = cmd else { return ConnectionEnd::OwnerGone };
                match cmd {
                    TransportCommand::Connect => debug!("already connected, ignoring connect"),
                    TransportCommand::Send(envelope) => {
                        let text = frame::encode_event(&envelope);
                        if let Err(e) = ws_tx.send(Message::text(text)).await {
                            warn!("send failed: {}", e);
                            return ConnectionEnd::Closed;
                        }
                    }
                }
            }
            msg = ws_rx.next() => {
                let text = match msg {
                    Some(Ok(Message::Text(text))) => text,
                    Some(Ok(Message::Close(_))) | None => return ConnectionEnd::Closed,
                    Some(Ok(_)) => continue,
                    Some(Err(e)) => {
                        warn!("websocket error: {}", e);
                        return ConnectionEnd::Closed;
                    }
                };
                match react(text.as_str()) {
                    FrameReaction::Reply(reply) => {
                        if ws_tx.send(Message::text(reply)).await.is_err() {
                            return ConnectionEnd::Closed;
                        }
                    }
                    FrameReaction::Deliver(message) => {
                        if peer.messages.send(message).await.is_err() {
                            return ConnectionEnd::OwnerGone;
                        }
                    }
                    FrameReaction::Close => return ConnectionEnd::Closed,
                    FrameReaction::Ignore => {}
                }
            }
        }
    }
}

/// What to do about one inbound frame.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FrameReaction {
    /// Answer on the socket.
    Reply(String),
    /// Hand up to the control loop.
    Deliver(TransportMessage),
    /// The server ended the session.
    Close,
    Ignore,
}

pub fn react(text: &str) -> FrameReaction {
    let packet = match decode_frame(text) {
        Ok(packet) => packet,
        Err(e) => {
            warn!("undecodable frame: {}", e);
            return FrameReaction::Ignore;
        }
    };

    match packet {
        EnginePacket::Open(open) => {
            debug!("engine open sid={} ping={}ms", open.sid, open.ping_interval);
            FrameReaction::Reply(frame::encode_connect())
        }
        EnginePacket::Ping(payload) => FrameReaction::Reply(frame::encode_pong(&payload)),
        EnginePacket::Close => FrameReaction::Close,
        EnginePacket::Message(packet) => match packet {
            SocketPacket::Connect { namespace } if namespace == DEFAULT_NAMESPACE => {
                FrameReaction::Deliver(TransportMessage::Connected)
            }
            SocketPacket::Event { namespace, data } if namespace == DEFAULT_NAMESPACE => {
                FrameReaction::Deliver(TransportMessage::Text(data))
            }
            SocketPacket::Disconnect { namespace } if namespace == DEFAULT_NAMESPACE => {
                FrameReaction::Close
            }
            SocketPacket::ConnectError { data, .. } => {
                warn!("server refused connection: {}", data);
                FrameReaction::Close
            }
            other => {
                debug!("ignoring socket packet {:?}", other);
                FrameReaction::Ignore
            }
        },
        EnginePacket::Pong(_) | EnginePacket::Upgrade | EnginePacket::Noop => FrameReaction::Ignore,
    }
}
