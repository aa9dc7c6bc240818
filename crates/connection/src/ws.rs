//! WebSocket transport adapter for the chat service.
//!
//! Opens the socket, announces the identity credential, and runs three
//! background pumps: read (parses event envelopes, enforces a pong
//! deadline), write (serialises outbound command envelopes), and ping
//! (keep-alive). The wire envelopes mirror the service's existing
//! frames; no new protocol is designed here.

use std::collections::HashMap;
use std::time::Duration;

use futures_util::{SinkExt, StreamExt};
use serde::{Deserialize, Serialize};
use tokio::sync::mpsc;
use tokio_tungstenite::tungstenite;
use tokio_util::sync::CancellationToken;
use tracing::{debug, trace, warn};

use courier_session::AuthState;

use crate::transport::{ConnectionHandle, Transport, TransportError};
use crate::types::{ConnectionEvent, Disconnect, InboundMessage, MessageRef, Presence};

/// Protocol version announced in the hello frame.
pub const PROTOCOL_VERSION: u32 = 2;

const MAX_MESSAGE_SIZE: usize = 4 * 1024 * 1024;
const EVENT_CHANNEL_CAPACITY: usize = 64;

/// Inbound event envelope from the service.
#[derive(Debug, Deserialize)]
#[serde(tag = "type", rename_all = "camelCase")]
enum WireEvent {
    /// Handshake accepted, connection usable.
    Open,
    #[serde(rename_all = "camelCase")]
    Message {
        id: String,
        chat: String,
        sender: String,
        #[serde(default)]
        is_group: bool,
        #[serde(default)]
        text: Option<String>,
    },
    #[serde(rename = "creds.update")]
    CredsUpdate { files: HashMap<String, String> },
}

/// Outbound command envelope to the service.
#[derive(Debug, Serialize)]
#[serde(tag = "type", rename_all = "camelCase")]
enum WireCommand<'a> {
    #[serde(rename_all = "camelCase")]
    Hello {
        creds: &'a serde_json::Value,
        protocol_version: u32,
    },
    #[serde(rename_all = "camelCase")]
    Send {
        id: String,
        chat: &'a str,
        text: &'a str,
    },
    Read {
        messages: Vec<WireRef<'a>>,
    },
    Presence {
        chat: &'a str,
        state: &'static str,
    },
}

#[derive(Debug, Serialize)]
struct WireRef<'a> {
    chat: &'a str,
    id: &'a str,
}

fn presence_str(presence: Presence) -> &'static str {
    match presence {
        Presence::Available => "available",
        Presence::Composing => "composing",
        Presence::Paused => "paused",
    }
}

/// WebSocket transport for the chat service.
pub struct WsTransport {
    url: String,
    keepalive: Duration,
}

impl WsTransport {
    /// Creates a transport for the given service URL with the given
    /// keep-alive ping interval.
    pub fn new(url: impl Into<String>, keepalive: Duration) -> Self {
        Self {
            url: url.into(),
            keepalive,
        }
    }
}

impl Transport for WsTransport {
    type Handle = WsHandle;

    async fn connect(
        &self,
        auth: &AuthState,
        epoch: u64,
    ) -> Result<(WsHandle, mpsc::Receiver<ConnectionEvent>), TransportError> {
        let mut ws_config = tungstenite::protocol::WebSocketConfig::default();
        ws_config.max_message_size = Some(MAX_MESSAGE_SIZE);
        ws_config.max_frame_size = Some(MAX_MESSAGE_SIZE);
        let (ws_stream, _) =
            tokio_tungstenite::connect_async_with_config(&self.url, Some(ws_config), false).await?;
        let (write, read) = ws_stream.split();

        let (write_tx, write_rx) = mpsc::channel::<tungstenite::Message>(256);
        let (events_tx, events_rx) = mpsc::channel(EVENT_CHANNEL_CAPACITY);
        let cancel = CancellationToken::new();

        let write_handle = {
            let cancel = cancel.clone();
            tokio::spawn(write_pump(write, write_rx, cancel))
        };

        // Announce the identity before anything else; the service
        // answers with an `open` event once the handshake is accepted.
        let hello = serde_json::to_string(&WireCommand::Hello {
            creds: &auth.creds,
            protocol_version: PROTOCOL_VERSION,
        })?;
        write_tx
            .send(tungstenite::Message::Text(hello.into()))
            .await
            .map_err(|_| TransportError::Closed)?;

        let read_handle = {
            let events_tx = events_tx.clone();
            let write_tx = write_tx.clone();
            let cancel = cancel.clone();
            let pong_wait = self.keepalive * 2;
            tokio::spawn(read_pump(read, events_tx, write_tx, pong_wait, cancel))
        };

        let ping_handle = {
            let write_tx = write_tx.clone();
            let cancel = cancel.clone();
            tokio::spawn(ping_pump(write_tx, self.keepalive, cancel))
        };

        debug!(epoch, url = %self.url, "connection opened, hello sent");
        Ok((
            WsHandle {
                epoch,
                write_tx,
                cancel,
                _read_handle: read_handle,
                _write_handle: write_handle,
                _ping_handle: ping_handle,
            },
            events_rx,
        ))
    }
}

/// Live WebSocket connection handle.
pub struct WsHandle {
    epoch: u64,
    write_tx: mpsc::Sender<tungstenite::Message>,
    cancel: CancellationToken,
    _read_handle: tokio::task::JoinHandle<()>,
    _write_handle: tokio::task::JoinHandle<()>,
    _ping_handle: tokio::task::JoinHandle<()>,
}

impl WsHandle {
    async fn send_command(&self, cmd: &WireCommand<'_>) -> Result<(), TransportError> {
        let json = serde_json::to_string(cmd)?;
        self.write_tx
            .send(tungstenite::Message::Text(json.into()))
            .await
            .map_err(|_| TransportError::Closed)
    }
}

impl ConnectionHandle for WsHandle {
    fn epoch(&self) -> u64 {
        self.epoch
    }

    async fn send_message(&self, chat: &str, text: &str) -> Result<(), TransportError> {
        self.send_command(&WireCommand::Send {
            id: uuid::Uuid::new_v4().to_string(),
            chat,
            text,
        })
        .await
    }

    async fn mark_read(&self, refs: &[MessageRef]) -> Result<(), TransportError> {
        let messages = refs
            .iter()
            .map(|r| WireRef {
                chat: &r.chat,
                id: &r.id,
            })
            .collect();
        self.send_command(&WireCommand::Read { messages }).await
    }

    async fn set_presence(&self, presence: Presence, chat: &str) -> Result<(), TransportError> {
        self.send_command(&WireCommand::Presence {
            chat,
            state: presence_str(presence),
        })
        .await
    }

    async fn close(&self) {
        self.cancel.cancel();
        let _ = self
            .write_tx
            .send(tungstenite::Message::Close(None))
            .await;
    }
}

impl Drop for WsHandle {
    fn drop(&mut self) {
        self.cancel.cancel();
        self._read_handle.abort();
        self._write_handle.abort();
        self._ping_handle.abort();
    }
}

/// Reads frames from the socket and emits [`ConnectionEvent`]s.
///
/// A pong deadline detects dead connections: any incoming frame resets
/// it; silence past the deadline closes the connection.
async fn read_pump<S>(
    mut read: S,
    events_tx: mpsc::Sender<ConnectionEvent>,
    write_tx: mpsc::Sender<tungstenite::Message>,
    pong_wait: Duration,
    cancel: CancellationToken,
) where
    S: StreamExt<Item = Result<tungstenite::Message, tungstenite::Error>> + Unpin,
{
    let pong_deadline = tokio::time::sleep(pong_wait);
    tokio::pin!(pong_deadline);

    let cause = loop {
        tokio::select! {
            _ = cancel.cancelled() => return,

            () = &mut pong_deadline => {
                warn!("pong timeout, connection dead");
                break Disconnect::new(None, "pong timeout");
            }

            msg = read.next() => {
                match msg {
                    Some(Ok(msg)) => {
                        pong_deadline
                            .as_mut()
                            .reset(tokio::time::Instant::now() + pong_wait);

                        match msg {
                            tungstenite::Message::Text(text) => {
                                handle_text_frame(&text, &events_tx).await;
                            }
                            tungstenite::Message::Ping(data) => {
                                let _ = write_tx.send(tungstenite::Message::Pong(data)).await;
                            }
                            tungstenite::Message::Pong(_) => {
                                trace!("received pong");
                            }
                            tungstenite::Message::Close(frame) => {
                                debug!(?frame, "received close frame");
                                break match frame {
                                    Some(f) => Disconnect::new(
                                        Some(u16::from(f.code)),
                                        f.reason.to_string(),
                                    ),
                                    None => Disconnect::stream_end(),
                                };
                            }
                            _ => {} // Binary — ignore
                        }
                    }
                    Some(Err(e)) => {
                        warn!("WebSocket read error: {e}");
                        break Disconnect::new(None, e.to_string());
                    }
                    None => {
                        debug!("WebSocket stream ended");
                        break Disconnect::stream_end();
                    }
                }
            }
        }
    };

    let _ = events_tx.send(ConnectionEvent::Closed(cause)).await;
}

/// Parses one text frame and forwards the resulting event.
async fn handle_text_frame(text: &str, events_tx: &mpsc::Sender<ConnectionEvent>) {
    if text.len() > MAX_MESSAGE_SIZE {
        warn!("frame too large ({} bytes), dropping", text.len());
        return;
    }

    let event: WireEvent = match serde_json::from_str(text) {
        Ok(e) => e,
        Err(e) => {
            warn!("failed to parse event frame: {e}");
            return;
        }
    };

    let event = match event {
        WireEvent::Open => ConnectionEvent::Opened,
        WireEvent::Message {
            id,
            chat,
            sender,
            is_group,
            text,
        } => ConnectionEvent::Message(InboundMessage {
            id,
            chat,
            sender,
            is_group,
            text,
        }),
        WireEvent::CredsUpdate { files } => ConnectionEvent::CredsUpdated(files),
    };

    if events_tx.send(event).await.is_err() {
        warn!("event receiver dropped, discarding event");
    }
}

/// Writes outbound frames to the socket.
async fn write_pump<S>(
    mut write: S,
    mut write_rx: mpsc::Receiver<tungstenite::Message>,
    cancel: CancellationToken,
) where
    S: SinkExt<tungstenite::Message, Error = tungstenite::Error> + Unpin,
{
    loop {
        tokio::select! {
            _ = cancel.cancelled() => break,
            msg = write_rx.recv() => {
                match msg {
                    Some(m) => {
                        if let Err(e) = write.send(m).await {
                            warn!("WebSocket write error: {e}");
                            break;
                        }
                    }
                    None => break,
                }
            }
        }
    }

    let _ = write.send(tungstenite::Message::Close(None)).await;
}

/// Sends periodic keep-alive pings.
async fn ping_pump(
    write_tx: mpsc::Sender<tungstenite::Message>,
    period: Duration,
    cancel: CancellationToken,
) {
    let mut interval = tokio::time::interval(period);
    interval.tick().await; // Skip immediate first tick.

    loop {
        tokio::select! {
            _ = cancel.cancelled() => break,
            _ = interval.tick() => {
                let ping = tungstenite::Message::Ping(vec![].into());
                if write_tx.send(ping).await.is_err() {
                    break;
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use futures_util::stream;

    const PONG_WAIT: Duration = Duration::from_secs(60);

    #[test]
    fn wire_event_parses_message_frame() {
        let json = r#"{"type":"message","id":"m-1","chat":"g@g.chat","sender":"u@s.chat","isGroup":true,"text":"!ping"}"#;
        let event: WireEvent = serde_json::from_str(json).unwrap();
        match event {
            WireEvent::Message {
                id,
                chat,
                is_group,
                text,
                ..
            } => {
                assert_eq!(id, "m-1");
                assert_eq!(chat, "g@g.chat");
                assert!(is_group);
                assert_eq!(text.as_deref(), Some("!ping"));
            }
            other => panic!("expected message event, got {other:?}"),
        }
    }

    #[test]
    fn wire_event_message_without_text() {
        let json = r#"{"type":"message","id":"m-2","chat":"u@s.chat","sender":"u@s.chat"}"#;
        let event: WireEvent = serde_json::from_str(json).unwrap();
        match event {
            WireEvent::Message { is_group, text, .. } => {
                assert!(!is_group);
                assert!(text.is_none());
            }
            other => panic!("expected message event, got {other:?}"),
        }
    }

    #[test]
    fn wire_event_parses_creds_update() {
        let json = r#"{"type":"creds.update","files":{"creds.json":"{}"}}"#;
        let event: WireEvent = serde_json::from_str(json).unwrap();
        assert!(matches!(event, WireEvent::CredsUpdate { files } if files.len() == 1));
    }

    #[test]
    fn wire_command_hello_shape() {
        let creds = serde_json::json!({"me": {"id": "bot"}});
        let cmd = WireCommand::Hello {
            creds: &creds,
            protocol_version: PROTOCOL_VERSION,
        };
        let value: serde_json::Value =
            serde_json::from_str(&serde_json::to_string(&cmd).unwrap()).unwrap();
        assert_eq!(value["type"], "hello");
        assert_eq!(value["protocolVersion"], PROTOCOL_VERSION);
        assert_eq!(value["creds"]["me"]["id"], "bot");
    }

    #[tokio::test]
    async fn handle_send_message_builds_send_frame() {
        let (write_tx, mut write_rx) = mpsc::channel(16);
        let handle = WsHandle {
            epoch: 3,
            write_tx,
            cancel: CancellationToken::new(),
            _read_handle: tokio::spawn(async {}),
            _write_handle: tokio::spawn(async {}),
            _ping_handle: tokio::spawn(async {}),
        };

        handle.send_message("u@s.chat", "pong").await.unwrap();

        let frame = match write_rx.recv().await.unwrap() {
            tungstenite::Message::Text(t) => t,
            other => panic!("expected text frame, got {other:?}"),
        };
        let value: serde_json::Value = serde_json::from_str(&frame).unwrap();
        assert_eq!(value["type"], "send");
        assert_eq!(value["chat"], "u@s.chat");
        assert_eq!(value["text"], "pong");
        assert!(!value["id"].as_str().unwrap().is_empty());
        assert_eq!(handle.epoch(), 3);
    }

    #[tokio::test]
    async fn handle_mark_read_and_presence_frames() {
        let (write_tx, mut write_rx) = mpsc::channel(16);
        let handle = WsHandle {
            epoch: 1,
            write_tx,
            cancel: CancellationToken::new(),
            _read_handle: tokio::spawn(async {}),
            _write_handle: tokio::spawn(async {}),
            _ping_handle: tokio::spawn(async {}),
        };

        handle
            .mark_read(&[MessageRef {
                chat: "g@g.chat".into(),
                id: "m-1".into(),
            }])
            .await
            .unwrap();
        handle
            .set_presence(Presence::Composing, "g@g.chat")
            .await
            .unwrap();

        let read_frame = match write_rx.recv().await.unwrap() {
            tungstenite::Message::Text(t) => t,
            other => panic!("expected text frame, got {other:?}"),
        };
        let value: serde_json::Value = serde_json::from_str(&read_frame).unwrap();
        assert_eq!(value["type"], "read");
        assert_eq!(value["messages"][0]["id"], "m-1");

        let presence_frame = match write_rx.recv().await.unwrap() {
            tungstenite::Message::Text(t) => t,
            other => panic!("expected text frame, got {other:?}"),
        };
        let value: serde_json::Value = serde_json::from_str(&presence_frame).unwrap();
        assert_eq!(value["type"], "presence");
        assert_eq!(value["state"], "composing");
    }

    #[tokio::test]
    async fn read_pump_emits_closed_on_stream_end() {
        let (events_tx, mut events_rx) = mpsc::channel(16);
        let (write_tx, _write_rx) = mpsc::channel(16);
        let empty = stream::empty::<Result<tungstenite::Message, tungstenite::Error>>();

        read_pump(
            empty,
            events_tx,
            write_tx,
            PONG_WAIT,
            CancellationToken::new(),
        )
        .await;

        match events_rx.recv().await.unwrap() {
            ConnectionEvent::Closed(cause) => assert_eq!(cause, Disconnect::stream_end()),
            other => panic!("expected closed event, got {other:?}"),
        }
    }

    #[tokio::test]
    async fn read_pump_carries_close_code() {
        use tungstenite::protocol::frame::CloseFrame;
        use tungstenite::protocol::frame::coding::CloseCode;

        let (events_tx, mut events_rx) = mpsc::channel(16);
        let (write_tx, _write_rx) = mpsc::channel(16);
        let close = tungstenite::Message::Close(Some(CloseFrame {
            code: CloseCode::from(crate::types::CLOSE_LOGGED_OUT),
            reason: "logged out".into(),
        }));
        let frames = stream::iter(vec![Ok::<_, tungstenite::Error>(close)]);

        read_pump(
            frames,
            events_tx,
            write_tx,
            PONG_WAIT,
            CancellationToken::new(),
        )
        .await;

        match events_rx.recv().await.unwrap() {
            ConnectionEvent::Closed(cause) => {
                assert_eq!(cause.code, Some(crate::types::CLOSE_LOGGED_OUT));
            }
            other => panic!("expected closed event, got {other:?}"),
        }
    }

    #[tokio::test]
    async fn read_pump_times_out_on_silence() {
        tokio::time::pause();

        let (events_tx, mut events_rx) = mpsc::channel(16);
        let (write_tx, _write_rx) = mpsc::channel(16);
        let silent = stream::pending::<Result<tungstenite::Message, tungstenite::Error>>();

        read_pump(
            silent,
            events_tx,
            write_tx,
            PONG_WAIT,
            CancellationToken::new(),
        )
        .await;

        match events_rx.recv().await.unwrap() {
            ConnectionEvent::Closed(cause) => assert_eq!(cause.message, "pong timeout"),
            other => panic!("expected closed event, got {other:?}"),
        }
    }

    #[tokio::test]
    async fn read_pump_forwards_message_events() {
        let (events_tx, mut events_rx) = mpsc::channel(16);
        let (write_tx, _write_rx) = mpsc::channel(16);
        let open = r#"{"type":"open"}"#;
        let msg = r#"{"type":"message","id":"m-1","chat":"u@s.chat","sender":"u@s.chat","text":"hi"}"#;
        let frames = stream::iter(vec![
            Ok::<_, tungstenite::Error>(tungstenite::Message::Text(open.into())),
            Ok(tungstenite::Message::Text(msg.into())),
        ]);

        read_pump(
            frames,
            events_tx,
            write_tx,
            PONG_WAIT,
            CancellationToken::new(),
        )
        .await;

        assert!(matches!(
            events_rx.recv().await.unwrap(),
            ConnectionEvent::Opened
        ));
        match events_rx.recv().await.unwrap() {
            ConnectionEvent::Message(m) => assert_eq!(m.text.as_deref(), Some("hi")),
            other => panic!("expected message event, got {other:?}"),
        }
        assert!(matches!(
            events_rx.recv().await.unwrap(),
            ConnectionEvent::Closed(_)
        ));
    }

    #[tokio::test]
    async fn read_pump_skips_malformed_frames() {
        let (events_tx, mut events_rx) = mpsc::channel(16);
        let (write_tx, _write_rx) = mpsc::channel(16);
        let frames = stream::iter(vec![Ok::<_, tungstenite::Error>(
            tungstenite::Message::Text("not json {{{".into()),
        )]);

        read_pump(
            frames,
            events_tx,
            write_tx,
            PONG_WAIT,
            CancellationToken::new(),
        )
        .await;

        // Only the terminal Closed event, no garbage in between.
        assert!(matches!(
            events_rx.recv().await.unwrap(),
            ConnectionEvent::Closed(_)
        ));
        assert!(events_rx.recv().await.is_none());
    }

    #[tokio::test]
    async fn ping_pump_stops_on_cancel() {
        let (tx, _rx) = mpsc::channel(16);
        let cancel = CancellationToken::new();

        let c = cancel.clone();
        let handle = tokio::spawn(async move {
            ping_pump(tx, Duration::from_secs(10), c).await;
        });

        cancel.cancel();
        tokio::time::timeout(Duration::from_secs(2), handle)
            .await
            .expect("should stop")
            .expect("no panic");
    }
}
