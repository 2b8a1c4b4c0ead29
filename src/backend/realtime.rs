//! Realtime change feed over the Phoenix channel protocol.
//!
//! Every frame is a JSON object `{topic, event, payload, ref}`:
//! - `phx_join` on `realtime:<name>` with a `postgres_changes` config subscribes
//! - `postgres_changes` frames carry `payload.data.{type, table, record, old_record}`
//! - `heartbeat` on the `phoenix` topic keeps the socket alive
//! - `phx_leave` deregisters the listener
//!
//! One socket per subscription. The socket task ends when the guard is
//! released, when the consumer drops the event receiver, or when the server
//! closes the channel.

use std::time::Duration;

use futures::{SinkExt, StreamExt};
use log::{debug, info, warn};
use serde::{Deserialize, Serialize};
use serde_json::{Value, json};
use tokio::sync::{mpsc, oneshot};
use tokio_tungstenite::connect_async;
use tokio_tungstenite::tungstenite::Message as WsMessage;

use super::service::BackendError;
use super::subscription::Subscription;
use super::types::{ChangeEvent, ChangeFilter, ChangeKind, Table};

/// Interval between `phoenix` heartbeats. The server drops sockets silent for 60 s.
pub const HEARTBEAT_INTERVAL: Duration = Duration::from_secs(25);

/// Buffered change events per subscription before the socket task waits.
const EVENT_BUFFER: usize = 64;

const PROTOCOL_VERSION: &str = "1.0.0";

// ============================================================================
// Wire Frames
// ============================================================================

#[derive(Serialize, Debug)]
struct OutgoingFrame<'a> {
    topic: &'a str,
    event: &'a str,
    payload: Value,
    #[serde(rename = "ref")]
    reference: String,
}

#[derive(Deserialize, Debug)]
struct IncomingFrame {
    #[serde(default)]
    topic: String,
    event: String,
    #[serde(default)]
    payload: Value,
}

#[derive(Deserialize, Debug)]
struct ChangeData {
    table: String,
    #[serde(rename = "type")]
    kind: ChangeKind,
    #[serde(default)]
    record: Value,
    #[serde(default)]
    old_record: Value,
}

/// What a decoded server frame means to a subscriber.
#[derive(Debug, PartialEq)]
pub enum Inbound {
    Change(ChangeEvent),
    JoinAccepted,
    JoinRejected(String),
    /// The server closed or errored the channel.
    Closed(String),
    /// Replies to heartbeats, presence and broadcast traffic.
    Ignored,
}

fn encode(frame: &OutgoingFrame<'_>) -> Result<String, BackendError> {
    serde_json::to_string(frame)
        .map_err(|e| BackendError::Parse(format!("realtime frame serialization failed: {e}")))
}

/// Builds the websocket endpoint from the project URL (`https` -> `wss`).
pub fn websocket_url(base_url: &str, api_key: &str) -> Result<String, BackendError> {
    let base = base_url.trim_end_matches('/');
    let ws_base = if let Some(rest) = base.strip_prefix("https://") {
        format!("wss://{rest}")
    } else if let Some(rest) = base.strip_prefix("http://") {
        format!("ws://{rest}")
    } else {
        return Err(BackendError::Config(format!(
            "backend URL must start with http:// or https://, got {base_url}"
        )));
    };
    Ok(format!(
        "{ws_base}/realtime/v1/websocket?apikey={api_key}&vsn={PROTOCOL_VERSION}"
    ))
}

/// `phx_join` frame subscribing `topic` to row changes of `table`.
pub fn join_frame(
    topic: &str,
    table: Table,
    filter: ChangeFilter,
    access_token: Option<&str>,
    reference: u64,
) -> Result<String, BackendError> {
    let mut payload = json!({
        "config": {
            "broadcast": { "self": false },
            "presence": { "key": "" },
            "postgres_changes": [{
                "event": filter.as_event(),
                "schema": "public",
                "table": table.as_str(),
            }],
        },
    });
    if let Some(token) = access_token {
        payload["access_token"] = Value::String(token.to_string());
    }
    encode(&OutgoingFrame {
        topic,
        event: "phx_join",
        payload,
        reference: reference.to_string(),
    })
}

pub fn leave_frame(topic: &str, reference: u64) -> Result<String, BackendError> {
    encode(&OutgoingFrame {
        topic,
        event: "phx_leave",
        payload: json!({}),
        reference: reference.to_string(),
    })
}

pub fn heartbeat_frame(reference: u64) -> Result<String, BackendError> {
    encode(&OutgoingFrame {
        topic: "phoenix",
        event: "heartbeat",
        payload: json!({}),
        reference: reference.to_string(),
    })
}

/// Decodes one text frame from the server.
pub fn decode_frame(text: &str) -> Result<Inbound, BackendError> {
    let frame: IncomingFrame = serde_json::from_str(text)
        .map_err(|e| BackendError::Parse(format!("realtime frame: {e}")))?;

    match frame.event.as_str() {
        "postgres_changes" => {
            let data: ChangeData = serde_json::from_value(frame.payload["data"].clone())
                .map_err(|e| BackendError::Parse(format!("postgres_changes payload: {e}")))?;
            Ok(Inbound::Change(ChangeEvent {
                table: data.table,
                kind: data.kind,
                record: data.record,
                old_record: data.old_record,
            }))
        }
        "phx_reply" if frame.topic != "phoenix" => {
            match frame.payload["status"].as_str() {
                Some("ok") => Ok(Inbound::JoinAccepted),
                _ => {
                    let reason = frame.payload["response"]["reason"]
                        .as_str()
                        .unwrap_or("join refused")
                        .to_string();
                    Ok(Inbound::JoinRejected(reason))
                }
            }
        }
        "phx_close" => Ok(Inbound::Closed("channel closed by server".to_string())),
        "phx_error" => Ok(Inbound::Closed("channel error".to_string())),
        "system" if frame.payload["status"].as_str() == Some("error") => {
            let message = frame.payload["message"]
                .as_str()
                .unwrap_or("system error")
                .to_string();
            Ok(Inbound::Closed(message))
        }
        _ => Ok(Inbound::Ignored),
    }
}

// ============================================================================
// Socket Task
// ============================================================================

/// Connection parameters for one realtime subscription.
pub struct ChannelSpec {
    pub ws_url: String,
    pub topic: String,
    pub table: Table,
    pub filter: ChangeFilter,
    pub access_token: Option<String>,
}

/// Connects, joins the channel, and hands back an owned [`Subscription`].
///
/// Connection failures are returned to the caller; anything after the join
/// is logged by the socket task, which then closes the event stream.
pub async fn subscribe(spec: ChannelSpec) -> Result<Subscription, BackendError> {
    info!("Opening realtime channel {} ({:?})", spec.topic, spec.table);
    let (socket, _response) = connect_async(spec.ws_url.as_str())
        .await
        .map_err(|e| BackendError::Network(format!("realtime connect failed: {e}")))?;

    let (events_tx, events_rx) = mpsc::channel(EVENT_BUFFER);
    let (release_tx, release_rx) = oneshot::channel::<()>();
    let topic = spec.topic.clone();

    tokio::spawn(async move {
        if let Err(e) = run_channel(socket, spec, events_tx, release_rx).await {
            warn!("Realtime channel ended with error: {}", e);
        }
    });

    Ok(Subscription::new(topic, events_rx, move || {
        // The socket task may already be gone; nothing left to release then.
        let _ = release_tx.send(());
    }))
}

async fn run_channel<S>(
    socket: S,
    spec: ChannelSpec,
    events_tx: mpsc::Sender<ChangeEvent>,
    mut release_rx: oneshot::Receiver<()>,
) -> Result<(), BackendError>
where
    S: futures::Stream<Item = Result<WsMessage, tokio_tungstenite::tungstenite::Error>>
        + futures::Sink<WsMessage, Error = tokio_tungstenite::tungstenite::Error>
        + Unpin,
{
    let (mut sink, mut stream) = socket.split();
    let mut reference: u64 = 1;

    let join = join_frame(
        &spec.topic,
        spec.table,
        spec.filter,
        spec.access_token.as_deref(),
        reference,
    )?;
    sink.send(WsMessage::text(join))
        .await
        .map_err(|e| BackendError::Network(e.to_string()))?;

    let mut heartbeat = tokio::time::interval(HEARTBEAT_INTERVAL);
    heartbeat.tick().await;

    loop {
        tokio::select! {
            _ = &mut release_rx => {
                reference += 1;
                debug!("Leaving realtime channel {}", spec.topic);
                let leave = leave_frame(&spec.topic, reference)?;
                let _ = sink.send(WsMessage::text(leave)).await;
                let _ = sink.close().await;
                return Ok(());
            }
            _ = heartbeat.tick() => {
                reference += 1;
                let beat = heartbeat_frame(reference)?;
                sink.send(WsMessage::text(beat))
                    .await
                    .map_err(|e| BackendError::Network(e.to_string()))?;
            }
            frame = stream.next() => {
                match frame {
                    Some(Ok(WsMessage::Text(text))) => match decode_frame(text.as_str()) {
                        Ok(Inbound::Change(event)) => {
                            if event.table != spec.table.as_str() || !spec.filter.matches(event.kind) {
                                continue;
                            }
                            if events_tx.send(event).await.is_err() {
                                debug!("Change receiver dropped for {}", spec.topic);
                                return Ok(());
                            }
                        }
                        Ok(Inbound::JoinAccepted) => info!("Joined realtime channel {}", spec.topic),
                        Ok(Inbound::JoinRejected(reason)) => {
                            warn!("Realtime join rejected for {}: {}", spec.topic, reason);
                            return Err(BackendError::Api { status: 403, message: reason });
                        }
                        Ok(Inbound::Closed(reason)) => {
                            info!("Realtime channel {} closed: {}", spec.topic, reason);
                            return Err(BackendError::ChannelClosed);
                        }
                        Ok(Inbound::Ignored) => {}
                        Err(e) => warn!("Skipping undecodable realtime frame: {}", e),
                    },
                    Some(Ok(WsMessage::Ping(payload))) => {
                        let _ = sink.send(WsMessage::Pong(payload)).await;
                    }
                    Some(Ok(WsMessage::Close(_))) | None => {
                        info!("Realtime socket closed for {}", spec.topic);
                        return Err(BackendError::ChannelClosed);
                    }
                    Some(Ok(_)) => {}
                    Some(Err(e)) => return Err(BackendError::Network(e.to_string())),
                }
            }
        }
    }
}
