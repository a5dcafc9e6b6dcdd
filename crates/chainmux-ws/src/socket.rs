//! WebSocket subscription socket with auto-reconnect.
//!
//! A background task owns the connection. Callers talk to it through
//! an unbounded command channel; push notifications flow out through
//! the [`AddressBook`] sinks. After a disconnect the task reconnects
//! with exponential backoff and replays the subscribed address list.

use std::collections::HashMap;
use std::time::Duration;

use futures::{SinkExt, StreamExt};
use serde_json::{json, Value};
use tokio::sync::{mpsc, oneshot};
use tokio::time::MissedTickBehavior;
use tokio_tungstenite::tungstenite::Message;

use chainmux_core::{CallError, EventSink, FatalKind, Outcome};

use crate::subscriptions::AddressBook;

type Pending = HashMap<String, oneshot::Sender<Outcome<Value>>>;

/// Configuration for the subscription socket.
#[derive(Debug, Clone)]
pub struct WsConfig {
    /// Reconnect backoff starting duration.
    pub reconnect_initial: Duration,
    /// Maximum reconnect backoff.
    pub reconnect_max: Duration,
    /// Protocol-level ping cadence while connected.
    pub ping_interval: Duration,
    /// Upper bound on waiting for any single reply.
    pub reply_timeout: Duration,
}

impl Default for WsConfig {
    fn default() -> Self {
        Self {
            reconnect_initial: Duration::from_millis(500),
            reconnect_max: Duration::from_secs(60),
            ping_interval: Duration::from_secs(30),
            reply_timeout: Duration::from_secs(20),
        }
    }
}

/// Command sent from callers to the background socket task.
enum WsCommand {
    Call {
        method: String,
        params: Value,
        tx: oneshot::Sender<Outcome<Value>>,
    },
    Close,
}

/// Handle to one live subscription connection.
///
/// Exclusively owned by one adapter instance; dropping the handle
/// closes the connection on whatever exit path the adapter takes.
pub struct WsSocket {
    url: String,
    cmd_tx: mpsc::UnboundedSender<WsCommand>,
    book: AddressBook,
    reply_timeout: Duration,
}

impl WsSocket {
    /// Spawns the background task that owns the connection. Must be
    /// called within a Tokio runtime.
    pub fn connect(url: impl Into<String>, config: WsConfig) -> Self {
        let url = url.into();
        let (cmd_tx, cmd_rx) = mpsc::unbounded_channel();
        let book = AddressBook::new();
        let reply_timeout = config.reply_timeout;
        tokio::spawn(socket_task(url.clone(), cmd_rx, book.clone(), config));
        Self {
            url,
            cmd_tx,
            book,
            reply_timeout,
        }
    }

    pub fn url(&self) -> &str {
        &self.url
    }

    /// Number of currently subscribed addresses.
    pub fn subscribed(&self) -> usize {
        self.book.len()
    }

    /// One request/reply exchange over the socket, bounded by the
    /// configured reply timeout.
    pub async fn call(&self, method: &str, params: Value) -> Outcome<Value> {
        let (tx, rx) = oneshot::channel();
        self.cmd_tx
            .send(WsCommand::Call {
                method: method.to_string(),
                params,
                tx,
            })
            .map_err(|_| CallError::Transient(format!("socket task for {} is gone", self.url)))?;
        let reply = tokio::time::timeout(self.reply_timeout, rx).await.map_err(|_| {
            CallError::Transient(format!(
                "{} gave no reply within {:?}",
                self.url, self.reply_timeout
            ))
        })?;
        reply.map_err(|_| CallError::Transient(format!("{} dropped the reply", self.url)))?
    }

    /// Registers `sink` for `address` and pushes the updated address
    /// list to the server. The registration is rolled back if the
    /// server does not confirm.
    pub async fn subscribe(&self, address: &str, sink: EventSink) -> Outcome<()> {
        self.book.insert(address, sink);
        let params = json!({ "addresses": self.book.addresses() });
        match self.call("subscribeAddresses", params).await {
            Ok(data) if data.get("subscribed").and_then(Value::as_bool) == Some(true) => Ok(()),
            Ok(data) => {
                self.book.remove(address);
                Err(CallError::fatal(
                    FatalKind::BadShape,
                    format!("{} did not confirm subscription: {data}", self.url),
                ))
            }
            Err(error) => {
                self.book.remove(address);
                Err(error)
            }
        }
    }

    /// Drops the registration and shrinks the server-side list.
    /// Unsubscribing an unknown address is a no-op.
    pub async fn unsubscribe(&self, address: &str) -> Outcome<()> {
        if !self.book.remove(address) {
            return Ok(());
        }
        let remaining = self.book.addresses();
        // The server keeps one list per connection; sending the new
        // list replaces the old one.
        let outcome = if remaining.is_empty() {
            self.call("unsubscribeAddresses", json!({})).await
        } else {
            self.call("subscribeAddresses", json!({ "addresses": remaining }))
                .await
        };
        outcome.map(|_data| ())
    }
}

impl Drop for WsSocket {
    fn drop(&mut self) {
        let _ = self.cmd_tx.send(WsCommand::Close);
    }
}

/// Background task that owns the WebSocket connection.
async fn socket_task(
    url: String,
    mut cmd_rx: mpsc::UnboundedReceiver<WsCommand>,
    book: AddressBook,
    config: WsConfig,
) {
    let mut backoff = config.reconnect_initial;

    loop {
        tracing::info!(url = %url, "connecting subscription socket");

        let (mut sink, mut stream) = match tokio_tungstenite::connect_async(&url).await {
            Err(error) => {
                tracing::warn!(url = %url, %error, "socket connect failed, retrying in {backoff:?}");
                tokio::time::sleep(backoff).await;
                backoff = (backoff * 2).min(config.reconnect_max);
                continue;
            }
            Ok((ws_stream, _)) => {
                backoff = config.reconnect_initial;
                ws_stream.split()
            }
        };

        // Replies are scoped to this connection; dropping the map on
        // disconnect fails waiting callers promptly instead of leaving
        // them parked until timeout.
        let mut pending: Pending = HashMap::new();
        let mut seq: u64 = 1;

        // Restore the server-side address list. Fire and forget; id 0
        // never matches a pending reply.
        if !book.is_empty() {
            let restore = frame("0", "subscribeAddresses", json!({ "addresses": book.addresses() }));
            if sink.send(Message::Text(restore)).await.is_err() {
                continue;
            }
            tracing::info!(url = %url, count = book.len(), "re-subscribed addresses");
        }

        let mut ping = tokio::time::interval(config.ping_interval);
        ping.set_missed_tick_behavior(MissedTickBehavior::Delay);

        loop {
            tokio::select! {
                cmd = cmd_rx.recv() => match cmd {
                    None | Some(WsCommand::Close) => {
                        let _ = sink.send(Message::Close(None)).await;
                        return;
                    }
                    Some(WsCommand::Call { method, params, tx }) => {
                        let id = seq.to_string();
                        seq += 1;
                        let text = frame(&id, &method, params);
                        pending.insert(id, tx);
                        if sink.send(Message::Text(text)).await.is_err() {
                            break;
                        }
                    }
                },
                msg = stream.next() => match msg {
                    None => break,
                    Some(Err(error)) => {
                        tracing::warn!(url = %url, %error, "socket receive error");
                        break;
                    }
                    Some(Ok(Message::Text(text))) => {
                        route_frame(&url, text.as_str(), &mut pending, &book);
                    }
                    Some(Ok(Message::Close(_))) => break,
                    Some(Ok(_)) => {}
                },
                _ = ping.tick() => {
                    // Keeps idle load balancers from reaping the socket.
                    if sink.send(Message::Ping(Vec::new())).await.is_err() {
                        break;
                    }
                }
            }
        }

        tracing::warn!(url = %url, "socket disconnected, reconnecting in {backoff:?}");
        tokio::time::sleep(backoff).await;
        backoff = (backoff * 2).min(config.reconnect_max);
    }
}

fn frame(id: &str, method: &str, params: Value) -> String {
    json!({ "id": id, "method": method, "params": params }).to_string()
}

/// Routes one inbound frame: a pending reply if the id matches,
/// otherwise a push notification for the address book.
fn route_frame(endpoint: &str, text: &str, pending: &mut Pending, book: &AddressBook) {
    let Ok(value) = serde_json::from_str::<Value>(text) else {
        tracing::debug!(endpoint, "unparseable socket frame");
        return;
    };
    let id = value.get("id").and_then(Value::as_str).unwrap_or_default();
    let data = value.get("data").cloned().unwrap_or(Value::Null);

    if let Some(tx) = pending.remove(id) {
        let _ = tx.send(reply_outcome(endpoint, data));
        return;
    }
    // Frames for an id that already answered are push notifications.
    if !book.dispatch(endpoint, &data) {
        tracing::debug!(endpoint, "socket frame matched no caller or subscription");
    }
}

fn reply_outcome(endpoint: &str, data: Value) -> Outcome<Value> {
    if let Some(error) = data.get("error") {
        let detail = match error {
            Value::String(text) => text.clone(),
            other => other
                .get("message")
                .and_then(Value::as_str)
                .map(str::to_owned)
                .unwrap_or_else(|| other.to_string()),
        };
        return Err(CallError::fatal(
            FatalKind::Backend,
            format!("{endpoint} rejected call: {detail}"),
        ));
    }
    Ok(data)
}

#[cfg(test)]
mod tests {
    use super::*;
    use chainmux_core::AddressEvent;
    use std::sync::{mpsc as std_mpsc, Arc};

    #[test]
    fn reply_frame_completes_pending_call() {
        let mut pending: Pending = HashMap::new();
        let (tx, mut rx) = oneshot::channel();
        pending.insert("1".to_string(), tx);

        route_frame(
            "wss://bb.example",
            r#"{"id":"1","data":{"subscribed":true}}"#,
            &mut pending,
            &AddressBook::new(),
        );

        let data = rx.try_recv().unwrap().unwrap();
        assert_eq!(data["subscribed"], true);
        assert!(pending.is_empty());
    }

    #[test]
    fn error_reply_is_backend_fatal() {
        let mut pending: Pending = HashMap::new();
        let (tx, mut rx) = oneshot::channel();
        pending.insert("2".to_string(), tx);

        route_frame(
            "wss://bb.example",
            r#"{"id":"2","data":{"error":{"message":"bad address"}}}"#,
            &mut pending,
            &AddressBook::new(),
        );

        let err = rx.try_recv().unwrap().unwrap_err();
        match err {
            CallError::Fatal { kind, message } => {
                assert_eq!(kind, FatalKind::Backend);
                assert!(message.contains("bad address"), "{message}");
            }
            other => panic!("unexpected {other:?}"),
        }
    }

    #[test]
    fn unmatched_frame_goes_to_the_address_book() {
        let book = AddressBook::new();
        let (tx, rx) = std_mpsc::channel();
        book.insert(
            "0xabc",
            Arc::new(move |event: AddressEvent| {
                tx.send(event).unwrap();
            }),
        );

        route_frame(
            "wss://bb.example",
            r#"{"id":"3","data":{"address":"0xabc","tx":{"txid":"0xfeed"}}}"#,
            &mut HashMap::new(),
            &book,
        );

        let event = rx.try_recv().unwrap();
        assert_eq!(event.address, "0xabc");
        assert_eq!(event.payload["tx"]["txid"], "0xfeed");
    }

    #[test]
    fn garbage_frames_are_ignored() {
        route_frame(
            "wss://bb.example",
            "not json at all",
            &mut HashMap::new(),
            &AddressBook::new(),
        );
        route_frame(
            "wss://bb.example",
            r#"{"id":"9","data":null}"#,
            &mut HashMap::new(),
            &AddressBook::new(),
        );
    }
}
