//! Realtime connection to the room relay.
//!
//! A manager task owns the socket and reconnects after a fixed delay for as
//! long as the connection is open. Each (re)connect sends `hello` followed by
//! the most recent status. Status frames produced while offline are not
//! queued; only the latest one is kept for the next connect. That replayed
//! frame can be up to one status interval old, so every connect also raises a
//! flag the session polls to push a fresh status right away.

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;

use futures_util::{SinkExt, StreamExt};
use tokio::sync::mpsc;
use tokio_tungstenite::connect_async;
use tokio_tungstenite::tungstenite::protocol::Message;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};
use url::Url;

use crate::dashboard::client::StatusSink;
use crate::dashboard::protocol::{ClientMessage, ServerMessage};

const HEARTBEAT: Duration = Duration::from_secs(25);

pub struct WebSocketConnection {
    outbound: mpsc::UnboundedSender<String>,
    cancel: CancellationToken,
    reconnected: Arc<AtomicBool>,
}

impl WebSocketConnection {
    /// Spawns the connection manager. Must be called inside a tokio runtime.
    #[must_use]
    pub fn open(url: Url, hello: &ClientMessage, reconnect_delay: Duration) -> Self {
        let (outbound, outbound_rx) = mpsc::unbounded_channel();
        let cancel = CancellationToken::new();
        let hello = serde_json::to_string(hello).unwrap_or_default();
        let reconnected = Arc::new(AtomicBool::new(false));
        tokio::spawn(run(
            url,
            hello,
            reconnect_delay,
            outbound_rx,
            cancel.clone(),
            Arc::clone(&reconnected),
        ));
        Self {
            outbound,
            cancel,
            reconnected,
        }
    }
}

impl StatusSink for WebSocketConnection {
    fn send(&self, message: ClientMessage) {
        match serde_json::to_string(&message) {
            Ok(text) => {
                // The manager is gone only after close.
                let _ = self.outbound.send(text);
            }
            Err(err) => warn!(error = %err, "failed to encode dashboard frame"),
        }
    }

    fn close(&self) {
        self.cancel.cancel();
    }

    fn take_reconnected(&self) -> bool {
        self.reconnected.swap(false, Ordering::SeqCst)
    }
}

impl Drop for WebSocketConnection {
    fn drop(&mut self) {
        self.cancel.cancel();
    }
}

enum Exit {
    Reconnect,
    Stop,
}

async fn run(
    url: Url,
    hello: String,
    reconnect_delay: Duration,
    mut outbound: mpsc::UnboundedReceiver<String>,
    cancel: CancellationToken,
    reconnected: Arc<AtomicBool>,
) {
    let mut latest: Option<String> = None;
    loop {
        let connected = tokio::select! {
            () = cancel.cancelled() => return,
            result = connect_async(url.as_str()) => result,
        };
        match connected {
            Ok((socket, _)) => {
                info!(url = %url, "dashboard connected");
                while let Ok(text) = outbound.try_recv() {
                    latest = Some(text);
                }
                let mut frames = vec![hello.clone()];
                frames.extend(latest.clone());
                let exit = session(socket, frames, &reconnected, &mut outbound, &mut latest, &cancel).await;
                match exit {
                    Exit::Stop => return,
                    Exit::Reconnect => info!(url = %url, "dashboard disconnected"),
                }
            }
            Err(err) => debug!(url = %url, error = %err, "dashboard connect failed"),
        }

        let sleep = tokio::time::sleep(reconnect_delay);
        tokio::pin!(sleep);
        loop {
            tokio::select! {
                () = cancel.cancelled() => return,
                () = &mut sleep => break,
                maybe = outbound.recv() => match maybe {
                    Some(text) => latest = Some(text),
                    None => return,
                },
            }
        }
    }
}

async fn session<S>(
    socket: tokio_tungstenite::WebSocketStream<S>,
    initial: Vec<String>,
    reconnected: &AtomicBool,
    outbound: &mut mpsc::UnboundedReceiver<String>,
    latest: &mut Option<String>,
    cancel: &CancellationToken,
) -> Exit
where
    S: tokio::io::AsyncRead + tokio::io::AsyncWrite + Unpin,
{
    let (mut write, mut read) = socket.split();
    for text in initial {
        if let Err(err) = write.send(Message::Text(text)).await {
            warn!(error = %err, "dashboard send failed");
            return Exit::Reconnect;
        }
    }
    reconnected.store(true, Ordering::SeqCst);

    let mut heartbeat = tokio::time::interval(HEARTBEAT);
    heartbeat.tick().await;
    loop {
        tokio::select! {
            biased;
            () = cancel.cancelled() => {
                let _ = write.send(Message::Close(None)).await;
                return Exit::Stop;
            }
            maybe = outbound.recv() => {
                let Some(text) = maybe else {
                    let _ = write.send(Message::Close(None)).await;
                    return Exit::Stop;
                };
                *latest = Some(text.clone());
                if let Err(err) = write.send(Message::Text(text)).await {
                    warn!(error = %err, "dashboard send failed");
                    return Exit::Reconnect;
                }
            }
            inbound = read.next() => match inbound {
                Some(Ok(Message::Text(text))) => match serde_json::from_str::<ServerMessage>(&text) {
                    Ok(ServerMessage::HelloAck { student_key, .. }) => {
                        debug!(student_key = student_key.as_deref().unwrap_or(""), "dashboard hello acknowledged");
                    }
                    Ok(_) => {}
                    Err(err) => debug!(error = %err, "ignoring unknown dashboard frame"),
                },
                Some(Ok(Message::Ping(payload))) => {
                    if let Err(err) = write.send(Message::Pong(payload)).await {
                        warn!(error = %err, "dashboard pong failed");
                        return Exit::Reconnect;
                    }
                }
                Some(Ok(Message::Close(_))) | None => return Exit::Reconnect,
                Some(Ok(_)) => {}
                Some(Err(err)) => {
                    warn!(error = %err, "dashboard read failed");
                    return Exit::Reconnect;
                }
            },
            _ = heartbeat.tick() => {
                if let Err(err) = write.send(Message::Ping(Vec::new())).await {
                    warn!(error = %err, "dashboard heartbeat failed");
                    return Exit::Reconnect;
                }
            }
        }
    }
}
