//! WebSocket event client.
//!
//! Inbound messages are checked against the server events of the
//! [`SocketDefinition`]; unknown names and invalid payloads are dropped
//! without telling anyone. Outbound emits are not validated.

use std::fmt;
use std::panic::{AssertUnwindSafe, catch_unwind};
use std::sync::{Arc, Mutex, MutexGuard};

use contractkit_protocol::{Inbound, SocketDefinition, SocketMessage};
use futures_util::{SinkExt, StreamExt};
use serde_json::Value;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tokio_tungstenite::connect_async;
use tokio_tungstenite::tungstenite::Message;
use tracing::{debug, info, warn};
use uuid::Uuid;

use crate::error::{ClientError, ClientResult};

/// Identifies a persistent listener for [`SocketClient::remove_listener`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ListenerId(Uuid);

type Callback = Arc<dyn Fn(Value) + Send + Sync>;

struct Listener {
    id: Uuid,
    event: String,
    once: bool,
    callback: Callback,
}

struct Listeners {
    definition: SocketDefinition,
    entries: Mutex<Vec<Listener>>,
}

impl Listeners {
    fn lock(&self) -> MutexGuard<'_, Vec<Listener>> {
        // A panicking callback never runs under the lock.
        self.entries.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    fn add(&self, event: String, once: bool, callback: Callback) -> Uuid {
        let id = Uuid::new_v4();
        self.lock().push(Listener {
            id,
            event,
            once,
            callback,
        });
        id
    }

    fn deliver(&self, text: &str) {
        let message = match SocketMessage::decode(text) {
            Ok(message) => message,
            Err(e) => {
                warn!(error = %e, "Dropping malformed socket frame");
                return;
            }
        };
        let data = match self.definition.server_events().check(&message) {
            Inbound::Accepted(data) => data,
            Inbound::Unknown => {
                debug!(event = %message.event, "Dropping unknown socket event");
                return;
            }
            Inbound::Rejected(error) => {
                warn!(event = %message.event, error = %error, "Dropping invalid socket payload");
                return;
            }
        };

        let callbacks: Vec<Callback> = {
            let mut entries = self.lock();
            let callbacks = entries
                .iter()
                .filter(|listener| listener.event == message.event)
                .map(|listener| listener.callback.clone())
                .collect();
            entries.retain(|listener| !(listener.once && listener.event == message.event));
            callbacks
        };
        for callback in callbacks {
            let outcome = catch_unwind(AssertUnwindSafe(|| callback(data.clone())));
            if let Err(panic) = outcome {
                let reason = panic
                    .downcast_ref::<&str>()
                    .map(|s| s.to_string())
                    .or_else(|| panic.downcast_ref::<String>().cloned())
                    .unwrap_or_default();
                warn!(event = %message.event, panic = %reason, "Socket listener panicked");
            }
        }
    }
}

/// Connection to a socket server for one [`SocketDefinition`].
pub struct SocketClient {
    listeners: Arc<Listeners>,
    outbound: mpsc::UnboundedSender<Message>,
    reader: JoinHandle<()>,
    writer: Option<JoinHandle<()>>,
}

impl SocketClient {
    /// Connects to the socket endpoint at `url` (`ws://` or `wss://`).
    ///
    /// # Errors
    ///
    /// Returns [`ClientError::Socket`] if the handshake fails.
    pub async fn connect(url: &str, definition: SocketDefinition) -> ClientResult<Self> {
        let (stream, _) = connect_async(url).await?;
        info!(url = %url, "Socket connected");
        let (mut sink, mut stream) = stream.split();
        let (outbound, mut queue) = mpsc::unbounded_channel::<Message>();

        let writer = tokio::spawn(async move {
            while let Some(message) = queue.recv().await {
                let closing = matches!(message, Message::Close(_));
                if let Err(e) = sink.send(message).await {
                    debug!(error = %e, "Socket send failed, closing");
                    break;
                }
                if closing {
                    break;
                }
            }
            let _ = sink.close().await;
        });

        let listeners = Arc::new(Listeners {
            definition,
            entries: Mutex::new(Vec::new()),
        });
        let reader_listeners = listeners.clone();
        let reader = tokio::spawn(async move {
            while let Some(frame) = stream.next().await {
                match frame {
                    Ok(Message::Text(text)) => reader_listeners.deliver(&text),
                    Ok(Message::Close(_)) => break,
                    Ok(_) => {}
                    Err(e) => {
                        debug!(error = %e, "Socket receive error");
                        break;
                    }
                }
            }
            debug!("Socket reader finished");
        });

        Ok(Self {
            listeners,
            outbound,
            reader,
            writer: Some(writer),
        })
    }

    pub fn definition(&self) -> &SocketDefinition {
        &self.listeners.definition
    }

    /// Sends a client event. The payload is not validated.
    ///
    /// # Errors
    ///
    /// Returns [`ClientError::SocketClosed`] if the connection is gone, or
    /// a protocol error if the message is too large.
    pub fn emit(&self, event: &str, data: Value) -> ClientResult<()> {
        let text = SocketMessage::new(event, data).encode()?;
        self.outbound
            .send(Message::Text(text))
            .map_err(|_| ClientError::SocketClosed)
    }

    /// Calls `f` for every valid `event` until removed.
    pub fn listen<F>(&self, event: impl Into<String>, f: F) -> ListenerId
    where
        F: Fn(Value) + Send + Sync + 'static,
    {
        ListenerId(self.listeners.add(event.into(), false, Arc::new(f)))
    }

    /// Calls `f` for the next valid `event` only.
    pub fn listen_once<F>(&self, event: impl Into<String>, f: F)
    where
        F: Fn(Value) + Send + Sync + 'static,
    {
        self.listeners.add(event.into(), true, Arc::new(f));
    }

    /// Removes a persistent listener. Returns false if it was already gone.
    pub fn remove_listener(&self, id: ListenerId) -> bool {
        let mut entries = self.listeners.lock();
        let before = entries.len();
        entries.retain(|listener| listener.once || listener.id != id.0);
        entries.len() != before
    }

    /// Number of registered listeners.
    pub fn listener_count(&self) -> usize {
        self.listeners.lock().len()
    }

    /// Sends a close frame and waits for the connection to wind down.
    pub async fn close(mut self) {
        let _ = self.outbound.send(Message::Close(None));
        if let Some(writer) = self.writer.take() {
            let _ = writer.await;
        }
        self.reader.abort();
    }
}

impl Drop for SocketClient {
    fn drop(&mut self) {
        self.reader.abort();
    }
}

impl fmt::Debug for SocketClient {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SocketClient")
            .field("definition", &self.listeners.definition)
            .field("listeners", &self.listener_count())
            .finish_non_exhaustive()
    }
}
