//! WebSocket event server.
//!
//! Each connection is a session with a reader loop and a writer task. The
//! writer drains the session's own queue (replies from handlers) and the
//! server-wide broadcast channel (emits to everyone).
//!
//! Inbound messages are checked against the client events of the
//! [`SocketDefinition`]. Unknown names and invalid payloads are dropped;
//! the sender is never told. Each accepted message runs its handler in its
//! own task, so a slow or panicking handler only affects itself.

use std::collections::HashMap;
use std::fmt;
use std::future::Future;
use std::panic::AssertUnwindSafe;
use std::pin::Pin;
use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};

use axum::Router;
use axum::extract::WebSocketUpgrade;
use axum::extract::ws::{Message, WebSocket};
use axum::routing::get;
use contractkit_protocol::{Inbound, SocketDefinition, SocketMessage};
use futures_util::{FutureExt, SinkExt, StreamExt};
use serde_json::Value;
use tokio::sync::broadcast::error::RecvError;
use tokio::sync::{broadcast, mpsc, oneshot};
use tracing::{debug, error, info, warn};
use uuid::Uuid;

use crate::dispatch::panic_message;
use crate::error::SocketError;
use crate::shutdown::{StopMode, StopSignal};

/// Capacity of the broadcast channel; slower sessions drop older emits.
const BROADCAST_CAPACITY: usize = 256;

/// Boxed future returned by socket handlers.
pub type SocketHandlerFuture = Pin<Box<dyn Future<Output = ()> + Send>>;

/// Type-erased handler for one client event.
pub type SocketHandler = Arc<dyn Fn(SocketContext, Value) -> SocketHandlerFuture + Send + Sync>;

/// Handle to the session a message came from.
#[derive(Clone)]
pub struct SocketContext {
    session_id: Uuid,
    outbound: mpsc::UnboundedSender<String>,
    server: SocketServer,
}

impl SocketContext {
    pub fn session_id(&self) -> Uuid {
        self.session_id
    }

    /// Sends a server event to this session only.
    pub fn emit(&self, event: &str, data: Value) -> Result<(), SocketError> {
        let text = self.server.encode(event, data)?;
        self.outbound.send(text).map_err(|_| SocketError::Closed)
    }

    /// Sends a server event to every session.
    pub fn broadcast(&self, event: &str, data: Value) -> Result<usize, SocketError> {
        self.server.emit(event, data)
    }
}

impl fmt::Debug for SocketContext {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SocketContext")
            .field("session_id", &self.session_id)
            .finish_non_exhaustive()
    }
}

struct SocketInner {
    definition: SocketDefinition,
    handlers: HashMap<String, SocketHandler>,
    broadcast: broadcast::Sender<String>,
    sessions: AtomicUsize,
}

/// Event server for one [`SocketDefinition`]. Cloning shares the sessions.
#[derive(Clone)]
pub struct SocketServer {
    inner: Arc<SocketInner>,
}

impl SocketServer {
    pub fn builder(definition: SocketDefinition) -> SocketServerBuilder {
        SocketServerBuilder {
            definition,
            handlers: Vec::new(),
        }
    }

    pub fn definition(&self) -> &SocketDefinition {
        &self.inner.definition
    }

    /// Number of open sessions.
    pub fn session_count(&self) -> usize {
        self.inner.sessions.load(Ordering::SeqCst)
    }

    /// Broadcasts a server event to every open session.
    ///
    /// The payload is not validated. Returns the number of sessions the
    /// message was queued for.
    ///
    /// # Errors
    ///
    /// Returns [`SocketError::UnknownEvent`] if `event` is not a declared
    /// server event.
    pub fn emit(&self, event: &str, data: Value) -> Result<usize, SocketError> {
        let text = self.encode(event, data)?;
        // No subscriber is not an error: nobody is connected yet.
        Ok(self.inner.broadcast.send(text).unwrap_or(0))
    }

    fn encode(&self, event: &str, data: Value) -> Result<String, SocketError> {
        if !self.inner.definition.server_events().contains(event) {
            return Err(SocketError::UnknownEvent(event.to_string()));
        }
        Ok(SocketMessage::new(event, data).encode()?)
    }

    /// Router serving the WebSocket endpoint at `path`.
    pub fn router(&self, path: &str) -> Router {
        self.router_with_stop(path, &StopSignal::new())
    }

    /// Router whose sessions close when `stop` is requested.
    pub(crate) fn router_with_stop(&self, path: &str, stop: &StopSignal) -> Router {
        let server = self.clone();
        let stop = stop.clone();
        Router::new().route(
            path,
            get(move |upgrade: WebSocketUpgrade| {
                let server = server.clone();
                let stop = stop.clone();
                async move { upgrade.on_upgrade(move |socket| server.session(socket, stop)) }
            }),
        )
    }

    async fn session(self, socket: WebSocket, stop: StopSignal) {
        let session_id = Uuid::new_v4();
        let (mut sink, mut stream) = socket.split();
        let (outbound, mut queue) = mpsc::unbounded_channel::<String>();
        let (close_tx, mut close_rx) = oneshot::channel::<()>();
        let mut broadcast = self.inner.broadcast.subscribe();

        self.inner.sessions.fetch_add(1, Ordering::SeqCst);
        info!(session = %session_id, "Socket session opened");

        let writer = tokio::spawn(async move {
            loop {
                let text = tokio::select! {
                    _ = &mut close_rx => {
                        // Flush replies queued before the close.
                        while let Ok(text) = queue.try_recv() {
                            if sink.send(Message::Text(text)).await.is_err() {
                                break;
                            }
                        }
                        break;
                    }
                    Some(text) = queue.recv() => text,
                    received = broadcast.recv() => match received {
                        Ok(text) => text,
                        Err(RecvError::Lagged(skipped)) => {
                            warn!(skipped, "Socket session lagging, broadcasts dropped");
                            continue;
                        }
                        Err(RecvError::Closed) => break,
                    },
                };
                if sink.send(Message::Text(text)).await.is_err() {
                    debug!("Socket send failed, closing");
                    break;
                }
            }
            let _ = sink.close().await;
        });

        let context = SocketContext {
            session_id,
            outbound,
            server: self.clone(),
        };
        let stopped = stop.listener().stopped();
        tokio::pin!(stopped);

        let mut mode = StopMode::Graceful;
        loop {
            let frame = tokio::select! {
                requested = &mut stopped => {
                    debug!(session = %session_id, mode = ?requested, "Server stopping, closing socket session");
                    mode = requested;
                    break;
                }
                frame = stream.next() => frame,
            };
            match frame {
                Some(Ok(Message::Text(text))) => self.receive(&context, &text),
                Some(Ok(Message::Close(_))) | None => break,
                Some(Ok(_)) => {}
                Some(Err(e)) => {
                    debug!(session = %session_id, error = %e, "Socket receive error");
                    break;
                }
            }
        }

        match mode {
            StopMode::Graceful => {
                let _ = close_tx.send(());
                let _ = writer.await;
            }
            StopMode::Force => writer.abort(),
        }
        self.inner.sessions.fetch_sub(1, Ordering::SeqCst);
        info!(session = %session_id, "Socket session closed");
    }

    fn receive(&self, context: &SocketContext, text: &str) {
        let message = match SocketMessage::decode(text) {
            Ok(message) => message,
            Err(e) => {
                warn!(session = %context.session_id, error = %e, "Dropping malformed socket frame");
                return;
            }
        };

        let data = match self.inner.definition.client_events().check(&message) {
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

        let Some(handler) = self.inner.handlers.get(&message.event).cloned() else {
            debug!(event = %message.event, "No handler bound for socket event");
            return;
        };
        let context = context.clone();
        let event = message.event;
        tokio::spawn(async move {
            let outcome = AssertUnwindSafe(async move { handler(context, data).await })
                .catch_unwind()
                .await;
            if let Err(panic) = outcome {
                error!(event = %event, panic = %panic_message(panic.as_ref()), "Socket handler panicked");
            }
        });
    }
}

impl fmt::Debug for SocketServer {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SocketServer")
            .field("definition", &self.inner.definition)
            .field("sessions", &self.session_count())
            .finish_non_exhaustive()
    }
}

/// Builder for [`SocketServer`].
pub struct SocketServerBuilder {
    definition: SocketDefinition,
    handlers: Vec<(String, SocketHandler)>,
}

impl SocketServerBuilder {
    /// Binds an async handler to a client event.
    pub fn on<F, Fut>(mut self, event: impl Into<String>, f: F) -> Self
    where
        F: Fn(SocketContext, Value) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = ()> + Send + 'static,
    {
        let handler: SocketHandler = Arc::new(move |context, data| Box::pin(f(context, data)));
        self.handlers.push((event.into(), handler));
        self
    }

    /// Checks handler names against the client events.
    ///
    /// # Errors
    ///
    /// Returns [`SocketError::UnknownEvent`] for a handler bound to an
    /// undeclared client event.
    pub fn build(self) -> Result<SocketServer, SocketError> {
        let mut handlers = HashMap::new();
        for (event, handler) in self.handlers {
            if !self.definition.client_events().contains(&event) {
                return Err(SocketError::UnknownEvent(event));
            }
            handlers.insert(event, handler);
        }
        let (broadcast, _) = broadcast::channel(BROADCAST_CAPACITY);
        Ok(SocketServer {
            inner: Arc::new(SocketInner {
                definition: self.definition,
                handlers,
                broadcast,
                sessions: AtomicUsize::new(0),
            }),
        })
    }
}
