//! Live connection with keepalive and auto-reconnect.
//!
//! A [`LiveConnection`] owns a driver task that cycles through
//! `Connecting -> Open -> Backoff -> Connecting ...` until
//! [`LiveConnection::disconnect`] moves it to `Destroyed`. The driver owns the
//! transport, the keepalive timer and the reconnect timer; all three are
//! dropped when it exits, so nothing outlives a disconnect.

use std::pin::Pin;
use std::sync::Arc;
use std::time::Duration;

use anyhow::Context;
use futures_util::{SinkExt, StreamExt};
use matchwire_shared::{parse_frame, Envelope, EventData, InboundFrame, SendError, PING};
use tokio::sync::{mpsc, watch};
use tokio::time::{Instant, Interval, MissedTickBehavior, Sleep};
use tokio_util::sync::CancellationToken;

use super::backoff::Backoff;
use super::registry::{Handler, HandlerRegistry};
use super::ticket::{HttpTicketIssuer, TicketIssuer};
use super::transport::{Connector, Transport, TransportFrame, TungsteniteConnector};
use crate::api_client::ApiClient;
use crate::config::ConnectionConfig;

/// Upper bound on waiting for a close handshake.
const CLOSE_GRACE: Duration = Duration::from_secs(1);

/// State shared between the handle and the driver task.
struct Shared {
    registry: HandlerRegistry,
    connected: watch::Sender<bool>,
    /// Cancelled once, by `disconnect`. Terminal.
    shutdown: CancellationToken,
    /// Cancelled when the driver task has exited.
    finished: CancellationToken,
}

impl Shared {
    /// Flip `connected` to true unless the connection was destroyed.
    ///
    /// The check runs under the watch lock, so a concurrent `disconnect`
    /// cannot be overwritten with a stale `true`.
    fn mark_connected(&self) -> bool {
        let mut accepted = false;
        self.connected.send_if_modified(|connected| {
            if self.shutdown.is_cancelled() {
                return false;
            }
            accepted = true;
            !std::mem::replace(connected, true)
        });
        accepted
    }

    fn mark_disconnected(&self) {
        self.connected
            .send_if_modified(|connected| std::mem::replace(connected, false));
    }
}

/// A managed real-time connection to the API.
///
/// Created connecting; stays up (reconnecting as needed) until
/// [`disconnect`](Self::disconnect) is called or the handle is dropped.
pub struct LiveConnection {
    shared: Arc<Shared>,
    /// Encoded envelopes waiting for the driver.
    sender: mpsc::UnboundedSender<String>,
}

impl LiveConnection {
    /// Start a connection using the HTTP ticket endpoint and a real WebSocket.
    ///
    /// Must be called from within a tokio runtime.
    pub fn with_api(config: ConnectionConfig, api: ApiClient) -> Self {
        let issuer = HttpTicketIssuer::new(api, config.ticket_path.clone());
        Self::spawn(config, Arc::new(issuer), Arc::new(TungsteniteConnector::default()))
    }

    /// Start a connection with explicit ticket and transport sources.
    ///
    /// Must be called from within a tokio runtime.
    pub fn spawn(
        config: ConnectionConfig,
        issuer: Arc<dyn TicketIssuer>,
        connector: Arc<dyn Connector>,
    ) -> Self {
        let (sender, receiver) = mpsc::unbounded_channel();
        let (connected, _) = watch::channel(false);
        let shared = Arc::new(Shared {
            registry: HandlerRegistry::default(),
            connected,
            shutdown: CancellationToken::new(),
            finished: CancellationToken::new(),
        });

        let driver = Driver {
            host: config.api_url.host_str().unwrap_or_default().to_string(),
            backoff: Backoff::new(config.reconnect.clone()),
            config,
            issuer,
            connector,
            shared: shared.clone(),
            outbound: receiver,
        };
        tokio::spawn(driver.run());

        Self { shared, sender }
    }

    /// Register `handler` for envelopes of `event_type`.
    ///
    /// Registering the same handler twice for one type has no effect.
    pub fn on(&self, event_type: &str, handler: Handler) {
        self.shared.registry.insert(event_type, handler);
    }

    /// Remove a registration made with [`on`](Self::on); no-op if absent.
    pub fn off(&self, event_type: &str, handler: &Handler) {
        self.shared.registry.remove(event_type, handler);
    }

    /// Whether the socket is currently open.
    pub fn is_connected(&self) -> bool {
        *self.shared.connected.borrow()
    }

    /// Observe the connected flag.
    pub fn connected(&self) -> watch::Receiver<bool> {
        self.shared.connected.subscribe()
    }

    /// Queue an envelope for the open socket.
    ///
    /// Best-effort: the envelope is lost if the socket closes before it is
    /// written.
    pub fn send(&self, event_type: &str, data: EventData) -> Result<(), SendError> {
        if self.shared.shutdown.is_cancelled() {
            return Err(SendError::Disconnected);
        }
        if !self.is_connected() {
            return Err(SendError::NotConnected);
        }
        let text = Envelope::new(event_type, data)
            .to_text()
            .map_err(|e| SendError::Encode(e.to_string()))?;
        self.sender
            .send(text)
            .map_err(|_| SendError::Disconnected)
    }

    /// Stop for good: cancel timers, close the socket, never reconnect.
    ///
    /// Idempotent and callable from any state, including from a handler.
    pub fn disconnect(&self) {
        if !self.shared.shutdown.is_cancelled() {
            tracing::info!("live connection disconnecting");
        }
        self.shared.shutdown.cancel();
        self.shared.mark_disconnected();
    }

    /// Whether [`disconnect`](Self::disconnect) has been called.
    pub fn is_destroyed(&self) -> bool {
        self.shared.shutdown.is_cancelled()
    }

    /// Resolves once the driver task has released the socket and timers.
    pub async fn closed(&self) {
        self.shared.finished.cancelled().await;
    }
}

impl Drop for LiveConnection {
    fn drop(&mut self) {
        self.disconnect();
    }
}

struct OpenSocket {
    transport: Transport,
    keepalive: Interval,
}

enum Phase {
    Connecting,
    Open(OpenSocket),
    Backoff(Pin<Box<Sleep>>),
    Destroyed,
}

enum SocketEvent {
    Shutdown,
    Frame(Option<Result<TransportFrame, matchwire_shared::TransportError>>),
    Keepalive,
    Outbound(String),
}

struct Driver {
    /// Log context only.
    host: String,
    config: ConnectionConfig,
    issuer: Arc<dyn TicketIssuer>,
    connector: Arc<dyn Connector>,
    shared: Arc<Shared>,
    outbound: mpsc::UnboundedReceiver<String>,
    backoff: Backoff,
}

impl Driver {
    async fn run(mut self) {
        let _finished = self.shared.finished.clone().drop_guard();
        let mut phase = Phase::Connecting;
        loop {
            phase = match phase {
                Phase::Connecting => self.connect().await,
                Phase::Open(socket) => self.drive(socket).await,
                Phase::Backoff(delay) => self.wait(delay).await,
                Phase::Destroyed => break,
            };
        }
        self.shared.mark_disconnected();
        tracing::debug!(host = %self.host, "live connection driver stopped");
    }

    async fn connect(&mut self) -> Phase {
        let shutdown = self.shared.shutdown.clone();
        let attempt = open_transport(
            self.issuer.as_ref(),
            self.connector.as_ref(),
            &self.config,
        );
        let result = tokio::select! {
            biased;
            () = shutdown.cancelled() => return Phase::Destroyed,
            result = attempt => result,
        };

        match result {
            Ok(transport) => self.open(transport),
            Err(e) => {
                tracing::warn!(
                    host = %self.host,
                    error = %format!("{e:#}"),
                    "live connection attempt failed"
                );
                self.schedule_reconnect()
            }
        }
    }

    fn open(&mut self, transport: Transport) -> Phase {
        if !self.shared.mark_connected() {
            return Phase::Destroyed;
        }
        self.backoff.reset();

        // Anything queued against a previous socket is stale.
        while self.outbound.try_recv().is_ok() {}

        let period = self.config.keepalive_interval;
        let mut keepalive = tokio::time::interval_at(Instant::now() + period, period);
        keepalive.set_missed_tick_behavior(MissedTickBehavior::Delay);

        tracing::info!(host = %self.host, "live connection open");
        Phase::Open(OpenSocket {
            transport,
            keepalive,
        })
    }

    async fn drive(&mut self, mut socket: OpenSocket) -> Phase {
        let shutdown = self.shared.shutdown.clone();
        loop {
            let event = tokio::select! {
                biased;
                () = shutdown.cancelled() => SocketEvent::Shutdown,
                frame = socket.transport.stream.next() => SocketEvent::Frame(frame),
                _ = socket.keepalive.tick() => SocketEvent::Keepalive,
                Some(text) = self.outbound.recv() => SocketEvent::Outbound(text),
            };

            match event {
                SocketEvent::Shutdown => {
                    close_quietly(&mut socket.transport).await;
                    return Phase::Destroyed;
                }
                SocketEvent::Frame(Some(Ok(TransportFrame::Text(text)))) => {
                    self.handle_text(&text)
                }
                SocketEvent::Frame(Some(Ok(TransportFrame::Close))) | SocketEvent::Frame(None) => {
                    tracing::info!(host = %self.host, "live connection closed by peer");
                    return self.closed();
                }
                SocketEvent::Frame(Some(Err(e))) => {
                    tracing::warn!(host = %self.host, error = %e, "live connection transport error");
                    return self.abort(socket).await;
                }
                SocketEvent::Keepalive => {
                    if let Err(e) = socket.transport.sink.send(PING.to_string()).await {
                        tracing::warn!(host = %self.host, error = %e, "keepalive send failed");
                        return self.abort(socket).await;
                    }
                }
                SocketEvent::Outbound(text) => {
                    if let Err(e) = socket.transport.sink.send(text).await {
                        tracing::warn!(host = %self.host, error = %e, "send failed");
                        return self.abort(socket).await;
                    }
                }
            }
        }
    }

    async fn wait(&mut self, delay: Pin<Box<Sleep>>) -> Phase {
        tokio::select! {
            biased;
            () = self.shared.shutdown.cancelled() => Phase::Destroyed,
            () = delay => Phase::Connecting,
        }
    }

    /// Tear down a failed socket. `connected` drops before the close
    /// handshake, which may stall for up to [`CLOSE_GRACE`].
    async fn abort(&mut self, mut socket: OpenSocket) -> Phase {
        self.shared.mark_disconnected();
        close_quietly(&mut socket.transport).await;
        self.closed()
    }

    fn closed(&mut self) -> Phase {
        self.shared.mark_disconnected();
        self.schedule_reconnect()
    }

    fn schedule_reconnect(&mut self) -> Phase {
        let delay = self.backoff.next_delay();
        tracing::warn!(
            host = %self.host,
            delay_ms = delay.as_millis() as u64,
            "live connection reconnecting"
        );
        Phase::Backoff(Box::pin(tokio::time::sleep(delay)))
    }

    fn handle_text(&self, text: &str) {
        match parse_frame(text) {
            Some(InboundFrame::Pong) => {}
            Some(InboundFrame::Event(envelope)) => {
                let shutdown = &self.shared.shutdown;
                self.shared
                    .registry
                    .dispatch(&envelope, || !shutdown.is_cancelled());
            }
            None => tracing::debug!(host = %self.host, "dropping malformed frame"),
        }
    }
}

/// Fetch a fresh ticket and open a transport with it.
async fn open_transport(
    issuer: &dyn TicketIssuer,
    connector: &dyn Connector,
    config: &ConnectionConfig,
) -> anyhow::Result<Transport> {
    let ticket = issuer.issue().await.context("ticket request failed")?;
    let url = config.ws_url(ticket.as_str())?;
    let transport = connector.connect(&url).await?;
    Ok(transport)
}

async fn close_quietly(transport: &mut Transport) {
    let _ = tokio::time::timeout(CLOSE_GRACE, transport.sink.close()).await;
}
