use std::collections::VecDeque;
use std::sync::{
    atomic::{AtomicUsize, Ordering},
    Arc,
};

use async_trait::async_trait;
use clockbridge_core::config::SlackConfig;
use futures_util::{
    stream::{SplitSink, SplitStream},
    SinkExt, StreamExt,
};
use secrecy::{ExposeSecret, SecretString};
use serde::Deserialize;
use thiserror::Error;
use tokio::{net::TcpStream, sync::Mutex};
use tokio_tungstenite::{tungstenite::Message, MaybeTlsStream, WebSocketStream};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use crate::commands::CommandHandler;
use crate::events::{
    ack_frame, envelope_of, parse_frame, AckHandle, AckPayload, FrameError, InboundEvent,
};

#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum TransportError {
    #[error("transport failed to connect: {0}")]
    Connect(String),
    #[error("transport read failed: {0}")]
    Receive(String),
    #[error("transport ack failed: {0}")]
    Acknowledge(String),
    #[error("transport disconnect failed: {0}")]
    Disconnect(String),
}

/// Faults that end a run. None of them are retried in-process.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum SocketError {
    #[error("socket mode connection was dropped: {reason}")]
    Disconnected { reason: String },
    #[error(transparent)]
    Transport(#[from] TransportError),
}

impl SocketError {
    /// True for faults raised after the connection was up. A failed connect
    /// fails the same way in a fresh process, so it is not worth a restart.
    pub fn is_restartable(&self) -> bool {
        !matches!(self, Self::Transport(TransportError::Connect(_)))
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum RunExit {
    Cancelled,
    /// The transport ended without a fault. `SlackSocketTransport` never does
    /// this while connected: a socket that goes away becomes a `Disconnect`.
    StreamClosed,
}

#[async_trait]
pub trait SocketTransport: Send + Sync {
    async fn connect(&self) -> Result<(), TransportError>;
    async fn next_event(&self) -> Result<Option<InboundEvent>, TransportError>;
    async fn acknowledge(
        &self,
        handle: &AckHandle,
        payload: Option<&AckPayload>,
    ) -> Result<(), TransportError>;
    async fn disconnect(&self) -> Result<(), TransportError>;
}

type WsStream = WebSocketStream<MaybeTlsStream<TcpStream>>;

#[derive(Debug, Deserialize)]
struct ConnectionsOpenResponse {
    ok: bool,
    url: Option<String>,
    error: Option<String>,
}

/// Socket Mode over a WebSocket obtained from `apps.connections.open`.
pub struct SlackSocketTransport {
    http: reqwest::Client,
    api_base_url: String,
    app_token: SecretString,
    pending: Mutex<VecDeque<InboundEvent>>,
    writer: Mutex<Option<SplitSink<WsStream, Message>>>,
    reader: Mutex<Option<SplitStream<WsStream>>>,
}

impl SlackSocketTransport {
    pub fn new(
        http: reqwest::Client,
        api_base_url: impl Into<String>,
        app_token: SecretString,
    ) -> Self {
        Self {
            http,
            api_base_url: api_base_url.into(),
            app_token,
            pending: Mutex::new(VecDeque::new()),
            writer: Mutex::new(None),
            reader: Mutex::new(None),
        }
    }

    pub fn from_config(config: &SlackConfig) -> Result<Self, TransportError> {
        let http = reqwest::Client::builder()
            .build()
            .map_err(|error| TransportError::Connect(error.to_string()))?;
        Ok(Self::new(http, config.api_base_url.clone(), config.app_token.clone()))
    }

    async fn open_connection_url(&self) -> Result<String, TransportError> {
        let endpoint = format!("{}/apps.connections.open", self.api_base_url.trim_end_matches('/'));
        let response = self
            .http
            .post(&endpoint)
            .bearer_auth(self.app_token.expose_secret())
            .send()
            .await
            .map_err(|error| TransportError::Connect(error.to_string()))?;
        let body = response
            .json::<ConnectionsOpenResponse>()
            .await
            .map_err(|error| TransportError::Connect(error.to_string()))?;

        if !body.ok {
            return Err(TransportError::Connect(format!(
                "apps.connections.open failed: {}",
                body.error.unwrap_or_else(|| "unknown".to_owned())
            )));
        }
        body.url.ok_or_else(|| {
            TransportError::Connect("apps.connections.open returned no url".to_owned())
        })
    }

    /// Unparseable frames are not delivered, but an envelope that can still be
    /// identified is acked so Slack stops redelivering it.
    async fn drop_frame(&self, text: &str, error: &FrameError) {
        let envelope = envelope_of(text);
        warn!(
            event_name = "ingress.slack.frame_dropped",
            error = %error,
            envelope_id = envelope.as_ref().map(AckHandle::envelope_id),
            "dropping unparseable socket mode frame"
        );

        let Some(handle) = envelope else {
            return;
        };
        if let Err(error) = self.acknowledge(&handle, None).await {
            warn!(
                event_name = "ingress.slack.ack_sent",
                envelope_id = %handle.envelope_id(),
                error = %error,
                "failed to acknowledge dropped frame"
            );
        }
    }

    async fn send_message(&self, message: Message) -> Result<(), TransportError> {
        let mut writer = self.writer.lock().await;
        let Some(sink) = writer.as_mut() else {
            return Err(TransportError::Acknowledge("socket is not connected".to_owned()));
        };
        sink.send(message).await.map_err(|error| TransportError::Acknowledge(error.to_string()))
    }
}

#[async_trait]
impl SocketTransport for SlackSocketTransport {
    async fn connect(&self) -> Result<(), TransportError> {
        self.pending.lock().await.push_back(InboundEvent::Connecting);

        let url = self.open_connection_url().await?;
        let (stream, _) = tokio_tungstenite::connect_async(url.as_str())
            .await
            .map_err(|error| TransportError::Connect(error.to_string()))?;
        let (sink, source) = stream.split();
        *self.writer.lock().await = Some(sink);
        *self.reader.lock().await = Some(source);
        Ok(())
    }

    async fn next_event(&self) -> Result<Option<InboundEvent>, TransportError> {
        if let Some(event) = self.pending.lock().await.pop_front() {
            return Ok(Some(event));
        }

        loop {
            let frame = {
                let mut reader = self.reader.lock().await;
                let Some(source) = reader.as_mut() else {
                    return Ok(None);
                };
                source.next().await
            };

            match frame {
                Some(Ok(Message::Text(text))) => match parse_frame(text.as_str()) {
                    Ok(event) => return Ok(Some(event)),
                    Err(error) => self.drop_frame(text.as_str(), &error).await,
                },
                Some(Ok(Message::Ping(data))) => {
                    if let Err(error) = self.send_message(Message::Pong(data)).await {
                        warn!(error = %error, "failed to answer socket mode ping");
                    }
                }
                Some(Ok(Message::Close(frame))) => {
                    let reason = frame
                        .map(|frame| frame.reason.as_str().to_owned())
                        .filter(|reason| !reason.is_empty())
                        .unwrap_or_else(|| "closed by server".to_owned());
                    return Ok(Some(InboundEvent::Disconnect { reason }));
                }
                Some(Ok(_)) => {}
                Some(Err(error)) => return Err(TransportError::Receive(error.to_string())),
                None => {
                    return Ok(Some(InboundEvent::Disconnect {
                        reason: "stream ended without close frame".to_owned(),
                    }));
                }
            }
        }
    }

    async fn acknowledge(
        &self,
        handle: &AckHandle,
        payload: Option<&AckPayload>,
    ) -> Result<(), TransportError> {
        let frame = ack_frame(handle, payload).to_string();
        self.send_message(Message::Text(frame.into())).await
    }

    async fn disconnect(&self) -> Result<(), TransportError> {
        self.reader.lock().await.take();
        let Some(mut sink) = self.writer.lock().await.take() else {
            return Ok(());
        };
        sink.close().await.map_err(|error| TransportError::Disconnect(error.to_string()))
    }
}

/// Counts handler tasks that were spawned but have not finished.
#[derive(Clone, Debug, Default)]
pub struct DispatchTracker {
    in_flight: Arc<AtomicUsize>,
}

impl DispatchTracker {
    pub fn pending(&self) -> usize {
        self.in_flight.load(Ordering::SeqCst)
    }

    fn begin(&self) -> DispatchGuard {
        self.in_flight.fetch_add(1, Ordering::SeqCst);
        DispatchGuard { in_flight: self.in_flight.clone() }
    }
}

struct DispatchGuard {
    in_flight: Arc<AtomicUsize>,
}

impl Drop for DispatchGuard {
    fn drop(&mut self) {
        self.in_flight.fetch_sub(1, Ordering::SeqCst);
    }
}

/// Drains the event stream, acknowledges in arrival order and hands slash
/// commands to the handler on their own tasks.
///
/// Handler tasks are never awaited. When `run` returns, commands that are
/// still in flight are abandoned along with the process; the count is logged.
pub struct SocketModeRunner {
    transport: Arc<dyn SocketTransport>,
    handler: Arc<dyn CommandHandler>,
    dispatches: DispatchTracker,
}

impl SocketModeRunner {
    pub fn new(transport: Arc<dyn SocketTransport>, handler: Arc<dyn CommandHandler>) -> Self {
        Self { transport, handler, dispatches: DispatchTracker::default() }
    }

    pub fn pending_dispatches(&self) -> usize {
        self.dispatches.pending()
    }

    pub async fn run(&self, cancel: CancellationToken) -> Result<RunExit, SocketError> {
        let result = match self.transport.connect().await {
            Ok(()) => self.pump(&cancel).await,
            Err(error) => Err(SocketError::from(error)),
        };

        if let Err(error) = self.transport.disconnect().await {
            warn!(
                event_name = "ingress.slack.release_failed",
                error = %error,
                "failed to release socket mode transport"
            );
        }

        let abandoned = self.pending_dispatches();
        if abandoned > 0 {
            warn!(
                event_name = "ingress.slack.dispatches_abandoned",
                abandoned,
                "event loop stopped with command dispatches still in flight"
            );
        }

        result
    }

    async fn pump(&self, cancel: &CancellationToken) -> Result<RunExit, SocketError> {
        loop {
            let next = tokio::select! {
                biased;
                _ = cancel.cancelled() => {
                    info!(event_name = "ingress.slack.cancelled", "event loop cancelled");
                    return Ok(RunExit::Cancelled);
                }
                next = self.transport.next_event() => next?,
            };

            let Some(event) = next else {
                info!(event_name = "ingress.slack.stream_closed", "socket mode stream closed");
                return Ok(RunExit::StreamClosed);
            };

            self.classify(event).await?;
        }
    }

    async fn classify(&self, event: InboundEvent) -> Result<(), SocketError> {
        match event {
            InboundEvent::Connecting => {
                info!(event_name = "ingress.slack.connecting", "connecting to Slack with Socket Mode");
            }
            InboundEvent::Connected => {
                info!(event_name = "ingress.slack.connected", "connected to Slack with Socket Mode");
            }
            InboundEvent::Disconnect { reason } => {
                warn!(
                    event_name = "ingress.slack.disconnected",
                    reason = %reason,
                    "socket mode disconnected; escalating for restart"
                );
                return Err(SocketError::Disconnected { reason });
            }
            InboundEvent::Interactive { ack, callback } => {
                self.acknowledge(&ack, None).await;
                info!(
                    event_name = "ingress.slack.interactive",
                    envelope_id = %ack.envelope_id(),
                    kind = ?callback.kind,
                    actions = ?callback.action_ids,
                    "received interactive callback"
                );
            }
            InboundEvent::SlashCommand { ack, command } => {
                info!(
                    event_name = "ingress.slack.slash_command",
                    envelope_id = %ack.envelope_id(),
                    command = %command.command,
                    user_name = %command.user_name,
                    user_id = %command.user_id,
                    "received slash command"
                );
                self.acknowledge(&ack, Some(&AckPayload::processing(&command))).await;

                let handler = self.handler.clone();
                let guard = self.dispatches.begin();
                tokio::spawn(async move {
                    let _guard = guard;
                    handler.handle(command).await;
                });
            }
            InboundEvent::Unsupported { event_type } => {
                info!(
                    event_name = "ingress.slack.ignored",
                    event_type = %event_type,
                    "ignored unsupported socket mode event"
                );
            }
        }

        Ok(())
    }

    async fn acknowledge(&self, ack: &AckHandle, payload: Option<&AckPayload>) {
        match self.transport.acknowledge(ack, payload).await {
            Ok(()) => debug!(
                event_name = "ingress.slack.ack_sent",
                envelope_id = %ack.envelope_id(),
                "acknowledged socket mode envelope"
            ),
            Err(error) => warn!(
                event_name = "ingress.slack.ack_sent",
                envelope_id = %ack.envelope_id(),
                error = %error,
                "failed to acknowledge socket mode envelope"
            ),
        }
    }
}
