//! Bridge session: one client channel, one remote shell.

use std::{sync::Arc, time::Duration};

use shell_bridge_core::{
    BridgeConfig, RemoteError, RemoteProcess, RemoteSessionProvider, RemoteTarget, SessionId,
    StatusMessage, TerminalGeometry, Transport, TransportSender,
    protocol::{CONNECTING_MESSAGE, INTERNAL_ERROR, NORMAL_CLOSURE},
};
use shell_bridge_telemetry::lifecycle::record_result;
use thiserror::Error;
use tokio::sync::watch;
use tracing::{Instrument, Span, field::Empty};
use uuid::Uuid;

use crate::{
    pump::{self, PumpSide},
    registry::{Registration, SessionRegistry},
    state::SessionState,
    teardown::Teardown,
};

/// Failure visible outside a session.
#[derive(Debug, Error)]
pub enum SessionError {
    #[error("Failed to open remote session: {0}")]
    Open(#[from] RemoteError),
}

/// Why an established session ended.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EndReason {
    /// The remote output reached end-of-stream.
    RemoteEof,
    /// Reading from or writing to the remote process failed.
    RemoteFailed,
    /// The client went away.
    ClientDisconnected { code: u16 },
    /// The client channel failed.
    TransportFailed,
}

/// Outcome of a session that got past opening.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SessionSummary {
    pub id: SessionId,
    pub host: Option<String>,
    pub end: EndReason,
    pub bytes_to_client: u64,
    pub bytes_to_remote: u64,
}

/// Per-session settings.
#[derive(Debug, Clone)]
pub struct SessionSettings {
    pub target: RemoteTarget,
    pub geometry: TerminalGeometry,
    pub connect_timeout: Duration,
    pub chunk_size: usize,
}

impl SessionSettings {
    /// Settings from the bridge configuration.
    #[must_use]
    pub fn from_config(config: &BridgeConfig) -> Self {
        Self {
            target: config.remote.target.clone(),
            geometry: config.terminal.clone(),
            connect_timeout: config.remote.connect_timeout(),
            chunk_size: config.session.chunk_size,
        }
    }
}

impl Default for SessionSettings {
    fn default() -> Self {
        Self::from_config(&BridgeConfig::default())
    }
}

/// Pairs one client transport with one remote process.
pub struct BridgeSession {
    id: SessionId,
    provider: Arc<dyn RemoteSessionProvider>,
    settings: SessionSettings,
    registry: Option<SessionRegistry>,
}

/// State machine plus its mirror in the registry.
struct Tracker {
    state: SessionState,
    registration: Option<Registration>,
}

impl Tracker {
    fn advance(&mut self, next: SessionState) {
        match self.state.advance(next) {
            Ok(()) => {
                if let Some(registration) = &self.registration {
                    registration.set_state(next);
                }
            }
            Err(e) => tracing::error!("{e}"),
        }
    }
}

impl BridgeSession {
    /// Create a session with a fresh id.
    #[must_use]
    pub fn new(provider: Arc<dyn RemoteSessionProvider>, settings: SessionSettings) -> Self {
        Self {
            id: Uuid::new_v4(),
            provider,
            settings,
            registry: None,
        }
    }

    /// Track the session in `registry` while it runs.
    #[must_use]
    pub fn with_registry(mut self, registry: SessionRegistry) -> Self {
        self.registry = Some(registry);
        self
    }

    /// Session id.
    #[must_use]
    pub const fn id(&self) -> SessionId {
        self.id
    }

    /// Drive the session over `transport` until it ends.
    ///
    /// Every failure after the remote process opened ends the session
    /// normally and is reported in the summary.
    ///
    /// # Errors
    /// Returns error if the remote process could not be opened. The client
    /// has then already been told and the channel closed.
    pub async fn run<T: Transport>(self, transport: T) -> Result<SessionSummary, SessionError> {
        let id = self.id;
        let host = self.settings.target.host.clone();
        tracing::Span::current().record("session_id", tracing::field::display(id));

        let mut tracker = Tracker {
            state: SessionState::Connecting,
            registration: self.registry.as_ref().map(|registry| registry.register(id)),
        };
        let (mut sender, mut receiver) = transport.split();

        let greeted = match sender.accept().await {
            Ok(()) => sender.send(StatusMessage::new(CONNECTING_MESSAGE).to_outbound()).await,
            Err(e) => Err(e),
        };
        if let Err(e) = greeted {
            tracing::info!(session_id = %id, "Client left before the session started: {e}");
            tracker.advance(SessionState::Closed);
            return Ok(SessionSummary {
                id,
                host: None,
                end: EndReason::TransportFailed,
                bytes_to_client: 0,
                bytes_to_remote: 0,
            });
        }

        tracing::info!(
            session_id = %id,
            destination = %self.settings.target.destination(),
            port = self.settings.target.port,
            "Opening remote session"
        );

        let process = match self.open().await {
            Ok(process) => process,
            Err(e) => {
                tracing::error!(session_id = %id, host = %host, "SSH error: {e}");
                if let Err(send_err) = sender.send(StatusMessage::error(&e).to_outbound()).await {
                    tracing::debug!("Error message not delivered: {send_err}");
                }
                Teardown::new(None)
                    .run(&mut sender, INTERNAL_ERROR)
                    .instrument(drain_span(INTERNAL_ERROR))
                    .await;
                tracker.advance(SessionState::Closed);
                return Err(SessionError::Open(e));
            }
        };

        let RemoteProcess {
            mut output,
            mut input,
            control,
            host: remote_host,
        } = process;
        let mut teardown = Teardown::new(Some(control));

        tracker.advance(SessionState::Established);
        if let Some(registration) = &tracker.registration {
            registration.set_host(&remote_host);
        }
        tracing::Span::current().record("host", remote_host.as_str());
        tracing::info!(session_id = %id, host = %remote_host, "Remote session established");
        if let Err(e) = sender
            .send(StatusMessage::connected(&remote_host).to_outbound())
            .await
        {
            tracing::debug!("Connected message not delivered: {e}");
        }

        let mut bytes_to_client = 0;
        let mut bytes_to_remote = 0;
        let (done_tx, done_rx) = watch::channel(None);
        let (outbound, inbound) = tokio::join!(
            pump::race(
                PumpSide::Outbound,
                pump::outbound(
                    &mut output,
                    &mut sender,
                    self.settings.chunk_size,
                    &mut bytes_to_client,
                ),
                &done_tx,
                done_rx.clone(),
            ),
            pump::race(
                PumpSide::Inbound,
                pump::inbound(&mut receiver, &mut input, &mut bytes_to_remote),
                &done_tx,
                done_rx.clone(),
            ),
        );

        let first = *done_rx.borrow();
        let end = match first {
            Some(PumpSide::Inbound) => inbound.or(outbound),
            _ => outbound.or(inbound),
        }
        .unwrap_or(EndReason::TransportFailed);

        tracker.advance(SessionState::Draining);
        tracing::info!(session_id = %id, ?end, bytes_to_client, bytes_to_remote, "Session draining");

        let client_gone = matches!(end, EndReason::ClientDisconnected { .. });
        if client_gone {
            teardown.client_gone();
        }
        let drain = drain_span(NORMAL_CLOSURE);
        drain.record("client_gone", client_gone);
        drain.record("bytes_to_client", bytes_to_client);
        drain.record("bytes_to_remote", bytes_to_remote);
        teardown
            .run(&mut sender, NORMAL_CLOSURE)
            .instrument(drain)
            .await;
        drop(input);
        drop(output);
        tracker.advance(SessionState::Closed);
        tracing::info!(session_id = %id, "Session closed");

        Ok(SessionSummary {
            id,
            host: Some(remote_host),
            end,
            bytes_to_client,
            bytes_to_remote,
        })
    }

    async fn open(&self) -> Result<RemoteProcess, RemoteError> {
        let target = &self.settings.target;
        let span = tracing::info_span!(
            "remote.open",
            otel.kind = "client",
            host = %target.host,
            port = target.port,
            username = %target.username,
            otel.status_code = Empty,
            otel.status_message = Empty,
        );

        let timeout = self.settings.connect_timeout;
        let open = self.provider.open(target, &self.settings.geometry);
        let result = tokio::time::timeout(timeout, open)
            .instrument(span.clone())
            .await
            .unwrap_or(Err(RemoteError::Timeout(timeout)));
        record_result(&span, &result);
        result
    }
}

/// Span covering the release of a session's resources.
fn drain_span(code: u16) -> Span {
    tracing::info_span!(
        "session.drain",
        ws.code = code,
        client_gone = Empty,
        bytes_to_client = Empty,
        bytes_to_remote = Empty,
    )
}
