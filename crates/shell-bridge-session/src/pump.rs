//! The two byte pumps of a session.
//!
//! Each pump runs until its direction reaches a terminal condition and
//! reports why. [`race`] lets the first finisher cancel the other one.

use std::future::Future;

use bytes::Bytes;
use shell_bridge_core::{
    OutboundMessage, TransportEvent, TransportReceiver, TransportSender,
    protocol::ABNORMAL_CLOSURE,
};
use tokio::{
    io::{AsyncRead, AsyncReadExt, AsyncWrite, AsyncWriteExt},
    sync::watch,
};
use tracing::{Instrument, field::Empty};

use crate::bridge::EndReason;

/// Which pump.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PumpSide {
    /// Remote output to client.
    Outbound,
    /// Client input to remote.
    Inbound,
}

impl PumpSide {
    /// Name used in spans and logs.
    #[must_use]
    pub const fn name(self) -> &'static str {
        match self {
            Self::Outbound => "outbound",
            Self::Inbound => "inbound",
        }
    }
}

/// Forward remote output to the client as binary frames, chunk by chunk.
pub async fn outbound<R, S>(
    output: &mut R,
    sender: &mut S,
    chunk_size: usize,
    forwarded: &mut u64,
) -> EndReason
where
    R: AsyncRead + Unpin + ?Sized,
    S: TransportSender,
{
    let mut buf = vec![0u8; chunk_size.max(1)];
    loop {
        let n = match output.read(&mut buf).await {
            Ok(0) => return EndReason::RemoteEof,
            Ok(n) => n,
            Err(e) => {
                tracing::warn!("Remote output failed: {e}");
                return EndReason::RemoteFailed;
            }
        };

        let chunk = Bytes::copy_from_slice(&buf[..n]);
        if let Err(e) = sender.send(OutboundMessage::Binary(chunk)).await {
            tracing::debug!("Client send failed: {e}");
            return EndReason::TransportFailed;
        }
        *forwarded += n as u64;
    }
}

/// Forward client frames to the remote input.
///
/// Writes a single newline first so the remote shell prints its prompt
/// without waiting for a keystroke.
pub async fn inbound<R, W>(receiver: &mut R, input: &mut W, forwarded: &mut u64) -> EndReason
where
    R: TransportReceiver,
    W: AsyncWrite + Unpin + ?Sized,
{
    if let Err(e) = write_flushed(input, b"\n").await {
        tracing::warn!("Remote input failed: {e}");
        return EndReason::RemoteFailed;
    }

    loop {
        let data = match receiver.recv().await {
            Some(Ok(TransportEvent::Text(text))) => text.into_bytes(),
            Some(Ok(TransportEvent::Binary(data))) => {
                String::from_utf8_lossy(&data).into_owned().into_bytes()
            }
            Some(Ok(TransportEvent::Connect)) => continue,
            Some(Ok(TransportEvent::Disconnect { code })) => {
                return EndReason::ClientDisconnected { code };
            }
            Some(Err(e)) => {
                tracing::debug!("Client receive failed: {e}");
                return EndReason::TransportFailed;
            }
            None => {
                return EndReason::ClientDisconnected {
                    code: ABNORMAL_CLOSURE,
                };
            }
        };

        if let Err(e) = write_flushed(input, &data).await {
            tracing::warn!("Remote input failed: {e}");
            return EndReason::RemoteFailed;
        }
        *forwarded += data.len() as u64;
    }
}

async fn write_flushed<W>(input: &mut W, data: &[u8]) -> std::io::Result<()>
where
    W: AsyncWrite + Unpin + ?Sized,
{
    input.write_all(data).await?;
    input.flush().await
}

/// Run `pump` until it finishes or the other side finished first.
///
/// The first finisher is published on `done`; a pump cancelled through
/// `stop` yields `None`. Each run is one `remote.pump` span.
pub async fn race<F>(
    side: PumpSide,
    pump: F,
    done: &watch::Sender<Option<PumpSide>>,
    mut stop: watch::Receiver<Option<PumpSide>>,
) -> Option<EndReason>
where
    F: Future<Output = EndReason>,
{
    let span = tracing::info_span!("remote.pump", pump.side = side.name(), pump.end = Empty);

    let outcome = async {
        tokio::select! {
            reason = pump => {
                done.send_if_modified(|first| {
                    if first.is_none() {
                        *first = Some(side);
                        true
                    } else {
                        false
                    }
                });
                Some(reason)
            }
            _ = stop.wait_for(Option::is_some) => {
                tracing::debug!(side = side.name(), "Pump cancelled");
                None
            }
        }
    }
    .instrument(span.clone())
    .await;

    match outcome {
        Some(reason) => span.record("pump.end", tracing::field::debug(reason)),
        None => span.record("pump.end", "cancelled"),
    };
    outcome
}
