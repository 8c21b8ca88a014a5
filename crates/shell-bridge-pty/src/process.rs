//! Async adapters over blocking PTY handles.
//!
//! `portable-pty` hands out blocking `Read`/`Write` objects. Reads run on a
//! dedicated blocking task feeding a channel; each write runs on the
//! blocking pool and is flushed before it completes.

use std::{
    future::Future,
    io::{self, Read, Write},
    pin::Pin,
    task::{Context, Poll, ready},
};

use bytes::Bytes;
use portable_pty::{ChildKiller, MasterPty};
use shell_bridge_core::{ProcessControl, RemoteError};
use tokio::{
    io::{AsyncRead, AsyncWrite, ReadBuf},
    sync::mpsc,
    task::JoinHandle,
};

/// Chunks buffered between the reader task and the consumer.
const READ_QUEUE_DEPTH: usize = 32;

/// Remote output read from the PTY master.
pub struct PtyOutput {
    rx: mpsc::Receiver<io::Result<Bytes>>,
    pending: Bytes,
}

impl PtyOutput {
    /// Start reading `reader` in `chunk_size` pieces on the blocking pool.
    #[must_use]
    pub fn spawn(mut reader: Box<dyn Read + Send>, chunk_size: usize) -> Self {
        let (tx, rx) = mpsc::channel(READ_QUEUE_DEPTH);

        tokio::task::spawn_blocking(move || {
            let mut buf = vec![0u8; chunk_size.max(1)];
            loop {
                match reader.read(&mut buf) {
                    Ok(0) => break,
                    Ok(n) => {
                        if tx.blocking_send(Ok(Bytes::copy_from_slice(&buf[..n]))).is_err() {
                            break;
                        }
                    }
                    Err(e) if e.kind() == io::ErrorKind::Interrupted => {}
                    Err(e) if is_hangup(&e) => break,
                    Err(e) => {
                        let _ = tx.blocking_send(Err(e));
                        break;
                    }
                }
            }
            tracing::debug!("PTY reader finished");
        });

        Self {
            rx,
            pending: Bytes::new(),
        }
    }

    /// Put `data` back in front of the unread output.
    pub fn unread(&mut self, data: Bytes) {
        if self.pending.is_empty() {
            self.pending = data;
        } else {
            let mut joined = data.to_vec();
            joined.extend_from_slice(&self.pending);
            self.pending = Bytes::from(joined);
        }
    }
}

/// Linux reports EIO on the master once the slave side is gone.
fn is_hangup(err: &io::Error) -> bool {
    cfg!(unix) && err.raw_os_error() == Some(5)
}

impl AsyncRead for PtyOutput {
    fn poll_read(
        mut self: Pin<&mut Self>,
        cx: &mut Context<'_>,
        buf: &mut ReadBuf<'_>,
    ) -> Poll<io::Result<()>> {
        while self.pending.is_empty() {
            match ready!(self.rx.poll_recv(cx)) {
                Some(Ok(chunk)) => self.pending = chunk,
                Some(Err(e)) => return Poll::Ready(Err(e)),
                // End of stream: leave `buf` untouched.
                None => return Poll::Ready(Ok(())),
            }
        }

        let n = buf.remaining().min(self.pending.len());
        let chunk = self.pending.split_to(n);
        buf.put_slice(&chunk);
        Poll::Ready(Ok(()))
    }
}

type Writer = Box<dyn Write + Send>;

enum WriteState {
    Idle(Option<Writer>),
    Busy(JoinHandle<(io::Result<usize>, Writer)>),
}

/// Remote input written to the PTY master.
pub struct PtyInput {
    state: WriteState,
}

impl PtyInput {
    /// Wrap a blocking PTY writer.
    #[must_use]
    pub fn new(writer: Writer) -> Self {
        Self {
            state: WriteState::Idle(Some(writer)),
        }
    }

    fn poll_in_flight(&mut self, cx: &mut Context<'_>) -> Poll<io::Result<usize>> {
        let WriteState::Busy(handle) = &mut self.state else {
            return Poll::Ready(Ok(0));
        };
        let (result, writer) = match ready!(Pin::new(handle).poll(cx)) {
            Ok(done) => done,
            Err(e) => return Poll::Ready(Err(io::Error::other(e))),
        };
        self.state = WriteState::Idle(Some(writer));
        Poll::Ready(result)
    }
}

impl AsyncWrite for PtyInput {
    fn poll_write(
        self: Pin<&mut Self>,
        cx: &mut Context<'_>,
        buf: &[u8],
    ) -> Poll<io::Result<usize>> {
        let this = self.get_mut();
        if let WriteState::Idle(slot) = &mut this.state {
            let Some(mut writer) = slot.take() else {
                return Poll::Ready(Err(io::Error::from(io::ErrorKind::BrokenPipe)));
            };
            let data = buf.to_vec();
            this.state = WriteState::Busy(tokio::task::spawn_blocking(move || {
                let result = writer
                    .write_all(&data)
                    .and_then(|()| writer.flush())
                    .map(|()| data.len());
                (result, writer)
            }));
        }
        this.poll_in_flight(cx)
    }

    fn poll_flush(self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<io::Result<()>> {
        // Every write is flushed on the blocking pool before it completes.
        self.get_mut().poll_in_flight(cx).map_ok(|_| ())
    }

    fn poll_shutdown(self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<io::Result<()>> {
        self.poll_flush(cx)
    }
}

/// Termination handle for an SSH client running in a PTY.
///
/// Dropping the handle terminates the client if that has not happened yet.
pub struct PtyControl {
    killer: Box<dyn ChildKiller + Send + Sync>,
    master: Option<Box<dyn MasterPty + Send>>,
    pid: Option<u32>,
}

impl PtyControl {
    /// Create a control handle. The master is released on terminate.
    #[must_use]
    pub fn new(
        killer: Box<dyn ChildKiller + Send + Sync>,
        master: Box<dyn MasterPty + Send>,
        pid: Option<u32>,
    ) -> Self {
        Self {
            killer,
            master: Some(master),
            pid,
        }
    }
}

impl ProcessControl for PtyControl {
    fn terminate(&mut self) -> Result<(), RemoteError> {
        let Some(master) = self.master.take() else {
            return Ok(());
        };
        tracing::debug!(pid = ?self.pid, "Terminating SSH client");
        let result = self.killer.kill();
        drop(master);
        match result {
            Ok(()) => Ok(()),
            Err(e) if is_already_gone(&e) => Ok(()),
            Err(e) => Err(RemoteError::Io(e)),
        }
    }
}

impl Drop for PtyControl {
    fn drop(&mut self) {
        if let Err(e) = self.terminate() {
            tracing::warn!(pid = ?self.pid, "Failed to terminate SSH client: {e}");
        }
    }
}

/// The child already exited (and may have been reaped).
fn is_already_gone(err: &io::Error) -> bool {
    // ESRCH
    err.kind() == io::ErrorKind::InvalidInput || (cfg!(unix) && err.raw_os_error() == Some(3))
}

#[cfg(test)]
mod tests {
    use std::sync::{Arc, Mutex};

    use tokio::io::{AsyncReadExt, AsyncWriteExt};

    use super::*;

    #[derive(Clone, Default)]
    struct SharedBuf(Arc<Mutex<Vec<u8>>>);

    impl Write for SharedBuf {
        fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
            self.0.lock().unwrap().extend_from_slice(buf);
            Ok(buf.len())
        }

        fn flush(&mut self) -> io::Result<()> {
            Ok(())
        }
    }

    struct FailingReader;

    impl Read for FailingReader {
        fn read(&mut self, _buf: &mut [u8]) -> io::Result<usize> {
            Err(io::Error::new(io::ErrorKind::ConnectionReset, "reset"))
        }
    }

    #[tokio::test]
    async fn test_output_preserves_bytes_across_chunks() {
        let data: Vec<u8> = (0..=255u8).cycle().take(10_000).collect();
        let mut output = PtyOutput::spawn(Box::new(io::Cursor::new(data.clone())), 4096);

        let mut received = Vec::new();
        output.read_to_end(&mut received).await.unwrap();
        assert_eq!(received, data);
    }

    #[tokio::test]
    async fn test_output_small_reads() {
        let mut output = PtyOutput::spawn(Box::new(io::Cursor::new(b"file1\nfile2\n".to_vec())), 4096);

        let mut first = [0u8; 4];
        output.read_exact(&mut first).await.unwrap();
        assert_eq!(&first, b"file");

        let mut rest = Vec::new();
        output.read_to_end(&mut rest).await.unwrap();
        assert_eq!(rest, b"1\nfile2\n");
    }

    #[tokio::test]
    async fn test_output_surfaces_read_error() {
        let mut output = PtyOutput::spawn(Box::new(FailingReader), 16);
        let mut buf = [0u8; 16];
        let err = output.read(&mut buf).await.unwrap_err();
        assert_eq!(err.kind(), io::ErrorKind::ConnectionReset);
    }

    #[tokio::test]
    async fn test_input_writes_in_order() {
        let sink = SharedBuf::default();
        let mut input = PtyInput::new(Box::new(sink.clone()));

        input.write_all(b"\n").await.unwrap();
        input.write_all(b"ls\n").await.unwrap();
        input.flush().await.unwrap();

        assert_eq!(sink.0.lock().unwrap().as_slice(), b"\nls\n");
    }

    #[tokio::test]
    async fn test_unread_comes_first() {
        let mut output = PtyOutput::spawn(Box::new(io::Cursor::new(b"$ ".to_vec())), 16);
        output.unread(Bytes::from_static(b"motd\r\n"));

        let mut received = Vec::new();
        output.read_to_end(&mut received).await.unwrap();
        assert_eq!(received, b"motd\r\n$ ");
    }

    #[test]
    fn test_already_gone_detection() {
        assert!(is_already_gone(&io::Error::from(io::ErrorKind::InvalidInput)));
        assert_eq!(is_already_gone(&io::Error::from_raw_os_error(3)), cfg!(unix));
        assert!(!is_already_gone(&io::Error::from(io::ErrorKind::PermissionDenied)));
    }

    #[test]
    fn test_hangup_detection() {
        let eio = io::Error::from_raw_os_error(5);
        assert_eq!(is_hangup(&eio), cfg!(unix));
        assert!(!is_hangup(&io::Error::from(io::ErrorKind::Other)));
    }
}
