//! Scripted remote provider for tests.
//!
//! Each successful `open` hands the test a [`RemoteEnd`]: the far side of
//! in-memory pipes standing in for the remote shell's output and input.

use std::sync::{
    Arc, Mutex,
    atomic::{AtomicUsize, Ordering},
};

use async_trait::async_trait;
use tokio::{io::DuplexStream, sync::mpsc};

use crate::{
    RemoteTarget, TerminalGeometry,
    traits::{ProcessControl, RemoteError, RemoteProcess, RemoteSessionProvider},
};

const PIPE_CAPACITY: usize = 64 * 1024;

/// Far side of a scripted remote process.
pub struct RemoteEnd {
    /// Write here to produce remote output; drop to signal end-of-stream.
    pub output: DuplexStream,
    /// Read here to observe what the bridge wrote to the remote input.
    pub input: DuplexStream,
    /// Geometry the bridge asked for.
    pub geometry: TerminalGeometry,
}

/// How `open` behaves.
enum Script {
    Succeed,
    Fail(Mutex<Option<RemoteError>>),
    Hang,
}

/// Remote provider backed by in-memory pipes.
pub struct ScriptedProvider {
    script: Script,
    ends: mpsc::UnboundedSender<RemoteEnd>,
    opens: AtomicUsize,
    terminations: Arc<AtomicUsize>,
}

impl ScriptedProvider {
    /// A provider whose opens succeed.
    #[must_use]
    pub fn new() -> (Self, mpsc::UnboundedReceiver<RemoteEnd>) {
        Self::with_script(Script::Succeed)
    }

    /// A provider whose first open fails with `error`.
    #[must_use]
    pub fn failing(error: RemoteError) -> Self {
        Self::with_script(Script::Fail(Mutex::new(Some(error)))).0
    }

    /// A provider whose opens never complete.
    #[must_use]
    pub fn hanging() -> Self {
        Self::with_script(Script::Hang).0
    }

    fn with_script(script: Script) -> (Self, mpsc::UnboundedReceiver<RemoteEnd>) {
        let (ends, ends_rx) = mpsc::unbounded_channel();
        let provider = Self {
            script,
            ends,
            opens: AtomicUsize::new(0),
            terminations: Arc::new(AtomicUsize::new(0)),
        };
        (provider, ends_rx)
    }

    /// Number of termination signals delivered so far.
    #[must_use]
    pub fn terminations(&self) -> usize {
        self.terminations.load(Ordering::SeqCst)
    }

    /// Number of open attempts.
    #[must_use]
    pub fn opens(&self) -> usize {
        self.opens.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl RemoteSessionProvider for ScriptedProvider {
    async fn open(
        &self,
        target: &RemoteTarget,
        geometry: &TerminalGeometry,
    ) -> Result<RemoteProcess, RemoteError> {
        self.opens.fetch_add(1, Ordering::SeqCst);
        match &self.script {
            Script::Succeed => {}
            Script::Fail(error) => {
                let error = error
                    .lock()
                    .ok()
                    .and_then(|mut slot| slot.take())
                    .unwrap_or_else(|| RemoteError::Network("scripted failure".into()));
                return Err(error);
            }
            Script::Hang => std::future::pending::<()>().await,
        }

        let (output, remote_output) = tokio::io::duplex(PIPE_CAPACITY);
        let (input, remote_input) = tokio::io::duplex(PIPE_CAPACITY);

        let _ = self.ends.send(RemoteEnd {
            output: remote_output,
            input: remote_input,
            geometry: geometry.clone(),
        });

        Ok(RemoteProcess {
            output: Box::new(output),
            input: Box::new(input),
            control: Box::new(CountingControl {
                terminations: Arc::clone(&self.terminations),
            }),
            host: target.host.clone(),
        })
    }
}

/// Process control that only counts termination signals.
struct CountingControl {
    terminations: Arc<AtomicUsize>,
}

impl ProcessControl for CountingControl {
    fn terminate(&mut self) -> Result<(), RemoteError> {
        self.terminations.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }
}
