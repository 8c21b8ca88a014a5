//! Idempotent session teardown.

use shell_bridge_core::{ProcessControl, TransportSender};

/// Releases the remote process and the channel, each at most once.
///
/// Safe to run on a session whose remote process never opened. Dropping a
/// teardown that never ran still terminates the remote process.
pub struct Teardown {
    control: Option<Box<dyn ProcessControl>>,
    client_gone: bool,
    done: bool,
}

impl Teardown {
    /// Create a teardown for an optional remote process.
    #[must_use]
    pub fn new(control: Option<Box<dyn ProcessControl>>) -> Self {
        Self {
            control,
            client_gone: false,
            done: false,
        }
    }

    /// The client already left; no close frame will be sent.
    pub const fn client_gone(&mut self) {
        self.client_gone = true;
    }

    /// Whether teardown has run.
    #[must_use]
    pub const fn is_done(&self) -> bool {
        self.done
    }

    /// Terminate the remote process and close the channel with `code`.
    /// Later calls do nothing.
    pub async fn run<S: TransportSender>(&mut self, sender: &mut S, code: u16) {
        if self.done {
            return;
        }
        self.done = true;

        if let Some(mut control) = self.control.take() {
            if let Err(e) = control.terminate() {
                tracing::warn!("Failed to terminate remote process: {e}");
            }
        }

        if !self.client_gone {
            if let Err(e) = sender.close(code).await {
                tracing::debug!(code, "Close frame not sent: {e}");
            }
        }
    }
}

impl Drop for Teardown {
    fn drop(&mut self) {
        if self.done {
            return;
        }
        if let Some(mut control) = self.control.take() {
            tracing::debug!("Session dropped before teardown, terminating remote process");
            if let Err(e) = control.terminate() {
                tracing::warn!("Failed to terminate remote process: {e}");
            }
        }
    }
}
