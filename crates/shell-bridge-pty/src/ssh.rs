//! Remote shells through the system SSH client.

use std::time::Duration;

use async_trait::async_trait;
use portable_pty::{CommandBuilder, PtySize, native_pty_system};
use shell_bridge_core::{
    RemoteError, RemoteProcess, RemoteSessionProvider, RemoteTarget, TerminalGeometry,
    config::RemoteConfig,
};
use tokio::sync::oneshot;

use crate::{
    command::SshCommand,
    process::{PtyControl, PtyInput, PtyOutput},
    ready::{self, READY_MARKER, Startup},
};

/// Default read size for remote output.
pub const DEFAULT_CHUNK_SIZE: usize = 4096;

/// How long to wait for the exit status of a client whose output ended.
const EXIT_STATUS_WAIT: Duration = Duration::from_secs(1);

/// Opens interactive shells by running `ssh` inside a pseudo-terminal.
///
/// `open` resolves once the remote host printed the ready marker. A client
/// that exits first is reported as an authentication, network or timeout
/// error depending on what it printed.
#[derive(Debug, Clone)]
pub struct SshProvider {
    command: SshCommand,
    connect_timeout: Duration,
    chunk_size: usize,
}

impl SshProvider {
    /// Create a provider from the remote settings.
    ///
    /// # Errors
    /// Returns error if the extra client options cannot be parsed.
    pub fn new(config: &RemoteConfig) -> Result<Self, RemoteError> {
        let command = SshCommand::new(config.ssh_program.clone())
            .extend_params_str(&config.ssh_options)?
            .with_remote_command(ready::ready_command(READY_MARKER));
        Ok(Self {
            command,
            connect_timeout: config.connect_timeout(),
            chunk_size: DEFAULT_CHUNK_SIZE,
        })
    }

    /// Override the read size for remote output.
    #[must_use]
    pub fn with_chunk_size(mut self, chunk_size: usize) -> Self {
        self.chunk_size = chunk_size.max(1);
        self
    }
}

#[async_trait]
impl RemoteSessionProvider for SshProvider {
    async fn open(
        &self,
        target: &RemoteTarget,
        geometry: &TerminalGeometry,
    ) -> Result<RemoteProcess, RemoteError> {
        target.validate()?;

        let parts = self.command.build(target, self.connect_timeout);
        tracing::debug!(command = %parts.display(), "Starting SSH client");
        let (program, args) = parts.into_resolved().await?;

        let pty_system = native_pty_system();
        let pair = pty_system
            .openpty(PtySize {
                rows: geometry.rows,
                cols: geometry.cols,
                pixel_width: 0,
                pixel_height: 0,
            })
            .map_err(|e| RemoteError::Spawn(format!("Failed to open PTY: {e}")))?;

        let mut cmd = CommandBuilder::new(program);
        cmd.args(&args);
        cmd.env("TERM", &geometry.term_type);

        let mut child = pair
            .slave
            .spawn_command(cmd)
            .map_err(|e| RemoteError::Spawn(format!("Failed to spawn ssh: {e}")))?;
        // The child holds its own copy of the slave.
        drop(pair.slave);

        let writer = pair
            .master
            .take_writer()
            .map_err(|e| RemoteError::Spawn(format!("Failed to take PTY writer: {e}")))?;
        let reader = pair
            .master
            .try_clone_reader()
            .map_err(|e| RemoteError::Spawn(format!("Failed to clone PTY reader: {e}")))?;

        let pid = child.process_id();
        let mut output = PtyOutput::spawn(reader, self.chunk_size);
        // Dropping `control` on any early return kills the client.
        let control = PtyControl::new(child.clone_killer(), pair.master, pid);

        let host = target.host.clone();
        let log_host = host.clone();
        let (exit_tx, exit_rx) = oneshot::channel();
        tokio::task::spawn_blocking(move || {
            let exit_code = match child.wait() {
                Ok(status) => {
                    tracing::debug!(
                        host = %log_host,
                        exit_code = status.exit_code(),
                        "SSH client exited"
                    );
                    Some(status.exit_code())
                }
                Err(e) => {
                    tracing::error!("Failed to wait for SSH client: {e}");
                    None
                }
            };
            let _ = exit_tx.send(exit_code);
        });

        tracing::debug!(host = %host, ?pid, "SSH client started, waiting for the remote shell");
        let startup = tokio::time::timeout(
            self.connect_timeout,
            ready::await_marker(&mut output, READY_MARKER.as_bytes()),
        )
        .await
        .map_err(|_| RemoteError::Timeout(self.connect_timeout))??;

        match startup {
            Startup::Ready(rest) => output.unread(rest),
            Startup::Exited(transcript) => {
                let exit_code = tokio::time::timeout(EXIT_STATUS_WAIT, exit_rx)
                    .await
                    .ok()
                    .and_then(Result::ok)
                    .flatten();
                return Err(ready::classify_failure(
                    &transcript,
                    exit_code,
                    self.connect_timeout,
                ));
            }
        }

        tracing::info!(host = %host, ?pid, "Remote shell ready");

        Ok(RemoteProcess {
            output: Box::new(output),
            input: Box::new(PtyInput::new(writer)),
            control: Box::new(control),
            host,
        })
    }
}

#[cfg(test)]
mod tests {
    use std::path::PathBuf;

    use shell_bridge_core::CredentialRef;

    use super::*;

    fn config(program: &str, options: &str) -> RemoteConfig {
        RemoteConfig {
            ssh_program: program.to_string(),
            ssh_options: options.to_string(),
            ..RemoteConfig::default()
        }
    }

    #[test]
    fn test_bad_options_rejected() {
        assert!(matches!(
            SshProvider::new(&config("ssh", "-o \"unterminated")),
            Err(RemoteError::Spawn(_))
        ));
    }

    #[test]
    fn test_chunk_size_floor() {
        let provider = SshProvider::new(&config("ssh", "")).unwrap().with_chunk_size(0);
        assert_eq!(provider.chunk_size, 1);
    }

    #[test]
    fn test_missing_key_fails_before_spawn() {
        let provider = SshProvider::new(&config("ssh", "")).unwrap();
        let target = RemoteTarget::new("h", "u", PathBuf::from("/nonexistent/key.pem"));

        let result = tokio_test::block_on(provider.open(&target, &TerminalGeometry::default()));
        assert!(matches!(result, Err(RemoteError::Credential(_))));
    }

    #[tokio::test]
    async fn test_missing_client_binary() {
        let provider = SshProvider::new(&config("no-such-ssh-client-binary", "")).unwrap();
        let target = RemoteTarget {
            credential: CredentialRef::Agent,
            ..RemoteTarget::default()
        };

        let err = provider
            .open(&target, &TerminalGeometry::default())
            .await
            .unwrap_err();
        assert!(err.to_string().contains("no-such-ssh-client-binary"));
    }

    #[cfg(unix)]
    mod fake_client {
        use std::{os::unix::fs::PermissionsExt, path::Path};

        use shell_bridge_core::ProcessControl;
        use tokio::io::AsyncReadExt;

        use super::*;

        /// Write an executable shell script standing in for `ssh`.
        fn script(name: &str, body: &str) -> PathBuf {
            let path = std::env::temp_dir().join(format!(
                "shell-bridge-{name}-{}.sh",
                std::process::id()
            ));
            std::fs::write(&path, format!("#!/bin/sh\n{body}\n")).unwrap();
            std::fs::set_permissions(&path, std::fs::Permissions::from_mode(0o755)).unwrap();
            path
        }

        fn provider(program: &Path, connect_timeout_secs: u64) -> SshProvider {
            SshProvider::new(&RemoteConfig {
                connect_timeout_secs,
                ..config(program.to_str().unwrap(), "")
            })
            .unwrap()
        }

        fn target() -> RemoteTarget {
            RemoteTarget {
                host: "h".into(),
                port: 22,
                username: "u".into(),
                credential: CredentialRef::Agent,
            }
        }

        #[tokio::test]
        async fn test_client_exit_maps_to_auth_error() {
            let program = script(
                "auth",
                "echo 'u@h: Permission denied (publickey).' >&2\nexit 255",
            );

            let err = provider(&program, 15)
                .open(&target(), &TerminalGeometry::default())
                .await
                .unwrap_err();

            assert!(
                matches!(&err, RemoteError::Auth(msg) if msg.contains("Permission denied")),
                "unexpected error: {err}"
            );
        }

        #[tokio::test]
        async fn test_silent_client_times_out() {
            let program = script("hang", "exec sleep 30");

            let err = provider(&program, 1)
                .open(&target(), &TerminalGeometry::default())
                .await
                .unwrap_err();

            assert!(matches!(err, RemoteError::Timeout(t) if t == Duration::from_secs(1)));
        }

        #[tokio::test]
        async fn test_ready_client_runs_in_pty() {
            let program = script(
                "ready",
                &format!(
                    "echo 'Warning: Permanently added h'\nprintf '%s\\n' {READY_MARKER}\n\
                     echo \"term=$TERM\"\nstty size"
                ),
            );
            let geometry = TerminalGeometry {
                cols: 100,
                rows: 30,
                term_type: "xterm-256color".into(),
            };

            let mut process = provider(&program, 15).open(&target(), &geometry).await.unwrap();
            assert_eq!(process.host, "h");

            let mut output = Vec::new();
            process.output.read_to_end(&mut output).await.unwrap();
            let output = String::from_utf8_lossy(&output);
            assert!(!output.contains("Warning"), "pre-login output leaked: {output:?}");
            assert!(!output.contains(READY_MARKER));
            assert!(output.contains("term=xterm-256color"), "{output:?}");
            assert!(output.contains("30 100"), "{output:?}");

            process.control.terminate().unwrap();
            process.control.terminate().unwrap();
        }
    }
}
