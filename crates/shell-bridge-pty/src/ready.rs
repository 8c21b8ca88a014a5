//! Detecting when the remote shell is up.
//!
//! The client is asked to print a marker line on the remote host before
//! handing over to a login shell. Everything before the marker belongs to
//! the connection attempt; everything after it is shell output.

use std::{io, time::Duration};

use bytes::Bytes;
use shell_bridge_core::RemoteError;
use tokio::io::{AsyncRead, AsyncReadExt};

/// Line printed on the remote host once the login succeeded.
pub const READY_MARKER: &str = "__shell_bridge_ready__";

/// Remote command that prints `marker` and then starts a login shell.
#[must_use]
pub fn ready_command(marker: &str) -> String {
    format!("printf '%s\\n' '{marker}'; exec \"${{SHELL:-/bin/sh}}\" -l")
}

/// Outcome of waiting for the marker.
#[derive(Debug, PartialEq, Eq)]
pub enum Startup {
    /// The marker line arrived; holds the output that followed it.
    Ready(Bytes),
    /// The output ended first; holds everything the client printed.
    Exited(Vec<u8>),
}

/// Read `output` until a full line containing `marker`, or end-of-stream.
///
/// # Errors
/// Returns error if reading fails.
pub async fn await_marker<R>(output: &mut R, marker: &[u8]) -> io::Result<Startup>
where
    R: AsyncRead + Unpin + ?Sized,
{
    let mut seen = Vec::new();
    let mut buf = [0u8; 1024];
    let mut marker_at = None;

    loop {
        let searched = seen.len();
        let n = output.read(&mut buf).await?;
        if n == 0 {
            return Ok(Startup::Exited(seen));
        }
        seen.extend_from_slice(&buf[..n]);

        if marker_at.is_none() {
            let from = searched.saturating_sub(marker.len());
            marker_at = find(&seen[from..], marker).map(|i| from + i);
        }
        if let Some(at) = marker_at {
            let after = at + marker.len();
            if let Some(newline) = seen[after..].iter().position(|&b| b == b'\n') {
                return Ok(Startup::Ready(Bytes::copy_from_slice(
                    &seen[after + newline + 1..],
                )));
            }
        }
    }
}

fn find(haystack: &[u8], needle: &[u8]) -> Option<usize> {
    if needle.is_empty() {
        return Some(0);
    }
    haystack
        .windows(needle.len())
        .position(|window| window == needle)
}

const AUTH_FAILURES: &[&str] = &[
    "permission denied",
    "authentication failed",
    "too many authentication failures",
    "host key verification failed",
    "no supported authentication methods",
];

const TIMEOUT_FAILURES: &[&str] = &["connection timed out", "operation timed out"];

/// Map the output of a client that exited before the shell started.
#[must_use]
pub fn classify_failure(
    transcript: &[u8],
    exit_code: Option<u32>,
    timeout: Duration,
) -> RemoteError {
    let text = String::from_utf8_lossy(transcript);
    let lower = text.to_lowercase();

    let message = text
        .lines()
        .map(str::trim)
        .rfind(|line| !line.is_empty())
        .map_or_else(
            || match exit_code {
                Some(code) => format!("ssh exited with status {code} before the shell started"),
                None => "ssh exited before the shell started".to_string(),
            },
            str::to_string,
        );

    if AUTH_FAILURES.iter().any(|pattern| lower.contains(pattern)) {
        RemoteError::Auth(message)
    } else if TIMEOUT_FAILURES.iter().any(|pattern| lower.contains(pattern)) {
        RemoteError::Timeout(timeout)
    } else {
        RemoteError::Network(message)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const MARKER: &[u8] = READY_MARKER.as_bytes();

    #[tokio::test]
    async fn test_output_after_marker_is_kept() {
        let mut output = tokio_test::io::Builder::new()
            .read(b"Warning: Permanently added 'h'\r\n__shell_")
            .read(b"bridge_ready__\r")
            .read(b"\nubuntu@h:~$ ")
            .build();

        let startup = await_marker(&mut output, MARKER).await.unwrap();
        assert_eq!(startup, Startup::Ready(Bytes::from_static(b"ubuntu@h:~$ ")));
    }

    #[tokio::test]
    async fn test_end_before_marker() {
        let mut output = tokio_test::io::Builder::new()
            .read(b"u@h: Permission denied (publickey).\r\n")
            .build();

        let startup = await_marker(&mut output, MARKER).await.unwrap();
        assert_eq!(
            startup,
            Startup::Exited(b"u@h: Permission denied (publickey).\r\n".to_vec())
        );
    }

    #[test]
    fn test_classify_auth() {
        let err = classify_failure(
            b"u@h: Permission denied (publickey).\r\n",
            Some(255),
            Duration::from_secs(15),
        );
        assert!(matches!(&err, RemoteError::Auth(msg) if msg == "u@h: Permission denied (publickey)."));
    }

    #[test]
    fn test_classify_timeout() {
        let err = classify_failure(
            b"ssh: connect to host h port 22: Connection timed out\r\n",
            Some(255),
            Duration::from_secs(15),
        );
        assert_eq!(err.to_string(), "Connection timed out after 15s");
    }

    #[test]
    fn test_classify_network() {
        for line in [
            "ssh: Could not resolve hostname h: Name or service not known",
            "ssh: connect to host h port 22: Connection refused",
        ] {
            let err = classify_failure(line.as_bytes(), Some(255), Duration::from_secs(1));
            assert!(matches!(&err, RemoteError::Network(msg) if msg == line));
        }
    }

    #[test]
    fn test_classify_silent_exit() {
        let err = classify_failure(b"\r\n", Some(255), Duration::from_secs(1));
        assert_eq!(
            err.to_string(),
            "Network error: ssh exited with status 255 before the shell started"
        );
    }

    #[test]
    fn test_ready_command_prints_marker() {
        let command = ready_command(READY_MARKER);
        assert!(command.starts_with("printf '%s\\n' '__shell_bridge_ready__';"));
        assert!(command.ends_with("-l"));
    }
}
