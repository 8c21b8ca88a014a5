//! SSH client command building.

use std::{
    path::{Path, PathBuf},
    time::Duration,
};

use shell_bridge_core::{CredentialRef, RemoteError, RemoteTarget};

/// Parsed command parts (program + args).
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CommandParts {
    pub program: String,
    pub args: Vec<String>,
}

impl CommandParts {
    /// Create new command parts.
    #[must_use]
    pub fn new(program: String, args: Vec<String>) -> Self {
        Self { program, args }
    }

    /// Shell-quoted rendering for logs.
    #[must_use]
    pub fn display(&self) -> String {
        let words = std::iter::once(self.program.as_str()).chain(self.args.iter().map(String::as_str));
        shlex::try_join(words).unwrap_or_else(|_| self.program.clone())
    }

    /// Resolve the program to an absolute path.
    ///
    /// # Errors
    /// Returns error if executable not found.
    pub async fn into_resolved(self) -> Result<(PathBuf, Vec<String>), RemoteError> {
        let Self { program, args } = self;
        let executable = resolve_executable_path(&program)
            .await
            .ok_or_else(|| RemoteError::Spawn(format!("Executable not found: {program}")))?;
        Ok((executable, args))
    }
}

/// Resolve an executable by name.
///
/// Explicit absolute paths are used as-is; anything else is looked up on
/// `PATH` off the runtime thread.
pub async fn resolve_executable_path(executable: &str) -> Option<PathBuf> {
    if executable.trim().is_empty() {
        return None;
    }

    let path = Path::new(executable);
    if path.is_absolute() {
        return path.is_file().then(|| path.to_path_buf());
    }

    let executable = executable.to_string();
    tokio::task::spawn_blocking(move || which::which(executable))
        .await
        .ok()
        .and_then(Result::ok)
}

/// Builder for the SSH client command line.
#[derive(Debug, Clone)]
pub struct SshCommand {
    /// Client executable.
    pub program: String,
    /// Extra options inserted before the destination.
    pub params: Vec<String>,
    /// Command run on the remote host instead of the default shell.
    pub remote_command: Option<String>,
}

impl SshCommand {
    /// Create a new builder for the given client executable.
    #[must_use]
    pub fn new<S: Into<String>>(program: S) -> Self {
        Self {
            program: program.into(),
            params: Vec::new(),
            remote_command: None,
        }
    }

    /// Run `command` on the remote host.
    #[must_use]
    pub fn with_remote_command(mut self, command: impl Into<String>) -> Self {
        self.remote_command = Some(command.into());
        self
    }

    /// Add options.
    #[must_use]
    pub fn extend_params<I>(mut self, more: I) -> Self
    where
        I: IntoIterator,
        I::Item: Into<String>,
    {
        self.params.extend(more.into_iter().map(Into::into));
        self
    }

    /// Add options from a shell-quoted string.
    ///
    /// # Errors
    /// Returns error if the string cannot be split.
    pub fn extend_params_str(self, raw: &str) -> Result<Self, RemoteError> {
        if raw.trim().is_empty() {
            return Ok(self);
        }
        let parts = shlex::split(raw)
            .ok_or_else(|| RemoteError::Spawn(format!("Cannot parse ssh options: {raw}")))?;
        Ok(self.extend_params(parts))
    }

    /// Build the command line for an interactive session on `target`.
    #[must_use]
    pub fn build(&self, target: &RemoteTarget, connect_timeout: Duration) -> CommandParts {
        // Force a remote PTY even though our own stdin is a PTY slave.
        let mut args = vec!["-tt".to_string(), "-p".to_string(), target.port.to_string()];

        if let CredentialRef::KeyFile(key) = &target.credential {
            args.push("-i".to_string());
            args.push(key.display().to_string());
            push_option(&mut args, "IdentitiesOnly=yes");
        }

        // Host keys are not pinned; the bridge always talks to a configured host.
        push_option(&mut args, "StrictHostKeyChecking=no");
        push_option(&mut args, "UserKnownHostsFile=/dev/null");
        push_option(&mut args, "BatchMode=yes");
        push_option(&mut args, "LogLevel=ERROR");
        push_option(
            &mut args,
            &format!("ConnectTimeout={}", connect_timeout.as_secs().max(1)),
        );

        args.extend(self.params.iter().cloned());
        args.push(target.destination());
        args.extend(self.remote_command.iter().cloned());

        CommandParts::new(self.program.clone(), args)
    }
}

fn push_option(args: &mut Vec<String>, option: &str) {
    args.push("-o".to_string());
    args.push(option.to_string());
}
