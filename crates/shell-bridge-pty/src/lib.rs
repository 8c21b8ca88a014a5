//! SSH client sessions in a pseudo-terminal.
//!
//! Provides:
//! - `SshProvider` - Opens remote shells by running the system `ssh` client in a PTY
//! - `SshCommand` - Builds the client command line
//! - `PtyOutput` / `PtyInput` - Async adapters over the blocking PTY handles
//! - `ready` - Waits for the remote shell and classifies failed logins

pub mod command;
pub mod process;
pub mod ready;
pub mod ssh;

pub use command::{CommandParts, SshCommand, resolve_executable_path};
pub use process::{PtyControl, PtyInput, PtyOutput};
pub use ready::{READY_MARKER, Startup};
pub use ssh::SshProvider;
