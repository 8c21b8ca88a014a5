//! Core abstractions for bridging a client channel to a remote shell.
//!
//! This crate provides the fundamental building blocks:
//! - `Transport` - Split duplex channel to the browser client
//! - `RemoteSessionProvider` - Opens an interactive remote process
//! - `RemoteTarget` / `TerminalGeometry` - What to connect to, and how
//! - `BridgeConfig` - File + environment configuration
//! - `KeyValueCache` - Cache collaborator used by the health check
//! - `ChannelTransport` - In-process transport for embedders and tests

pub mod cache;
pub mod channel;
pub mod config;
pub mod protocol;
pub mod target;
pub mod traits;

#[cfg(any(test, feature = "test-util"))]
pub mod testing;

pub use cache::{CacheError, KeyValueCache, MemoryCache};
pub use channel::{ChannelClient, ChannelTransport, ClientFrame};
pub use config::{BridgeConfig, ConfigError};
pub use protocol::StatusMessage;
pub use target::{CredentialRef, RemoteTarget, TerminalGeometry};
pub use traits::{
    OutboundMessage, ProcessControl, RemoteError, RemoteProcess, RemoteSessionProvider,
    SessionId, Transport, TransportError, TransportEvent, TransportReceiver, TransportSender,
};
