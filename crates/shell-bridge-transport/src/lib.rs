//! Client-facing edge of the shell bridge.
//!
//! Provides:
//! - `BridgeState` - Provider, settings, registry and cache shared by handlers
//! - `serve_session` - Runs one traced bridge session over any transport
//! - WebSocket transport, routes and middleware (feature: websocket)

pub mod serve;
pub mod state;

#[cfg(feature = "websocket")]
pub mod health;
#[cfg(feature = "websocket")]
pub mod middleware;
#[cfg(feature = "websocket")]
pub mod router;
#[cfg(feature = "websocket")]
pub mod websocket;

pub use serve::serve_session;
pub use state::BridgeState;

#[cfg(feature = "websocket")]
pub use router::{HEALTH_PATH, TERMINAL_PATH, create_router};
#[cfg(feature = "websocket")]
pub use websocket::{AxumTransport, WsReceiver, WsSender};
