//! Bridge sessions pairing one client channel with one remote shell.
//!
//! Provides:
//! - `BridgeSession` - Opens the remote process and pumps bytes both ways
//! - `SessionState` - Connecting, Established, Draining, Closed
//! - `Teardown` - Idempotent release of the remote process and the channel
//! - `SessionRegistry` - Live sessions, for health reporting

pub mod bridge;
pub mod pump;
pub mod registry;
pub mod state;
pub mod teardown;

pub use bridge::{BridgeSession, EndReason, SessionError, SessionSettings, SessionSummary};
pub use pump::PumpSide;
pub use registry::{Registration, SessionInfo, SessionRegistry};
pub use state::{InvalidTransition, SessionState};
pub use teardown::Teardown;
