//! WebSocket module for the HorizonChat server
//!
//! The upgrade gate turns requests for the real-time endpoint into
//! sessions; each session owns its transport until the close handshake.

mod connection;
pub mod frame;
mod gate;
mod policy;
mod pool;
mod transport;
pub mod upgrade;

pub use connection::{Connection, SessionEnd, SessionOutcome, SessionState};
pub use frame::{CloseFrame, Frame};
pub use gate::{UpgradeGate, UpgradeGateMiddleware};
pub use policy::{EchoPolicy, MessagePolicy};
pub use pool::{ConnectionInfo, ConnectionPool};
pub use transport::Transport;
