//! Live progress reporting to a teacher console.

pub mod client;
pub mod connection;
pub mod help;
pub mod identity;
pub mod protocol;
pub mod relay;

pub use client::{DashboardSyncClient, RecordingSink, SessionStatus, StatusSink};
pub use connection::WebSocketConnection;
pub use help::{HelpOutcome, HelpState};
pub use identity::DashboardIdentity;
pub use protocol::{ClientMessage, Role, ServerMessage, StatusPayload};
pub use relay::{RelayServer, RelayState};
