#![forbid(unsafe_code)]

//! deskgate relay - authenticating front door for per-identity VNC desktops.
//!
//! The relay:
//! 1. Plays RFB server to the viewer and issues a VNC-auth challenge
//! 2. Finds the roster identity whose derived credential answers it
//! 3. Plays RFB client to that identity's backend with the same credential
//! 4. Pipes bytes verbatim in both directions until either side closes
//!
//! The viewer learns nothing about which step failed: every failure after
//! the challenge response is the same 4-byte failure result.

pub mod back;
pub mod config;
pub mod front;
pub mod locator;
pub mod matcher;
pub mod pump;
pub mod roster;
pub mod server;
pub mod session;
pub mod shutdown;
pub mod wire;

pub use config::RelayConfig;
pub use locator::{resolve_address, BackendAddressing, BackendLocator};
pub use roster::{
    CachedRoster, FileRoster, Identity, IdentitySecret, PgRoster, RosterProvider, StaticRoster,
};
pub use server::RelayServer;
pub use session::{SessionError, SessionState};
pub use shutdown::ShutdownHandle;
pub use wire::HandshakeError;
