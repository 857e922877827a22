//! Backend addressing.
//!
//! Every identity's desktop runs on its own private address, derived from
//! the identity id by a fixed formula shared with the orchestration layer:
//!
//! ```text
//! service_id = identity_id + offset
//! address    = 10 . (node_id << 4 | service_id >> 16 & 0xff)
//!                 . (service_id >> 8 & 0xff)
//!                 . (service_id & 0xff)
//! ```
//!
//! Only single-node deployments exist today, so `node_id` is normally 0.

use std::net::{Ipv4Addr, SocketAddr, SocketAddrV4};

pub const DEFAULT_BACKEND_PORT: u16 = 5900;
pub const DEFAULT_SERVICE_ID_OFFSET: i64 = 256;

/// The node id shares the second octet with service-id bits 16..20, so only
/// four bits are available for it.
pub const MAX_NODE_ID: u8 = 0x0f;

/// Map an identity id to its backend IPv4 address. Never fails; an address
/// with nothing behind it shows up later as a connect error.
pub fn resolve_address(identity_id: i64, node_id: u8, service_id_offset: i64) -> Ipv4Addr {
    let service_id = identity_id.wrapping_add(service_id_offset);
    Ipv4Addr::new(
        10,
        (node_id << 4) | ((service_id >> 16) & 0xff) as u8,
        ((service_id >> 8) & 0xff) as u8,
        (service_id & 0xff) as u8,
    )
}

/// Where the backend for an identity listens.
pub trait BackendLocator: Send + Sync {
    fn locate(&self, identity_id: i64) -> SocketAddr;
}

/// The production addressing convention.
#[derive(Debug, Clone, Copy)]
pub struct BackendAddressing {
    pub node_id: u8,
    pub service_id_offset: i64,
    pub port: u16,
}

impl BackendAddressing {
    pub fn new(node_id: u8, service_id_offset: i64, port: u16) -> deskgate_common::Result<Self> {
        if node_id > MAX_NODE_ID {
            return Err(deskgate_common::Error::config(format!(
                "node id {node_id} does not fit in 4 bits (max {MAX_NODE_ID})"
            )));
        }
        Ok(Self {
            node_id,
            service_id_offset,
            port,
        })
    }
}

impl Default for BackendAddressing {
    fn default() -> Self {
        Self {
            node_id: 0,
            service_id_offset: DEFAULT_SERVICE_ID_OFFSET,
            port: DEFAULT_BACKEND_PORT,
        }
    }
}

impl BackendLocator for BackendAddressing {
    fn locate(&self, identity_id: i64) -> SocketAddr {
        let ip = resolve_address(identity_id, self.node_id, self.service_id_offset);
        SocketAddr::V4(SocketAddrV4::new(ip, self.port))
    }
}
