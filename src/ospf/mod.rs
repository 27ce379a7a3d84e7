//! Embedded link-state routing engine: neighbor state machine, Hello
//! protocol, DR/BDR election, database synchronisation, LSA origination
//! and flooding, and SPF route computation, for OSPFv2
//! and OSPFv3.
//!
//! The engine is independent of the filesystem/shell half of the crate:
//! packets come in through [`OspfEngine::process_packet`], go out through
//! the send callback or [`transport`], and time advances only through
//! [`OspfEngine::tick`] against a [`Clock`].

pub mod clock;
mod engine;
pub mod interface;
pub mod lsa;
mod lsdb;
pub mod neighbor;
pub mod packet;
pub mod spf;
pub mod transport;

use std::net::Ipv4Addr;

pub use clock::{Clock, RealClock, VirtualClock};
pub use engine::{OspfEngine, Outgoing, SendCallback};
pub use interface::{InterfaceSettings, InterfaceState, NetworkType};
pub use lsdb::{InstallOutcome, Lsdb};
pub use packet::{OspfVersion, Packet, PacketDst};
pub use spf::{Route, RouteOrigin};

/// 32-bit router identifier, written and ordered as a dotted quad.
pub type RouterId = Ipv4Addr;

/// Area identifier; `0.0.0.0` is the backbone.
pub type AreaId = Ipv4Addr;

/// An LSA reaching this age (seconds) is a flush notification.
pub const MAX_AGE: u16 = 3600;

/// Age difference beyond which two otherwise-identical instances are
/// distinguishable, 15 minutes.
pub const MAX_AGE_DIFF: u16 = 900;

/// First sequence number of each logical LSA.
pub const INITIAL_SEQUENCE: u32 = 0x8000_0001;

pub const DEFAULT_HELLO_INTERVAL: u16 = 10;
pub const DEFAULT_DEAD_INTERVAL: u16 = 40;

/// Delay absorbing bursts of LSDB updates before SPF runs.
pub const SPF_DELAY_MS: u64 = 200;

/// Maximum LSA headers per Database Description packet.
pub const DD_MAX_HEADERS: usize = 10;

/// Maximum entries per LS-Request packet.
pub const LSR_MAX_ENTRIES: usize = 10;

/// Result of engine configuration operations.
pub type Result<T> = std::result::Result<T, Error>;

/// Engine configuration errors. Protocol-level problems never surface
/// here; they are dropped silently.
#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub enum Error {
    InterfaceExists,
    InterfaceNotFound,
}

impl std::fmt::Display for Error {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            Error::InterfaceExists => "interface already configured",
            Error::InterfaceNotFound => "no such interface",
        };
        f.write_str(s)
    }
}
