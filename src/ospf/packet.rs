//! OSPF packets as structured records, plus the symbolic multicast
//! destinations the transport understands.

use std::net::IpAddr;

use num_derive::FromPrimitive;

use super::lsa::{Lsa, LsaHeader, LsaKey};
use super::{AreaId, RouterId};

/// Protocol version a packet or engine speaks.
#[derive(Debug, Clone, Copy, PartialEq, Eq, FromPrimitive)]
pub enum OspfVersion {
    V2 = 2,
    V3 = 3,
}

/// Where an outgoing packet is addressed. Multicast groups are symbolic;
/// the transport decides what "delivery" means.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PacketDst {
    AllSpfRouters,
    AllDRouters,
    Unicast(IpAddr),
}

impl PacketDst {
    /// The conventional textual address for this destination under the
    /// given protocol version.
    pub fn address(&self, version: OspfVersion) -> String {
        match (self, version) {
            (PacketDst::AllSpfRouters, OspfVersion::V2) => "224.0.0.5".to_string(),
            (PacketDst::AllDRouters, OspfVersion::V2) => "224.0.0.6".to_string(),
            (PacketDst::AllSpfRouters, OspfVersion::V3) => "ff02::5".to_string(),
            (PacketDst::AllDRouters, OspfVersion::V3) => "ff02::6".to_string(),
            (PacketDst::Unicast(addr), _) => addr.to_string(),
        }
    }
}

/// Fields shared by every packet type.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PacketHeader {
    pub version: OspfVersion,
    pub router_id: RouterId,
    pub area: AreaId,
}

/// Hello packet. OSPFv2 carries the network mask; OSPFv3 carries the
/// interface id instead.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Hello {
    pub network_mask: Option<std::net::Ipv4Addr>,
    pub interface_id: Option<u32>,
    pub hello_interval: u16,
    pub dead_interval: u16,
    pub priority: u8,
    /// The sender's view of the segment's DR/BDR, by interface address.
    pub dr: Option<IpAddr>,
    pub bdr: Option<IpAddr>,
    /// Router ids the sender has recently heard from on this segment.
    pub neighbors: Vec<RouterId>,
}

/// Init / More / Master-Slave bits of a Database Description packet.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct DdFlags {
    pub init: bool,
    pub more: bool,
    pub master: bool,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DatabaseDescription {
    pub sequence: u32,
    pub flags: DdFlags,
    pub headers: Vec<LsaHeader>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LsRequest {
    pub entries: Vec<LsaKey>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LsUpdate {
    pub lsas: Vec<Lsa>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LsAck {
    pub headers: Vec<LsaHeader>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PacketBody {
    Hello(Hello),
    DatabaseDescription(DatabaseDescription),
    LsRequest(LsRequest),
    LsUpdate(LsUpdate),
    LsAck(LsAck),
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Packet {
    pub header: PacketHeader,
    pub body: PacketBody,
}

impl Packet {
    pub fn kind(&self) -> &'static str {
        match self.body {
            PacketBody::Hello(_) => "hello",
            PacketBody::DatabaseDescription(_) => "dd",
            PacketBody::LsRequest(_) => "ls-request",
            PacketBody::LsUpdate(_) => "ls-update",
            PacketBody::LsAck(_) => "ls-ack",
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn multicast_addresses_follow_version() {
        assert_eq!(PacketDst::AllSpfRouters.address(OspfVersion::V2), "224.0.0.5");
        assert_eq!(PacketDst::AllDRouters.address(OspfVersion::V2), "224.0.0.6");
        assert_eq!(PacketDst::AllSpfRouters.address(OspfVersion::V3), "ff02::5");
        assert_eq!(PacketDst::AllDRouters.address(OspfVersion::V3), "ff02::6");
    }

    #[test]
    fn version_parses_from_numeric_config() {
        use num_traits::FromPrimitive;
        assert_eq!(OspfVersion::from_u8(2), Some(OspfVersion::V2));
        assert_eq!(OspfVersion::from_u8(3), Some(OspfVersion::V3));
        assert_eq!(OspfVersion::from_u8(1), None);
    }
}
