//! Link State Advertisements: the tagged sum of concrete LSA shapes
//! sharing a header prefix.
//!
//! Comparison and flooding operate uniformly on [`LsaHeader`]; origination
//! and SPF branch on the body tag.

use std::cmp::Ordering;
use std::net::{Ipv4Addr, Ipv6Addr};

use num_derive::FromPrimitive;

use super::{RouterId, MAX_AGE, MAX_AGE_DIFF};

/// LSA type codes. Types 1-5 are shared with OSPFv2; the two high codes
/// are the OSPFv3 additions.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, FromPrimitive)]
pub enum LsaType {
    Router = 1,
    Network = 2,
    SummaryNetwork = 3,
    SummaryAsbr = 4,
    AsExternal = 5,
    Link = 0x0008,
    IntraAreaPrefix = 0x2009,
}

impl LsaType {
    /// AS-External LSAs have AS flooding scope; everything else is
    /// area-scoped (Link-LSAs are narrower still, but the simulator floods
    /// them with area scope).
    pub fn is_as_scoped(self) -> bool {
        self == LsaType::AsExternal
    }
}

/// The `(type, link-state-id, adv-router)` triple identifying one logical
/// LSA across all its instances.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct LsaKey {
    pub lsa_type: LsaType,
    pub link_state_id: Ipv4Addr,
    pub adv_router: RouterId,
}

/// The 20-byte header prefix every LSA instance carries.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct LsaHeader {
    pub age: u16,
    pub options: u8,
    pub lsa_type: LsaType,
    pub link_state_id: Ipv4Addr,
    pub adv_router: RouterId,
    pub sequence: u32,
    pub checksum: u16,
    pub length: u16,
}

impl LsaHeader {
    pub fn key(&self) -> LsaKey {
        LsaKey {
            lsa_type: self.lsa_type,
            link_state_id: self.link_state_id,
            adv_router: self.adv_router,
        }
    }

    /// An LSA at MaxAge is equivalent to a flush notification.
    pub fn is_max_age(&self) -> bool {
        self.age >= MAX_AGE
    }
}

/// Orders two instances of the same logical LSA by freshness
///: sequence, then checksum, then a
/// MaxAge instance wins, then a more-than-15-minutes-younger instance
/// wins. `Equal` means the instances are considered identical.
pub fn compare_freshness(a: &LsaHeader, b: &LsaHeader) -> Ordering {
    match a.sequence.cmp(&b.sequence) {
        Ordering::Equal => {}
        other => return other,
    }
    match a.checksum.cmp(&b.checksum) {
        Ordering::Equal => {}
        other => return other,
    }
    match (a.is_max_age(), b.is_max_age()) {
        (true, false) => return Ordering::Greater,
        (false, true) => return Ordering::Less,
        _ => {}
    }
    let age_gap = a.age.abs_diff(b.age);
    if age_gap > MAX_AGE_DIFF {
        // Lower age is the fresher instance.
        return b.age.cmp(&a.age);
    }
    Ordering::Equal
}

/// The kind of link a Router-LSA advertises.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RouterLinkKind {
    /// Point-to-point connection to another router; id is the neighbor's
    /// router id, data is the local interface address.
    PointToPoint,
    /// Connection to a transit network; id is the DR's interface address,
    /// data is the local interface address.
    Transit,
    /// Directly attached stub network; id is the network prefix, data the
    /// mask.
    Stub,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RouterLink {
    pub kind: RouterLinkKind,
    pub id: Ipv4Addr,
    pub data: Ipv4Addr,
    pub metric: u16,
}

#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct RouterLsa {
    /// Set when the originator has interfaces in more than one area.
    pub border_router: bool,
    /// Set when the originator injects AS-external routes.
    pub as_boundary: bool,
    pub links: Vec<RouterLink>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NetworkLsa {
    pub mask: Ipv4Addr,
    /// The DR itself plus every router fully adjacent to it.
    pub attached: Vec<RouterId>,
}

/// Type 3 and 4 share one body shape; the header type distinguishes a
/// network summary from an ASBR summary.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SummaryLsa {
    pub mask: Ipv4Addr,
    pub metric: u32,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ExternalLsa {
    pub mask: Ipv4Addr,
    pub metric: u32,
    pub forwarding: Option<Ipv4Addr>,
}

/// An address prefix carried by the OSPFv3 LSA bodies.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Ipv6Prefix {
    pub prefix: Ipv6Addr,
    pub length: u8,
    pub metric: u16,
}

/// OSPFv3 Link-LSA: the originator's link-local address and the prefixes
/// it has configured on the link.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LinkLsa {
    pub link_local: Ipv6Addr,
    pub priority: u8,
    pub prefixes: Vec<Ipv6Prefix>,
}

/// OSPFv3 Intra-Area-Prefix-LSA: prefixes attached to a referenced
/// Router- or Network-LSA.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct IntraAreaPrefixLsa {
    pub ref_type: LsaType,
    pub ref_link_state_id: Ipv4Addr,
    pub ref_adv_router: RouterId,
    pub prefixes: Vec<Ipv6Prefix>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum LsaBody {
    Router(RouterLsa),
    Network(NetworkLsa),
    Summary(SummaryLsa),
    External(ExternalLsa),
    Link(LinkLsa),
    IntraAreaPrefix(IntraAreaPrefixLsa),
}

/// One complete LSA instance.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Lsa {
    pub header: LsaHeader,
    pub body: LsaBody,
}

impl Lsa {
    /// Builds an LSA with the checksum and synthetic length filled in.
    pub fn new(
        age: u16,
        lsa_type: LsaType,
        link_state_id: Ipv4Addr,
        adv_router: RouterId,
        sequence: u32,
        body: LsaBody,
    ) -> Self {
        let length = 20 + body_span(&body);
        let mut header = LsaHeader {
            age,
            options: 0x02,
            lsa_type,
            link_state_id,
            adv_router,
            sequence,
            checksum: 0,
            length,
        };
        header.checksum = checksum(&header, &body);
        Lsa { header, body }
    }
}

fn body_span(body: &LsaBody) -> u16 {
    let units = match body {
        LsaBody::Router(r) => 4 + r.links.len() * 12,
        LsaBody::Network(n) => 4 + n.attached.len() * 4,
        LsaBody::Summary(_) => 8,
        LsaBody::External(_) => 16,
        LsaBody::Link(l) => 20 + l.prefixes.len() * 20,
        LsaBody::IntraAreaPrefix(p) => 12 + p.prefixes.len() * 20,
    };
    units as u16
}

/// Simplified non-Fletcher checksum over the identifying fields and body
/// span. Consumers must treat it as an opaque identifier, never compare it
/// against real OSPF capture data.
fn checksum(header: &LsaHeader, body: &LsaBody) -> u16 {
    let mut acc: u32 = 0xACE1;
    let mut mix = |v: u32| {
        acc = acc.wrapping_mul(31).wrapping_add(v) ^ (acc >> 16);
    };
    mix(header.lsa_type as u32);
    mix(u32::from(header.link_state_id));
    mix(u32::from(header.adv_router));
    mix(header.sequence);
    mix(body_span(body) as u32);
    (acc & 0xFFFF) as u16
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ospf::INITIAL_SEQUENCE;

    fn header(sequence: u32, checksum: u16, age: u16) -> LsaHeader {
        LsaHeader {
            age,
            options: 0,
            lsa_type: LsaType::Router,
            link_state_id: Ipv4Addr::new(1, 1, 1, 1),
            adv_router: Ipv4Addr::new(1, 1, 1, 1),
            sequence,
            checksum,
            length: 24,
        }
    }

    #[test]
    fn higher_sequence_is_fresher() {
        let older = header(INITIAL_SEQUENCE, 9, 0);
        let newer = header(INITIAL_SEQUENCE + 1, 1, 0);
        assert_eq!(compare_freshness(&newer, &older), Ordering::Greater);
        assert_eq!(compare_freshness(&older, &newer), Ordering::Less);
    }

    #[test]
    fn checksum_breaks_sequence_ties() {
        let low = header(INITIAL_SEQUENCE, 5, 0);
        let high = header(INITIAL_SEQUENCE, 6, 0);
        assert_eq!(compare_freshness(&high, &low), Ordering::Greater);
    }

    #[test]
    fn max_age_instance_wins_otherwise_equal() {
        let live = header(INITIAL_SEQUENCE, 5, 100);
        let flushing = header(INITIAL_SEQUENCE, 5, MAX_AGE);
        assert_eq!(compare_freshness(&flushing, &live), Ordering::Greater);
    }

    #[test]
    fn small_age_gap_is_identical() {
        let a = header(INITIAL_SEQUENCE, 5, 100);
        let b = header(INITIAL_SEQUENCE, 5, 400);
        assert_eq!(compare_freshness(&a, &b), Ordering::Equal);
    }

    #[test]
    fn large_age_gap_prefers_younger() {
        let young = header(INITIAL_SEQUENCE, 5, 10);
        let old = header(INITIAL_SEQUENCE, 5, 1200);
        assert_eq!(compare_freshness(&young, &old), Ordering::Greater);
    }
}
