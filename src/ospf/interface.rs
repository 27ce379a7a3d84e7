//! OSPF interface records and the DR/BDR election procedure
//! (RFC 2328 §9.4).

use std::collections::BTreeMap;
use std::net::{IpAddr, Ipv4Addr};

use super::neighbor::{Neighbor, NeighborState};
use super::{AreaId, RouterId, DEFAULT_DEAD_INTERVAL, DEFAULT_HELLO_INTERVAL};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum InterfaceState {
    Down,
    Loopback,
    Waiting,
    PointToPoint,
    DrOther,
    Backup,
    Dr,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum NetworkType {
    Broadcast,
    PointToPoint,
    PointToMultipoint,
    NonBroadcast,
    Loopback,
}

/// Static configuration handed to [`super::OspfEngine::add_interface`].
#[derive(Debug, Clone)]
pub struct InterfaceSettings {
    pub name: String,
    pub address: IpAddr,
    pub prefix_len: u8,
    pub area: AreaId,
    pub network_type: NetworkType,
    pub cost: u16,
    pub priority: u8,
    pub passive: bool,
    pub hello_interval: u16,
    pub dead_interval: u16,
}

impl InterfaceSettings {
    pub fn new(name: &str, address: IpAddr, prefix_len: u8, area: AreaId) -> Self {
        InterfaceSettings {
            name: name.to_string(),
            address,
            prefix_len,
            area,
            network_type: NetworkType::Broadcast,
            cost: 10,
            priority: 1,
            passive: false,
            hello_interval: DEFAULT_HELLO_INTERVAL,
            dead_interval: DEFAULT_DEAD_INTERVAL,
        }
    }
}

/// Live per-interface protocol state.
#[derive(Debug, Clone)]
pub struct OspfInterface {
    pub name: String,
    /// Small per-engine ordinal, used as the OSPFv3 interface id.
    pub index: u32,
    pub address: IpAddr,
    pub prefix_len: u8,
    pub area: AreaId,
    pub state: InterfaceState,
    pub network_type: NetworkType,
    pub cost: u16,
    pub priority: u8,
    pub passive: bool,
    pub hello_interval: u16,
    pub dead_interval: u16,
    pub dr: Option<IpAddr>,
    pub bdr: Option<IpAddr>,
    pub neighbors: BTreeMap<RouterId, Neighbor>,
}

impl OspfInterface {
    pub fn from_settings(settings: InterfaceSettings, index: u32) -> Self {
        OspfInterface {
            name: settings.name,
            index,
            address: settings.address,
            prefix_len: settings.prefix_len,
            area: settings.area,
            state: InterfaceState::Down,
            network_type: settings.network_type,
            cost: settings.cost,
            priority: settings.priority,
            passive: settings.passive,
            hello_interval: settings.hello_interval,
            dead_interval: settings.dead_interval,
            dr: None,
            bdr: None,
            neighbors: BTreeMap::new(),
        }
    }

    /// IPv4 network mask derived from the prefix length.
    pub fn mask(&self) -> Ipv4Addr {
        prefix_mask(self.prefix_len)
    }

    /// IPv4 network prefix of the attached subnet.
    pub fn network(&self) -> Option<Ipv4Addr> {
        match self.address {
            IpAddr::V4(addr) => Some(apply_mask(addr, self.prefix_len)),
            IpAddr::V6(_) => None,
        }
    }

    pub fn is_up(&self) -> bool {
        !matches!(self.state, InterfaceState::Down)
    }

    pub fn is_dr(&self) -> bool {
        self.state == InterfaceState::Dr
    }

    /// Whether a full adjacency should form with `neighbor`.
    pub fn adjacency_required(&self, neighbor: &Neighbor) -> bool {
        adjacency_required(self.network_type, self.state, self.dr, self.bdr, neighbor.address)
    }

    pub fn full_neighbors(&self) -> impl Iterator<Item = &Neighbor> {
        self.neighbors.values().filter(|n| n.state == NeighborState::Full)
    }

    pub fn has_full_neighbor(&self) -> bool {
        self.full_neighbors().next().is_some()
    }
}

/// Whether a full adjacency should form across a link with the given
/// parameters: always on point-to-point style links; on broadcast/NBMA
/// only when one of the two ends is DR or BDR.
pub fn adjacency_required(
    network_type: NetworkType,
    state: InterfaceState,
    dr: Option<IpAddr>,
    bdr: Option<IpAddr>,
    neighbor_address: IpAddr,
) -> bool {
    match network_type {
        NetworkType::PointToPoint | NetworkType::PointToMultipoint => true,
        NetworkType::Loopback => false,
        NetworkType::Broadcast | NetworkType::NonBroadcast => {
            matches!(state, InterfaceState::Dr | InterfaceState::Backup)
                || dr == Some(neighbor_address)
                || bdr == Some(neighbor_address)
        }
    }
}

pub fn prefix_mask(prefix_len: u8) -> Ipv4Addr {
    let bits = if prefix_len == 0 { 0u32 } else { u32::MAX << (32 - prefix_len.min(32) as u32) };
    Ipv4Addr::from(bits)
}

pub fn apply_mask(addr: Ipv4Addr, prefix_len: u8) -> Ipv4Addr {
    Ipv4Addr::from(u32::from(addr) & u32::from(prefix_mask(prefix_len)))
}

/// One election candidate: the local router or a neighbor in state
/// TwoWay or beyond, priority > 0.
#[derive(Debug, Clone, Copy)]
pub struct Candidate {
    pub router_id: RouterId,
    pub address: IpAddr,
    pub priority: u8,
    pub declared_dr: Option<IpAddr>,
    pub declared_bdr: Option<IpAddr>,
}

impl Candidate {
    fn declares_dr(&self) -> bool {
        self.declared_dr == Some(self.address)
    }

    fn declares_bdr(&self) -> bool {
        self.declared_bdr == Some(self.address)
    }
}

/// The two-step election. Returns the elected
/// `(dr, bdr)` interface addresses.
pub fn elect_dr_bdr(candidates: &[Candidate]) -> (Option<IpAddr>, Option<IpAddr>) {
    let best = |pool: &[&Candidate]| -> Option<IpAddr> {
        pool.iter()
            .max_by_key(|c| (c.priority, u32::from(c.router_id)))
            .map(|c| c.address)
    };

    // Step 1: BDR among candidates not claiming DR, preferring declared
    // BDRs.
    let non_dr: Vec<&Candidate> = candidates.iter().filter(|c| !c.declares_dr()).collect();
    let declared_bdrs: Vec<&Candidate> = non_dr.iter().copied().filter(|c| c.declares_bdr()).collect();
    let bdr = if declared_bdrs.is_empty() { best(&non_dr) } else { best(&declared_bdrs) };

    // Step 2: DR among candidates claiming DR; otherwise the BDR is
    // promoted.
    let declared_drs: Vec<&Candidate> = candidates.iter().filter(|c| c.declares_dr()).collect();
    let dr = best(&declared_drs).or(bdr);

    // A promoted BDR stops being BDR.
    let bdr = if dr == bdr { None } else { bdr };
    (dr, bdr)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn candidate(id: u8, priority: u8) -> Candidate {
        let address = IpAddr::V4(Ipv4Addr::new(10, 0, 0, id));
        Candidate {
            router_id: Ipv4Addr::new(id, id, id, id),
            address,
            priority,
            declared_dr: None,
            declared_bdr: None,
        }
    }

    #[test]
    fn highest_router_id_wins_fresh_election() {
        let a = candidate(1, 1);
        let b = candidate(2, 1);
        let (dr, bdr) = elect_dr_bdr(&[a, b]);
        assert_eq!(dr, Some(b.address));
        assert_eq!(bdr, Some(a.address));
    }

    #[test]
    fn priority_beats_router_id() {
        let a = candidate(1, 10);
        let b = candidate(2, 1);
        let (dr, _) = elect_dr_bdr(&[a, b]);
        assert_eq!(dr, Some(a.address));
    }

    #[test]
    fn declared_dr_is_kept() {
        let mut a = candidate(1, 1);
        a.declared_dr = Some(a.address);
        let b = candidate(2, 1);
        let (dr, bdr) = elect_dr_bdr(&[a, b]);
        assert_eq!(dr, Some(a.address));
        assert_eq!(bdr, Some(b.address));
    }

    #[test]
    fn declared_bdr_preferred_for_backup() {
        let mut a = candidate(1, 1);
        a.declared_bdr = Some(a.address);
        let b = candidate(2, 1);
        let c = candidate(3, 1);
        let (dr, bdr) = elect_dr_bdr(&[a, b, c]);
        // No declared DR: the preferred BDR (a) is promoted to DR.
        assert_eq!(dr, Some(a.address));
        assert_ne!(bdr, Some(a.address));
    }

    #[test]
    fn prefix_mask_and_network() {
        assert_eq!(prefix_mask(24), Ipv4Addr::new(255, 255, 255, 0));
        assert_eq!(prefix_mask(30), Ipv4Addr::new(255, 255, 255, 252));
        assert_eq!(apply_mask(Ipv4Addr::new(10, 0, 0, 17), 24), Ipv4Addr::new(10, 0, 0, 0));
    }
}
