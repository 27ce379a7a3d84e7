//! Shortest-path-first route computation (RFC 2328 §16.1).

use std::cmp::{Ordering, Reverse};
use std::collections::{BinaryHeap, HashMap};
use std::net::{IpAddr, Ipv4Addr};

use tracing::debug;

use super::lsa::{Lsa, LsaBody, LsaType, RouterLinkKind};
use super::{AreaId, RouterId};

/// How a route entered the table.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RouteOrigin {
    IntraArea,
    InterArea,
    External,
}

/// One computed route.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Route {
    pub prefix: IpAddr,
    pub prefix_len: u8,
    pub cost: u32,
    /// `None` for a directly attached destination.
    pub next_hop: Option<IpAddr>,
    pub interface: String,
    pub area: AreaId,
    pub origin: RouteOrigin,
}

/// What SPF needs to know about one local interface: its identity plus
/// the segment addresses of its neighbors, used for first-hop resolution.
#[derive(Debug, Clone)]
pub struct LocalInterface {
    pub name: String,
    pub address: IpAddr,
    pub neighbor_addresses: HashMap<RouterId, IpAddr>,
}

/// A vertex of the shortest-path tree: a router or a transit network
/// (identified by its DR address).
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
enum VertexId {
    Router(RouterId),
    Network(Ipv4Addr),
}

/// A settled tree entry.
#[derive(Debug, Clone)]
struct Vertex {
    cost: u32,
    next_hop: Option<IpAddr>,
    interface: String,
}

/// A tentative path carried on the candidate heap. Ordering is by
/// `(cost, vertex)`, so equal-cost ties break toward the lower id.
#[derive(Debug, Clone, Eq, PartialEq)]
struct Candidate {
    cost: u32,
    vertex: VertexId,
    next_hop: Option<IpAddr>,
    interface: String,
}

impl Ord for Candidate {
    fn cmp(&self, other: &Self) -> Ordering {
        (self.cost, self.vertex).cmp(&(other.cost, other.vertex))
    }
}

impl PartialOrd for Candidate {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

fn mask_len(mask: Ipv4Addr) -> u8 {
    u32::from(mask).count_ones() as u8
}

/// Runs Dijkstra over `lsas`, rooted at the local router's own
/// Router-LSA, then emits one route per stub network,
/// per transit Network-LSA, and per reachable summary/external LSA.
pub fn run_spf(
    root: RouterId,
    area: AreaId,
    lsas: &[Lsa],
    local_interfaces: &[LocalInterface],
) -> Vec<Route> {
    let mut routers: HashMap<RouterId, &Lsa> = HashMap::new();
    let mut networks: HashMap<Ipv4Addr, &Lsa> = HashMap::new();
    let mut summaries: Vec<&Lsa> = Vec::new();
    let mut externals: Vec<&Lsa> = Vec::new();
    let mut prefix_lsas: Vec<&Lsa> = Vec::new();
    for lsa in lsas {
        if lsa.header.is_max_age() {
            continue;
        }
        match lsa.header.lsa_type {
            LsaType::Router => {
                routers.insert(lsa.header.adv_router, lsa);
            }
            LsaType::Network => {
                networks.insert(lsa.header.link_state_id, lsa);
            }
            LsaType::SummaryNetwork => summaries.push(lsa),
            LsaType::AsExternal => externals.push(lsa),
            LsaType::IntraAreaPrefix => prefix_lsas.push(lsa),
            _ => {}
        }
    }

    if !routers.contains_key(&root) {
        return Vec::new();
    }

    let mut tree: HashMap<VertexId, Vertex> = HashMap::new();
    let mut heap: BinaryHeap<Reverse<Candidate>> = BinaryHeap::new();
    heap.push(Reverse(Candidate {
        cost: 0,
        vertex: VertexId::Router(root),
        next_hop: None,
        interface: String::new(),
    }));

    while let Some(Reverse(cand)) = heap.pop() {
        if tree.contains_key(&cand.vertex) {
            continue;
        }
        tree.insert(
            cand.vertex,
            Vertex { cost: cand.cost, next_hop: cand.next_hop, interface: cand.interface.clone() },
        );

        match cand.vertex {
            VertexId::Router(rid) => {
                let Some(lsa) = routers.get(&rid) else { continue };
                let LsaBody::Router(body) = &lsa.body else { continue };
                for link in &body.links {
                    match link.kind {
                        RouterLinkKind::PointToPoint => {
                            if !routers.contains_key(&link.id) {
                                continue;
                            }
                            let (next_hop, interface) = if rid == root {
                                first_hop_to_router(link.id, local_interfaces)
                            } else {
                                (cand.next_hop, cand.interface.clone())
                            };
                            heap.push(Reverse(Candidate {
                                cost: cand.cost + link.metric as u32,
                                vertex: VertexId::Router(link.id),
                                next_hop,
                                interface,
                            }));
                        }
                        RouterLinkKind::Transit => {
                            if !networks.contains_key(&link.id) {
                                continue;
                            }
                            let (next_hop, interface) = if rid == root {
                                (None, iface_by_address(link.data, local_interfaces))
                            } else {
                                (cand.next_hop, cand.interface.clone())
                            };
                            heap.push(Reverse(Candidate {
                                cost: cand.cost + link.metric as u32,
                                vertex: VertexId::Network(link.id),
                                next_hop,
                                interface,
                            }));
                        }
                        RouterLinkKind::Stub => {}
                    }
                }
            }
            VertexId::Network(net_id) => {
                let Some(lsa) = networks.get(&net_id) else { continue };
                let LsaBody::Network(body) = &lsa.body else { continue };
                for attached in &body.attached {
                    if *attached == root || !routers.contains_key(attached) {
                        continue;
                    }
                    // A network directly attached to the root resolves
                    // next hops from the member router's own transit link
                    // back onto the segment; deeper networks inherit.
                    let next_hop = match cand.next_hop {
                        None => transit_address(routers[attached], net_id),
                        inherited => inherited,
                    };
                    heap.push(Reverse(Candidate {
                        cost: cand.cost,
                        vertex: VertexId::Router(*attached),
                        next_hop,
                        interface: cand.interface.clone(),
                    }));
                }
            }
        }
    }

    let mut routes: Vec<Route> = Vec::new();
    let mut push_route = |route: Route, routes: &mut Vec<Route>| {
        match routes.iter_mut().find(|r| r.prefix == route.prefix && r.prefix_len == route.prefix_len) {
            Some(existing) => {
                if route.cost < existing.cost {
                    *existing = route;
                }
            }
            None => routes.push(route),
        }
    };

    // One route per transit Network-LSA on the tree. A zero mask marks a
    // v3 network whose prefixes arrive on Intra-Area-Prefix-LSAs instead.
    for (net_id, vertex) in tree.iter().filter_map(|(id, v)| match id {
        VertexId::Network(n) => Some((*n, v)),
        VertexId::Router(_) => None,
    }) {
        let Some(lsa) = networks.get(&net_id) else { continue };
        let LsaBody::Network(body) = &lsa.body else { continue };
        if body.mask == Ipv4Addr::UNSPECIFIED {
            continue;
        }
        push_route(
            Route {
                prefix: IpAddr::V4(Ipv4Addr::from(u32::from(net_id) & u32::from(body.mask))),
                prefix_len: mask_len(body.mask),
                cost: vertex.cost,
                next_hop: vertex.next_hop,
                interface: vertex.interface.clone(),
                area,
                origin: RouteOrigin::IntraArea,
            },
            &mut routes,
        );
    }

    // One route per stub network advertised by a tree router.
    for (rid, vertex) in tree.iter().filter_map(|(id, v)| match id {
        VertexId::Router(r) => Some((*r, v)),
        VertexId::Network(_) => None,
    }) {
        let Some(lsa) = routers.get(&rid) else { continue };
        let LsaBody::Router(body) = &lsa.body else { continue };
        for link in body.links.iter().filter(|l| l.kind == RouterLinkKind::Stub) {
            push_route(
                Route {
                    prefix: IpAddr::V4(Ipv4Addr::from(u32::from(link.id) & u32::from(link.data))),
                    prefix_len: mask_len(link.data),
                    cost: vertex.cost + link.metric as u32,
                    next_hop: vertex.next_hop,
                    interface: vertex.interface.clone(),
                    area,
                    origin: RouteOrigin::IntraArea,
                },
                &mut routes,
            );
        }
    }

    // OSPFv3 prefixes ride on Intra-Area-Prefix-LSAs instead of stub
    // links; attach them to their referenced router vertex.
    for lsa in prefix_lsas {
        let LsaBody::IntraAreaPrefix(body) = &lsa.body else { continue };
        let Some(vertex) = tree.get(&VertexId::Router(body.ref_adv_router)) else { continue };
        for prefix in &body.prefixes {
            push_route(
                Route {
                    prefix: IpAddr::V6(prefix.prefix),
                    prefix_len: prefix.length,
                    cost: vertex.cost + prefix.metric as u32,
                    next_hop: vertex.next_hop,
                    interface: vertex.interface.clone(),
                    area,
                    origin: RouteOrigin::IntraArea,
                },
                &mut routes,
            );
        }
    }

    // Inter-area routes through reachable ABRs; intra-area paths win
    // regardless of cost.
    for lsa in summaries {
        if lsa.header.adv_router == root {
            continue;
        }
        let LsaBody::Summary(body) = &lsa.body else { continue };
        let Some(abr) = tree.get(&VertexId::Router(lsa.header.adv_router)) else { continue };
        let prefix = Ipv4Addr::from(u32::from(lsa.header.link_state_id) & u32::from(body.mask));
        let candidate = Route {
            prefix: IpAddr::V4(prefix),
            prefix_len: mask_len(body.mask),
            cost: abr.cost + body.metric,
            next_hop: abr.next_hop,
            interface: abr.interface.clone(),
            area,
            origin: RouteOrigin::InterArea,
        };
        if !routes.iter().any(|r| {
            r.prefix == candidate.prefix
                && r.prefix_len == candidate.prefix_len
                && r.origin == RouteOrigin::IntraArea
        }) {
            push_route(candidate, &mut routes);
        }
    }

    // External routes through reachable ASBRs; any internal path wins.
    for lsa in externals {
        if lsa.header.adv_router == root {
            continue;
        }
        let LsaBody::External(body) = &lsa.body else { continue };
        let Some(asbr) = tree.get(&VertexId::Router(lsa.header.adv_router)) else { continue };
        let prefix = Ipv4Addr::from(u32::from(lsa.header.link_state_id) & u32::from(body.mask));
        let candidate = Route {
            prefix: IpAddr::V4(prefix),
            prefix_len: mask_len(body.mask),
            cost: asbr.cost + body.metric,
            next_hop: asbr.next_hop,
            interface: asbr.interface.clone(),
            area,
            origin: RouteOrigin::External,
        };
        if !routes.iter().any(|r| {
            r.prefix == candidate.prefix
                && r.prefix_len == candidate.prefix_len
                && r.origin != RouteOrigin::External
        }) {
            push_route(candidate, &mut routes);
        }
    }

    routes.sort_by_key(|r| (r.prefix, r.prefix_len));
    debug!(area = %area, count = routes.len(), "spf complete");
    routes
}

/// First-hop data for a router directly adjacent to the root.
fn first_hop_to_router(
    target: RouterId,
    local_interfaces: &[LocalInterface],
) -> (Option<IpAddr>, String) {
    for iface in local_interfaces {
        if let Some(addr) = iface.neighbor_addresses.get(&target) {
            return (Some(*addr), iface.name.clone());
        }
    }
    (None, String::new())
}

fn iface_by_address(address: Ipv4Addr, local_interfaces: &[LocalInterface]) -> String {
    local_interfaces
        .iter()
        .find(|i| i.address == IpAddr::V4(address))
        .map(|i| i.name.clone())
        .unwrap_or_default()
}

/// The address `router_lsa`'s originator uses on the transit network
/// identified by `net_id` (the data field of its transit link).
fn transit_address(router_lsa: &Lsa, net_id: Ipv4Addr) -> Option<IpAddr> {
    let LsaBody::Router(body) = &router_lsa.body else { return None };
    body.links
        .iter()
        .find(|l| l.kind == RouterLinkKind::Transit && l.id == net_id)
        .map(|l| IpAddr::V4(l.data))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ospf::lsa::{NetworkLsa, RouterLink, RouterLsa};
    use crate::ospf::INITIAL_SEQUENCE;

    const AREA: Ipv4Addr = Ipv4Addr::new(0, 0, 0, 0);

    fn rid(a: u8) -> RouterId {
        Ipv4Addr::new(a, a, a, a)
    }

    fn router_lsa(owner: RouterId, links: Vec<RouterLink>) -> Lsa {
        Lsa::new(
            0,
            LsaType::Router,
            owner,
            owner,
            INITIAL_SEQUENCE,
            LsaBody::Router(RouterLsa { border_router: false, as_boundary: false, links }),
        )
    }

    fn p2p(link_id: RouterId, data: Ipv4Addr, metric: u16) -> RouterLink {
        RouterLink { kind: RouterLinkKind::PointToPoint, id: link_id, data, metric }
    }

    fn stub(prefix: Ipv4Addr, mask: Ipv4Addr, metric: u16) -> RouterLink {
        RouterLink { kind: RouterLinkKind::Stub, id: prefix, data: mask, metric }
    }

    fn transit(dr: Ipv4Addr, data: Ipv4Addr, metric: u16) -> RouterLink {
        RouterLink { kind: RouterLinkKind::Transit, id: dr, data, metric }
    }

    fn iface_with_neighbor(name: &str, addr: Ipv4Addr, nbr: RouterId, nbr_addr: Ipv4Addr) -> LocalInterface {
        let mut neighbor_addresses = HashMap::new();
        neighbor_addresses.insert(nbr, IpAddr::V4(nbr_addr));
        LocalInterface { name: name.to_string(), address: IpAddr::V4(addr), neighbor_addresses }
    }

    #[test]
    fn point_to_point_stub_route_costs_add_up() {
        let a = rid(1);
        let b = rid(2);
        let a_addr = Ipv4Addr::new(10, 0, 0, 1);
        let b_addr = Ipv4Addr::new(10, 0, 0, 2);
        let lsas = vec![
            router_lsa(
                a,
                vec![
                    p2p(b, a_addr, 10),
                    stub(Ipv4Addr::new(10, 0, 0, 0), Ipv4Addr::new(255, 255, 255, 252), 10),
                ],
            ),
            router_lsa(
                b,
                vec![
                    p2p(a, b_addr, 10),
                    stub(Ipv4Addr::new(192, 168, 1, 0), Ipv4Addr::new(255, 255, 255, 0), 5),
                ],
            ),
        ];
        let ifaces = [iface_with_neighbor("eth0", a_addr, b, b_addr)];
        let routes = run_spf(a, AREA, &lsas, &ifaces);

        let remote = routes
            .iter()
            .find(|r| r.prefix == IpAddr::V4(Ipv4Addr::new(192, 168, 1, 0)))
            .expect("route to b's stub network");
        assert_eq!(remote.cost, 15);
        assert_eq!(remote.next_hop, Some(IpAddr::V4(b_addr)));
        assert_eq!(remote.interface, "eth0");
    }

    #[test]
    fn transit_network_route_uses_network_lsa() {
        let a = rid(1);
        let b = rid(2);
        let a_addr = Ipv4Addr::new(10, 0, 0, 1);
        let b_addr = Ipv4Addr::new(10, 0, 0, 2);
        let lsas = vec![
            router_lsa(a, vec![transit(b_addr, a_addr, 10)]),
            router_lsa(b, vec![transit(b_addr, b_addr, 10)]),
            Lsa::new(
                0,
                LsaType::Network,
                b_addr,
                b,
                INITIAL_SEQUENCE,
                LsaBody::Network(NetworkLsa {
                    mask: Ipv4Addr::new(255, 255, 255, 0),
                    attached: vec![b, a],
                }),
            ),
        ];
        let ifaces = [iface_with_neighbor("eth0", a_addr, b, b_addr)];
        let routes = run_spf(a, AREA, &lsas, &ifaces);

        let net = routes
            .iter()
            .find(|r| r.prefix == IpAddr::V4(Ipv4Addr::new(10, 0, 0, 0)))
            .expect("route to the transit network");
        assert_eq!(net.cost, 10);
        assert_eq!(net.next_hop, None);
        assert_eq!(net.interface, "eth0");
        assert_eq!(net.origin, RouteOrigin::IntraArea);
    }

    #[test]
    fn router_behind_transit_network_gets_segment_next_hop() {
        let a = rid(1);
        let b = rid(2);
        let a_addr = Ipv4Addr::new(10, 0, 0, 1);
        let b_addr = Ipv4Addr::new(10, 0, 0, 2);
        let lsas = vec![
            router_lsa(a, vec![transit(b_addr, a_addr, 10)]),
            router_lsa(
                b,
                vec![
                    transit(b_addr, b_addr, 10),
                    stub(Ipv4Addr::new(192, 168, 2, 0), Ipv4Addr::new(255, 255, 255, 0), 3),
                ],
            ),
            Lsa::new(
                0,
                LsaType::Network,
                b_addr,
                b,
                INITIAL_SEQUENCE,
                LsaBody::Network(NetworkLsa {
                    mask: Ipv4Addr::new(255, 255, 255, 0),
                    attached: vec![b, a],
                }),
            ),
        ];
        let ifaces = [iface_with_neighbor("eth0", a_addr, b, b_addr)];
        let routes = run_spf(a, AREA, &lsas, &ifaces);

        let behind = routes
            .iter()
            .find(|r| r.prefix == IpAddr::V4(Ipv4Addr::new(192, 168, 2, 0)))
            .expect("route to the stub behind the DR");
        assert_eq!(behind.cost, 13);
        assert_eq!(behind.next_hop, Some(IpAddr::V4(b_addr)));
    }

    #[test]
    fn unreachable_router_contributes_nothing() {
        let a = rid(1);
        let c = rid(3);
        let lsas = vec![
            router_lsa(a, vec![]),
            router_lsa(c, vec![stub(Ipv4Addr::new(172, 16, 0, 0), Ipv4Addr::new(255, 255, 0, 0), 1)]),
        ];
        let routes = run_spf(a, AREA, &lsas, &[]);
        assert!(routes.iter().all(|r| r.prefix != IpAddr::V4(Ipv4Addr::new(172, 16, 0, 0))));
    }

    #[test]
    fn summary_routes_ride_through_the_abr() {
        let a = rid(1);
        let abr = rid(2);
        let a_addr = Ipv4Addr::new(10, 0, 0, 1);
        let abr_addr = Ipv4Addr::new(10, 0, 0, 2);
        let lsas = vec![
            router_lsa(a, vec![p2p(abr, a_addr, 10)]),
            router_lsa(abr, vec![p2p(a, abr_addr, 10)]),
            Lsa::new(
                0,
                LsaType::SummaryNetwork,
                Ipv4Addr::new(10, 99, 0, 0),
                abr,
                INITIAL_SEQUENCE,
                LsaBody::Summary(crate::ospf::lsa::SummaryLsa {
                    mask: Ipv4Addr::new(255, 255, 0, 0),
                    metric: 7,
                }),
            ),
        ];
        let ifaces = [iface_with_neighbor("eth0", a_addr, abr, abr_addr)];
        let routes = run_spf(a, AREA, &lsas, &ifaces);
        let inter = routes
            .iter()
            .find(|r| r.prefix == IpAddr::V4(Ipv4Addr::new(10, 99, 0, 0)))
            .expect("inter-area route");
        assert_eq!(inter.cost, 17);
        assert_eq!(inter.origin, RouteOrigin::InterArea);
        assert_eq!(inter.next_hop, Some(IpAddr::V4(abr_addr)));
    }
}
